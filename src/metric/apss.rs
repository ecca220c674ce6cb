//! Algebraic point set surfaces: an error metric based on fitted algebraic
//! spheres.
//!
//! Every vertex (and face) gets an [`AlgebraicSphere`] that is fitted to the
//! points and normals of its neighborhood. The fit is repeated at the
//! projection of the query point until it settles. With
//! [`ApssParams::robust`], the weights of the fit are computed by robust
//! implicit moving least squares (RIMLS) which is less sensitive to outliers
//! and sharp features.
//!
//! Collapses are rated by blending the spheres of the edge's endpoints and
//! measuring how far the surrounding faces are from the blended sphere.

use boolinator::Boolinator;
use cgmath::prelude::*;
use num_traits::Zero;
use tracing::{trace, warn};

use crate::{
    dcel::Dcel,
    error::{Error, Result},
    handle::{EdgeHandle, FaceHandle, VertexHandle},
    map::DenseMap,
    math::{self, Point, Scalar, Vector},
};
use super::{CollapseCost, ErrorMetric, Placement};


/// The re-fit loop for vertices stops once the projected point moves less
/// than this.
pub const VERTEX_FIT_THRESHOLD: Scalar = 1e-4;

/// The re-fit loop for faces stops once the projected point moves less than
/// this.
pub const FACE_FIT_THRESHOLD: Scalar = 1e-2;

/// Maximum number of re-fit iterations.
pub const MAX_FIT_ITERATIONS: usize = 100;

/// Step of the parameter along the edge in the segment search.
pub const SEGMENT_STEP: Scalar = 0.01;

/// Step of the barycentric coordinates in the face search.
pub const FACE_GRID_STEP: Scalar = 0.1;

const MAX_PROJECTION_STEPS: usize = 16;
const PLANE_EPS: Scalar = 1e-9;

const RIMLS_MAX_INNER: usize = 20;
const RIMLS_MAX_OUTER: usize = 32;
const RIMLS_THRESHOLD: Scalar = 1e-3;
const RIMLS_SIGMA_R: Scalar = 0.5;
const RIMLS_SIGMA_N: Scalar = 0.5;


// ===============================================================================================
// ===== AlgebraicSphere
// ===============================================================================================

/// The scalar field `f(x) = uc + ul·(x - center) + uq·|x - center|²`.
///
/// Its zero set is a sphere (`uq != 0`) or a plane (`uq == 0`). `center` is
/// only the basis the coefficients are expressed in; moving it with
/// [`AlgebraicSphere::change_basis`] does not change the field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlgebraicSphere {
    pub center: Point,
    pub uc: Scalar,
    pub ul: Vector,
    pub uq: Scalar,
}

impl AlgebraicSphere {
    /// The plane through `point` with the given normal.
    pub fn plane(point: Point, normal: Vector) -> Self {
        Self {
            center: point,
            uc: 0.0,
            ul: normal,
            uq: 0.0,
        }
    }

    /// Fits an oriented sphere to weighted samples `(position, normal,
    /// weight)`, expressed in the basis `center`. The result is Pratt
    /// normalized, so that close to the surface, `eval` approximates the
    /// signed distance.
    ///
    /// Fails with `Error::InsufficientNeighbors` if fewer than three samples
    /// have a positive weight and with `Error::NonFiniteFit` if the fit
    /// produces NaN or infinity.
    pub fn fit(center: Point, samples: &[(Point, Vector, Scalar)]) -> Result<Self> {
        let num_weighted = samples.iter().filter(|s| s.2 > 0.0).count();
        if num_weighted < 3 {
            return Err(Error::InsufficientNeighbors(num_weighted));
        }

        let mut sum_w = 0.0;
        let mut sum_p = Vector::zero();
        let mut sum_n = Vector::zero();
        let mut sum_dot_pn = 0.0;
        let mut sum_dot_pp = 0.0;
        for &(pos, normal, w) in samples.iter().filter(|s| s.2 > 0.0) {
            let p = pos - center;
            sum_w += w;
            sum_p += p * w;
            sum_n += normal * w;
            sum_dot_pn += w * p.dot(normal);
            sum_dot_pp += w * p.magnitude2();
        }

        let inv_w = 1.0 / sum_w;
        let num = sum_dot_pn * inv_w - sum_p.dot(sum_n) * inv_w * inv_w;
        let den = sum_dot_pp * inv_w - sum_p.magnitude2() * inv_w * inv_w;
        let uq = if den.abs() > Scalar::EPSILON * (sum_dot_pp * inv_w).max(Scalar::MIN_POSITIVE) {
            0.5 * num / den
        } else {
            0.0
        };
        let ul = (sum_n - sum_p * (2.0 * uq)) * inv_w;
        let uc = -(ul.dot(sum_p) + sum_dot_pp * uq) * inv_w;

        let sphere = Self { center, uc, ul, uq };
        if !sphere.is_finite() {
            return Err(Error::NonFiniteFit);
        }

        sphere.pratt_normalized().ok_or(Error::NonFiniteFit)
    }

    /// Evaluates the scalar field at `x`.
    pub fn eval(&self, x: Point) -> Scalar {
        let d = x - self.center;
        self.uc + self.ul.dot(d) + self.uq * d.magnitude2()
    }

    pub fn gradient(&self, x: Point) -> Vector {
        self.ul + (x - self.center) * (2.0 * self.uq)
    }

    /// Expresses the same field in the basis `center`.
    pub fn change_basis(&self, center: Point) -> Self {
        let d = center - self.center;
        Self {
            center,
            uc: self.uc + self.ul.dot(d) + self.uq * d.magnitude2(),
            ul: self.ul + d * (2.0 * self.uq),
            uq: self.uq,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.uc.is_finite() && math::is_finite_vec(self.ul) && self.uq.is_finite()
    }

    pub fn is_plane(&self) -> bool {
        self.uq.abs() < PLANE_EPS
    }

    /// Pratt norm `sqrt(|ul|² - 4 uc uq)`. Invariant under basis changes.
    pub fn pratt_norm(&self) -> Scalar {
        (self.ul.magnitude2() - 4.0 * self.uc * self.uq).max(0.0).sqrt()
    }

    /// Scales the coefficients so that the Pratt norm is 1. Returns `None`
    /// if the field is degenerate (zero norm) or not finite.
    pub fn pratt_normalized(&self) -> Option<Self> {
        let norm = self.pratt_norm();
        if !norm.is_finite() || norm < Scalar::MIN_POSITIVE {
            return None;
        }

        Some(Self {
            center: self.center,
            uc: self.uc / norm,
            ul: self.ul / norm,
            uq: self.uq / norm,
        })
    }

    /// The center of the sphere, or `None` for planes.
    pub fn sphere_center(&self) -> Option<Point> {
        if self.is_plane() {
            None
        } else {
            Some(self.center - self.ul / (2.0 * self.uq))
        }
    }

    /// The radius of the sphere, or `None` for planes and empty spheres.
    pub fn radius(&self) -> Option<Scalar> {
        if self.is_plane() {
            return None;
        }

        let r2 = self.ul.magnitude2() / (4.0 * self.uq * self.uq) - self.uc / self.uq;
        (r2 >= 0.0).as_some_from(|| r2.sqrt())
    }

    /// Projects `x` onto the zero set with a few Newton steps along the
    /// gradient.
    pub fn project(&self, x: Point) -> Point {
        let mut x = x;
        for _ in 0..MAX_PROJECTION_STEPS {
            let g = self.gradient(x);
            let g2 = g.magnitude2();
            if g2 < Scalar::MIN_POSITIVE {
                break;
            }

            let step = g * (self.eval(x) / g2);
            if !math::is_finite_vec(step) {
                break;
            }
            x -= step;
            if step.magnitude2() < 1e-24 {
                break;
            }
        }
        x
    }

    /// Approximate unsigned distance of the point to the zero set.
    pub fn distance(&self, x: Point) -> Scalar {
        match self.pratt_normalized() {
            Some(s) => s.eval(x).abs(),
            None => self.eval(x).abs(),
        }
    }
}


// ===============================================================================================
// ===== Parameters and metric
// ===============================================================================================

/// Where the merged vertex of a collapse is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeSearch {
    /// Sample positions along the edge.
    Segment,

    /// Like `Segment`, followed by a barycentric grid over the two faces
    /// adjacent to the edge.
    Faces,
}

/// Parameters of the [`ApssMetric`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ApssParams {
    /// Size of the neighborhood (vertex rings for vertex spheres, face rings
    /// for face spheres).
    pub ring: usize,

    /// If a neighborhood has fewer than three samples, it is grown up to this
    /// ring before falling back to the tangent plane.
    pub max_ring: usize,

    /// Support radius of the kernel as multiple of the neighborhood radius.
    pub support: Scalar,

    /// Use robust implicit moving least squares weights.
    pub robust: bool,

    pub search: EdgeSearch,
}

impl Default for ApssParams {
    fn default() -> Self {
        Self {
            ring: 1,
            max_ring: 3,
            support: 1.5,
            robust: false,
            search: EdgeSearch::Segment,
        }
    }
}

/// The algebraic point set surface error metric.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ApssMetric {
    pub params: ApssParams,
}

impl ApssMetric {
    pub fn new(params: ApssParams) -> Self {
        Self { params }
    }

    /// Positions and normals of the vertices in the `ring`-ring around `v`.
    fn vertex_samples(&self, dcel: &Dcel, v: VertexHandle, ring: usize) -> Vec<(Point, Vector)> {
        let mut set = Default::default();
        dcel.vv(v).n_ring(ring, &mut set);
        let mut neighbors: Vec<_> = set.into_iter().collect();
        neighbors.sort();

        neighbors.iter()
            .map(|&n| (dcel.position(n), dcel.vertex_normal(n)))
            .collect()
    }

    /// Centroids and normals of the faces in the `ring`-ring around `f`.
    fn face_samples(&self, dcel: &Dcel, f: FaceHandle, ring: usize) -> Vec<(Point, Vector)> {
        let mut set = Default::default();
        dcel.ff(f).n_ring(ring, &mut set);
        let mut neighbors: Vec<_> = set.into_iter().collect();
        neighbors.sort();

        neighbors.iter()
            .map(|&n| (dcel.face_centroid(n), dcel.face_normal(n)))
            .collect()
    }

    /// Fits at `start`, projects, and fits again at the projection until the
    /// projection moves less than `threshold`.
    ///
    /// Fails with `Error::InsufficientNeighbors` if there are fewer than three
    /// samples or none of them gets a positive weight.
    fn fit_samples(
        &self,
        samples: &[(Point, Vector)],
        start: Point,
        threshold: Scalar,
    ) -> Result<AlgebraicSphere> {
        if samples.len() < 3 {
            return Err(Error::InsufficientNeighbors(samples.len()));
        }

        let radius = samples.iter()
            .map(|&(p, _)| p.distance(start))
            .fold(0.0, Scalar::max);
        let h = radius * self.params.support;
        if h <= 0.0 {
            // All samples lie at `start`, so the kernel is zero everywhere.
            return Err(Error::InsufficientNeighbors(0));
        }

        let mut x = start;
        let mut sphere = self.fit_at(samples, x, h)?;
        for _ in 0..MAX_FIT_ITERATIONS {
            let projected = sphere.project(x);
            let moved = projected.distance(x);
            x = projected;
            if moved < threshold {
                break;
            }
            sphere = self.fit_at(samples, x, h)?;
        }

        Ok(sphere.change_basis(x))
    }

    fn fit_at(&self, samples: &[(Point, Vector)], x: Point, h: Scalar) -> Result<AlgebraicSphere> {
        if self.params.robust {
            return rimls_fit(samples, x, h);
        }

        let weighted: Vec<_> = samples.iter()
            .map(|&(p, n)| (p, n, smooth_kernel(p.distance2(x), h)))
            .collect();
        AlgebraicSphere::fit(x, &weighted)
    }

    /// Fits to the samples of growing rings (gathered by `collect`) and
    /// falls back to `fallback` if there are never enough of them.
    fn fit_with_recovery<H: std::fmt::Debug + Copy>(
        &self,
        handle: H,
        collect: impl Fn(usize) -> Vec<(Point, Vector)>,
        start: Point,
        threshold: Scalar,
        fallback: impl FnOnce() -> AlgebraicSphere,
    ) -> Result<AlgebraicSphere> {
        let max_ring = self.params.max_ring.max(self.params.ring);
        let mut last_len = None;
        for ring in self.params.ring..=max_ring {
            let samples = collect(ring);

            // The ring stopped growing, so larger rings will not help.
            if last_len == Some(samples.len()) {
                break;
            }
            last_len = Some(samples.len());

            match self.fit_samples(&samples, start, threshold) {
                Ok(sphere) => return Ok(sphere),
                Err(Error::InsufficientNeighbors(count)) => {
                    trace!(?handle, ring, count, "too few neighbors for sphere fit");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(?handle, "not enough neighbors for a sphere fit, using the tangent plane");
        Ok(fallback())
    }

    /// Moves both `ends` of an edge to `position` and measures the given
    /// faces around it against `sphere`.
    fn measure_moved_faces(
        &self,
        dcel: &Dcel,
        faces: &[FaceHandle],
        ends: [VertexHandle; 2],
        position: Point,
        sphere: &AlgebraicSphere,
    ) -> MovedFaces {
        let normalized = sphere.pratt_normalized().unwrap_or(*sphere);
        let gradient = sphere.gradient(position);

        let mut out = MovedFaces { distance: 0.0, area: 0.0, consistent: true };
        for &f in faces {
            let mut corners = dcel.face_positions(f);
            for (corner, v) in corners.iter_mut().zip(&dcel.vertices_of_face(f)) {
                if ends.contains(v) {
                    *corner = position;
                }
            }

            let [a, b, c] = corners;
            let centroid = math::triangle_centroid(a, b, c);
            out.distance += [a, b, c, centroid].iter()
                .map(|&x| normalized.eval(x).abs())
                .sum::<Scalar>() / 4.0;
            out.area += math::triangle_area(a, b, c);
            out.consistent &= math::triangle_normal(a, b, c).dot(gradient) > 0.0;
        }
        out
    }
}

/// The faces around an edge, measured after a collapse.
#[derive(Debug, Clone, Copy)]
struct MovedFaces {
    /// Sum of the mean distances of the faces to the sphere.
    distance: Scalar,
    area: Scalar,

    /// Every face normal points along the sphere's gradient at the merged
    /// vertex.
    consistent: bool,
}

/// `(1 - (d/h)²)²` inside the support, 0 outside.
fn smooth_kernel(d2: Scalar, h: Scalar) -> Scalar {
    let x = 1.0 - d2 / (h * h);
    if x <= 0.0 { 0.0 } else { x * x }
}

/// Robust implicit MLS at `x`: iteratively reweights the samples by their
/// residual and normal deviation and moves `x` onto the implicit surface.
/// The returned sphere is fitted at `x` with the converged robust weights.
fn rimls_fit(samples: &[(Point, Vector)], x: Point, h: Scalar) -> Result<AlgebraicSphere> {
    let h2 = h * h;
    let mut alphas = vec![1.0; samples.len()];
    let mut pos = x;

    for _ in 0..RIMLS_MAX_OUTER {
        let mut f = 0.0;
        let mut grad_f = Vector::zero();

        for inner in 0..RIMLS_MAX_INNER {
            let mut sum_w = 0.0;
            let mut sum_gw = Vector::zero();
            let mut sum_f = 0.0;
            let mut sum_gf = Vector::zero();
            let mut sum_n = Vector::zero();
            let mut max_change: Scalar = 0.0;

            for (i, &(p, n)) in samples.iter().enumerate() {
                let px = pos - p;
                let fx = px.dot(n);
                let t = 1.0 - px.magnitude2() / h2;
                if t <= 0.0 {
                    max_change = max_change.max(alphas[i]);
                    alphas[i] = 0.0;
                    continue;
                }

                let alpha = if inner > 0 {
                    let r = (fx - f) / (RIMLS_SIGMA_R * h);
                    let dn = (n - grad_f).magnitude() / RIMLS_SIGMA_N;
                    (-r * r).exp() * (-dn * dn).exp()
                } else {
                    1.0
                };
                max_change = max_change.max((alpha - alphas[i]).abs());
                alphas[i] = alpha;

                let phi = t * t * t * t;
                let dphi = px * (-8.0 / h2 * t * t * t);
                let w = alpha * phi;
                let gw = dphi * alpha;
                sum_w += w;
                sum_gw += gw;
                sum_f += w * fx;
                sum_gf += gw * fx;
                sum_n += n * w;
            }

            if sum_w <= 0.0 {
                return Err(Error::InsufficientNeighbors(0));
            }

            f = sum_f / sum_w;
            grad_f = (sum_gf - sum_gw * f + sum_n) / sum_w;
            if inner > 0 && max_change < RIMLS_THRESHOLD {
                break;
            }
        }

        let step = grad_f * f;
        if !math::is_finite_vec(step) {
            return Err(Error::NonFiniteFit);
        }
        pos -= step;
        if step.magnitude() <= RIMLS_THRESHOLD {
            break;
        }
    }

    let weighted: Vec<_> = samples.iter()
        .zip(&alphas)
        .map(|(&(p, n), &alpha)| {
            let t = (1.0 - p.distance2(pos) / h2).max(0.0);
            (p, n, alpha * t * t * t * t)
        })
        .collect();
    AlgebraicSphere::fit(x, &weighted)
}

impl ErrorMetric for ApssMetric {
    type Primitive = AlgebraicSphere;
    const AFFECTED_RING: usize = 1;

    fn vertex_primitive(&self, dcel: &Dcel, v: VertexHandle) -> Result<AlgebraicSphere> {
        self.fit_with_recovery(
            v,
            |ring| self.vertex_samples(dcel, v, ring),
            dcel.position(v),
            VERTEX_FIT_THRESHOLD,
            || AlgebraicSphere::plane(dcel.position(v), dcel.vertex_normal(v)),
        )
    }

    fn face_primitive(&self, dcel: &Dcel, f: FaceHandle) -> Result<AlgebraicSphere> {
        self.fit_with_recovery(
            f,
            |ring| self.face_samples(dcel, f, ring),
            dcel.face_centroid(f),
            FACE_FIT_THRESHOLD,
            || AlgebraicSphere::plane(dcel.face_centroid(f), dcel.face_normal(f)),
        )
    }

    fn face_ring(&self) -> usize {
        self.params.ring
    }

    fn combine(&self, prims: &[(&AlgebraicSphere, Scalar)]) -> AlgebraicSphere {
        let total: Scalar = prims.iter().map(|&(_, w)| w).sum();
        let center = match prims.first() {
            None => return AlgebraicSphere::plane(Point::origin(), Vector::zero()),
            Some(&(first, _)) if total.abs() < Scalar::MIN_POSITIVE => first.center,
            Some(_) => {
                let sum = prims.iter()
                    .fold(Vector::zero(), |acc, &(s, w)| acc + s.center.to_vec() * w);
                Point::from_vec(sum / total)
            }
        };

        let mut out = AlgebraicSphere { center, uc: 0.0, ul: Vector::zero(), uq: 0.0 };
        for &(s, w) in prims {
            let s = s.change_basis(center);
            out.uc += s.uc * w;
            out.ul += s.ul * w;
            out.uq += s.uq * w;
        }
        out
    }

    fn compute_error(
        &self,
        dcel: &Dcel,
        edge: EdgeHandle,
        primitives: &DenseMap<VertexHandle, AlgebraicSphere>,
    ) -> Result<CollapseCost<AlgebraicSphere>> {
        let [a, b] = dcel.endpoints(edge);
        let (sa, sb) = (&primitives[a], &primitives[b]);
        let (pa, pb) = (dcel.position(a), dcel.position(b));

        let own_faces: Vec<_> = dcel.half_edges_of(edge)
            .iter()
            .filter_map(|&he| dcel.face_of(he))
            .collect();
        let faces: Vec<_> = dcel.ef(edge).list()
            .into_iter()
            .filter(|f| !own_faces.contains(f))
            .collect();

        if coplanar(sa, sb, pa, pb) {
            let position = pa.midpoint(pb);
            let primitive = self.combine(&[(sa, 0.5), (sb, 0.5)]).change_basis(position);
            let moved = self.measure_moved_faces(dcel, &faces, [a, b], position, &primitive);
            return Ok(CollapseCost {
                error: moved.distance,
                position,
                primitive,
                placement: Placement::Optimal,
            });
        }

        let mut best: Option<CollapseCost<AlgebraicSphere>> = None;
        let mut keep = |error: Scalar, position: Point, sphere: AlgebraicSphere| {
            if error.is_finite() && best.as_ref().map_or(true, |b| error < b.error) {
                best = Some(CollapseCost {
                    error,
                    position,
                    primitive: sphere.change_basis(position),
                    placement: Placement::Optimal,
                });
            }
        };

        // Along the edge: the sum of the face distances.
        let steps = (1.0 / SEGMENT_STEP).round() as usize;
        for i in 0..=steps {
            let alpha = i as Scalar / steps as Scalar;
            let sphere = self.combine(&[(sa, 1.0 - alpha), (sb, alpha)]);
            let position = sphere.project(pa + (pb - pa) * alpha);
            let moved = self.measure_moved_faces(dcel, &faces, [a, b], position, &sphere);
            keep(moved.distance, position, sphere);
        }

        // Inside the two faces of the edge: the face distances per area, only
        // where no moved face turns against the sphere.
        if self.params.search == EdgeSearch::Faces {
            let steps = (1.0 / FACE_GRID_STEP).round() as usize;
            for &f in &own_faces {
                let [va, vb, vc] = dcel.vertices_of_face(f);
                let [qa, qb, qc] = dcel.face_positions(f);
                for i in 0..=steps {
                    for j in 0..=(steps - i) {
                        let u = i as Scalar / steps as Scalar;
                        let v = j as Scalar / steps as Scalar;
                        let w = 1.0 - u - v;
                        let sphere = self.combine(&[
                            (&primitives[va], w),
                            (&primitives[vb], u),
                            (&primitives[vc], v),
                        ]);
                        let position = sphere.project(Point::from_vec(
                            qa.to_vec() * w + qb.to_vec() * u + qc.to_vec() * v
                        ));

                        if dcel.can_collapse(edge, Some(position)).is_err() {
                            continue;
                        }

                        let moved = self.measure_moved_faces(dcel, &faces, [a, b], position, &sphere);
                        if !moved.consistent || moved.area <= math::DEGENERATE_AREA {
                            continue;
                        }
                        keep(moved.distance / moved.area, position, sphere);
                    }
                }
            }
        }

        best.ok_or(Error::NonFiniteFit)
    }
}

/// Both spheres are the same plane and the edge lies in it.
fn coplanar(sa: &AlgebraicSphere, sb: &AlgebraicSphere, pa: Point, pb: Point) -> bool {
    if !sa.is_plane() || !sb.is_plane() {
        return false;
    }

    let (na, nb) = match (sa.pratt_normalized(), sb.pratt_normalized()) {
        (Some(na), Some(nb)) => (na, nb),
        _ => return false,
    };

    na.ul.dot(nb.ul).abs() > 1.0 - 1e-9
        && na.eval(pb).abs() < PLANE_EPS
        && nb.eval(pa).abs() < PLANE_EPS
}


#[cfg(test)]
mod tests;
