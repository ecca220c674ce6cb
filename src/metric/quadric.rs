//! Quadric error metric.

use std::ops::{Add, AddAssign, Mul};

use boolinator::Boolinator;
use cgmath::{prelude::*, Matrix3};
use num_traits::Zero;
use tracing::trace;

use crate::{
    dcel::Dcel,
    error::Result,
    handle::{EdgeHandle, FaceHandle, VertexHandle},
    map::DenseMap,
    math::{self, Point, Scalar, Vector},
};
use super::{CollapseCost, ErrorMetric, Placement};


/// Below this determinant, the quadric's matrix is considered singular and
/// no optimal position is computed.
pub const SINGULAR_DET: Scalar = 1e-4;

/// An error quadric `Q(v) = vᵀ A v + 2 bᵀ v + c`.
///
/// For a plane with unit normal `n` through point `p`, `Q(v)` is the squared
/// distance of `v` to the plane. Sums of such quadrics measure the sum of
/// squared distances to a set of planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric {
    pub a: Matrix3<Scalar>,
    pub b: Vector,
    pub c: Scalar,
}

impl Quadric {
    /// The quadric of the plane with the given normal through `point`. The
    /// normal is expected to be normalized (or zero, resulting in the zero
    /// quadric).
    pub fn from_plane(normal: Vector, point: Point) -> Self {
        let d = -normal.dot(point.to_vec());
        Self {
            a: Matrix3::from_cols(normal * normal.x, normal * normal.y, normal * normal.z),
            b: normal * d,
            c: d * d,
        }
    }

    /// Evaluates the quadric at `p`.
    pub fn eval(&self, p: Point) -> Scalar {
        let v = p.to_vec();
        v.dot(self.a * v) + 2.0 * self.b.dot(v) + self.c
    }

    /// The position minimizing this quadric (solution of `A v = -b`), or
    /// `None` if `A` is (near) singular.
    pub fn optimal_position(&self) -> Option<Point> {
        if self.a.determinant().abs() < SINGULAR_DET {
            return None;
        }

        let v = self.a.invert()? * -self.b;
        math::is_finite_vec(v).as_some(Point::from_vec(v))
    }
}

impl Zero for Quadric {
    fn zero() -> Self {
        Self {
            a: Matrix3::zero(),
            b: Vector::zero(),
            c: 0.0,
        }
    }

    fn is_zero(&self) -> bool {
        self.a.is_zero() && self.b.is_zero() && self.c == 0.0
    }
}

impl Add for Quadric {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            a: self.a + rhs.a,
            b: self.b + rhs.b,
            c: self.c + rhs.c,
        }
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Mul<Scalar> for Quadric {
    type Output = Self;
    fn mul(self, rhs: Scalar) -> Self {
        Self {
            a: self.a * rhs,
            b: self.b * rhs,
            c: self.c * rhs,
        }
    }
}


/// How the face quadrics around a vertex are weighted when summing them up
/// to the vertex quadric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuadricWeighting {
    /// Interior angle of the face at the vertex.
    WedgeAngle,

    /// Face area.
    Area,

    /// All faces weigh the same.
    Uniform,
}

impl Default for QuadricWeighting {
    fn default() -> Self {
        QuadricWeighting::WedgeAngle
    }
}

/// The quadric error metric.
///
/// The primitive of a face is the quadric of its supporting plane, the
/// primitive of a vertex is the weighted sum of the quadrics of its faces.
/// An edge is rated by the average of its endpoints' quadrics, evaluated at
/// its minimum. If the quadric is singular, the better of the two endpoints
/// and the edge midpoint is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct QuadricMetric {
    pub weighting: QuadricWeighting,
}

impl QuadricMetric {
    pub fn new(weighting: QuadricWeighting) -> Self {
        Self { weighting }
    }
}

impl ErrorMetric for QuadricMetric {
    type Primitive = Quadric;
    const AFFECTED_RING: usize = 0;

    fn vertex_primitive(&self, dcel: &Dcel, v: VertexHandle) -> Result<Quadric> {
        let mut q = Quadric::zero();
        for f in dcel.vf(v).list() {
            let weight = match self.weighting {
                QuadricWeighting::Uniform => 1.0,
                QuadricWeighting::Area => dcel.face_area(f),
                QuadricWeighting::WedgeAngle => {
                    let [a, b, c] = dcel.vertices_of_face(f);
                    let [pa, pb, pc] = dcel.face_positions(f);
                    if v == a {
                        math::wedge_angle(pa, pb, pc)
                    } else if v == b {
                        math::wedge_angle(pb, pc, pa)
                    } else {
                        debug_assert_eq!(v, c);
                        math::wedge_angle(pc, pa, pb)
                    }
                }
            };

            q += self.face_primitive(dcel, f)? * weight;
        }

        Ok(q)
    }

    fn face_primitive(&self, dcel: &Dcel, f: FaceHandle) -> Result<Quadric> {
        let [p, _, _] = dcel.face_positions(f);
        Ok(Quadric::from_plane(dcel.face_normal(f), p))
    }

    fn combine(&self, prims: &[(&Quadric, Scalar)]) -> Quadric {
        prims.iter().fold(Quadric::zero(), |acc, &(q, w)| acc + *q * w)
    }

    fn compute_error(
        &self,
        dcel: &Dcel,
        edge: EdgeHandle,
        primitives: &DenseMap<VertexHandle, Quadric>,
    ) -> Result<CollapseCost<Quadric>> {
        let [a, b] = dcel.endpoints(edge);
        let q = self.combine(&[(&primitives[a], 0.5), (&primitives[b], 0.5)]);

        if let Some(position) = q.optimal_position() {
            return Ok(CollapseCost {
                error: q.eval(position).max(0.0),
                position,
                primitive: q,
                placement: Placement::Optimal,
            });
        }

        let pa = dcel.position(a);
        let pb = dcel.position(b);
        let candidates = [pa, pb, pa.midpoint(pb)];
        let mut position = candidates[0];
        let mut error = q.eval(position);
        for &candidate in &candidates[1..] {
            let e = q.eval(candidate);
            if e < error {
                position = candidate;
                error = e;
            }
        }

        trace!(?edge, error, "singular quadric, using fallback position");
        Ok(CollapseCost {
            error: error.max(0.0),
            position,
            primitive: q,
            placement: Placement::Fallback,
        })
    }
}


#[cfg(test)]
mod tests {
    use crate::{
        dcel::Dcel,
        math::approx_eq,
        test_utils::{cube, grid},
    };
    use super::*;

    fn p(x: Scalar, y: Scalar, z: Scalar) -> Point {
        Point::new(x, y, z)
    }

    #[test]
    fn plane_quadric_is_squared_distance() {
        let q = Quadric::from_plane(Vector::unit_z(), p(3.0, -2.0, 1.0));
        assert!(approx_eq(q.eval(p(0.0, 0.0, 1.0)), 0.0, 1e-12));
        assert!(approx_eq(q.eval(p(7.0, 1.0, 3.0)), 4.0, 1e-12));
        assert!(approx_eq(q.eval(p(-2.0, 5.0, -1.0)), 4.0, 1e-12));

        // A single plane doesn't have a unique minimum.
        assert_eq!(q.optimal_position(), None);
    }

    #[test]
    fn three_planes_have_a_corner() {
        let q = Quadric::from_plane(Vector::unit_x(), p(1.0, 0.0, 0.0))
            + Quadric::from_plane(Vector::unit_y(), p(0.0, 2.0, 0.0))
            + Quadric::from_plane(Vector::unit_z(), p(0.0, 0.0, 3.0));

        let corner = q.optimal_position().unwrap();
        assert!((corner - p(1.0, 2.0, 3.0)).magnitude() < 1e-9);
        assert!(approx_eq(q.eval(corner), 0.0, 1e-9));
    }

    #[test]
    fn combine_is_commutative() {
        let metric = QuadricMetric::default();
        let q1 = Quadric::from_plane(Vector::new(1.0, 2.0, 2.0) / 3.0, p(1.0, 0.0, 0.0));
        let q2 = Quadric::from_plane(Vector::unit_y(), p(0.0, -1.0, 4.0));

        let ab = metric.combine(&[(&q1, 0.5), (&q2, 0.5)]);
        let ba = metric.combine(&[(&q2, 0.5), (&q1, 0.5)]);
        for x in &[p(0.0, 0.0, 0.0), p(1.0, 2.0, 3.0), p(-4.0, 0.5, 2.0)] {
            assert!(approx_eq(ab.eval(*x), ba.eval(*x), 1e-12));
        }
        assert!(approx_eq(ab.eval(p(0.0, 0.0, 0.0)), 0.5 * q1.eval(p(0.0, 0.0, 0.0)) + 0.5, 1e-12));
    }

    #[test]
    fn planar_patch_has_zero_error() {
        let mesh = grid(4);
        let dcel = Dcel::from_triangles(&mesh.positions, &mesh.triangles).unwrap();
        let metric = QuadricMetric::default();

        let mut prims = DenseMap::new();
        for v in dcel.vertices() {
            prims.insert(v, metric.vertex_primitive(&dcel, v).unwrap());
        }

        for v in dcel.vertices() {
            for x in &[p(0.3, 0.7, 0.0), p(-5.0, 2.0, 0.0)] {
                assert!(approx_eq(prims[v].eval(*x), 0.0, 1e-12));
            }
            assert!(prims[v].eval(p(1.0, 1.0, 1.0)) > 0.0);
        }

        for e in dcel.edges() {
            let cost = metric.compute_error(&dcel, e, &prims).unwrap();
            assert!(approx_eq(cost.error, 0.0, 1e-12));
            assert_eq!(cost.placement, Placement::Fallback);
            assert!(approx_eq(cost.position.z, 0.0, 1e-12));
        }
    }

    #[test]
    fn cube_corner_is_optimal() {
        let mesh = cube();
        let dcel = Dcel::from_triangles(&mesh.positions, &mesh.triangles).unwrap();
        let metric = QuadricMetric::new(QuadricWeighting::Uniform);

        let prims: DenseMap<_, _> = dcel.vertices()
            .map(|v| (v, metric.vertex_primitive(&dcel, v).unwrap()))
            .collect();

        // Every cube corner lies on three orthogonal planes, so each vertex
        // quadric is zero exactly at its corner.
        for v in dcel.vertices() {
            let q = prims[v];
            assert!(approx_eq(q.eval(dcel.position(v)), 0.0, 1e-12));
            let opt = q.optimal_position().unwrap();
            assert!((opt - dcel.position(v)).magnitude() < 1e-9);
        }

        for e in dcel.edges() {
            let cost = metric.compute_error(&dcel, e, &prims).unwrap();
            assert!(cost.error >= 0.0);
        }
    }
}
