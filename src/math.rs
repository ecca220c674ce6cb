//! Geometric primitives and small numerical helpers.
//!
//! All geometry in this crate uses `cgmath` types over [`Scalar`] (`f64`).

use std::fmt;

use cgmath::{prelude::*, Point3, Vector3};
use num_traits::{Float, Zero};


/// The floating point type used for all geometry.
pub type Scalar = f64;

/// Shorthand for a position in 3D space.
pub type Point = Point3<Scalar>;

/// Shorthand for a direction or offset in 3D space.
pub type Vector = Vector3<Scalar>;

/// Triangles with an area below this are treated as degenerate.
pub const DEGENERATE_AREA: Scalar = 1e-14;


/// Returns `true` if `a` and `b` differ by at most `eps`.
pub fn approx_eq<F: Float>(a: F, b: F, eps: F) -> bool {
    (a - b).abs() <= eps
}

/// Returns `true` if all components of `v` are finite.
pub fn is_finite_vec(v: Vector) -> bool {
    v.x.is_finite() && v.y.is_finite() && v.z.is_finite()
}


// ===============================================================================================
// ===== Triangle helpers
// ===============================================================================================

/// The non-normalized normal of the counter clockwise triangle `abc`. Its
/// length is twice the area of the triangle.
pub fn triangle_cross(a: Point, b: Point, c: Point) -> Vector {
    (b - a).cross(c - a)
}

/// The unit normal of the counter clockwise triangle `abc`. Returns the zero
/// vector for degenerate triangles.
pub fn triangle_normal(a: Point, b: Point, c: Point) -> Vector {
    let n = triangle_cross(a, b, c);
    let len = n.magnitude();
    if len * 0.5 <= DEGENERATE_AREA {
        Vector::zero()
    } else {
        n / len
    }
}

pub fn triangle_area(a: Point, b: Point, c: Point) -> Scalar {
    triangle_cross(a, b, c).magnitude() * 0.5
}

pub fn triangle_centroid(a: Point, b: Point, c: Point) -> Point {
    Point::centroid(&[a, b, c])
}

/// The interior angle (in radians) at `corner` of the triangle spanned by
/// `corner`, `a` and `b`.
pub fn wedge_angle(corner: Point, a: Point, b: Point) -> Scalar {
    let u = a - corner;
    let v = b - corner;
    let denom = u.magnitude() * v.magnitude();
    if denom == 0.0 {
        return 0.0;
    }

    (u.dot(v) / denom).max(-1.0).min(1.0).acos()
}

/// Intersects the ray with triangle `abc` (Möller–Trumbore, both sides).
/// Returns the ray parameter `t >= 0` of the hit, if any.
pub fn ray_triangle(ray: &Ray, a: Point, b: Point, c: Point) -> Option<Scalar> {
    const EPS: Scalar = 1e-12;

    let e1 = b - a;
    let e2 = c - a;
    let p = ray.dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPS {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = ray.origin - a;
    let u = s.dot(p) * inv_det;
    if u < 0.0 || u > 1.0 {
        return None;
    }

    let q = s.cross(e1);
    let v = ray.dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = e2.dot(q) * inv_det;
    if t >= 0.0 {
        Some(t)
    } else {
        None
    }
}

/// Returns the point of triangle `abc` closest to `p`.
pub fn closest_point_on_triangle(p: Point, a: Point, b: Point, c: Point) -> Point {
    // Voronoi region tests, following "Real-Time Collision Detection" 5.1.5
    let ab = b - a;
    let ac = c - a;
    let ap = p - a;
    let d1 = ab.dot(ap);
    let d2 = ac.dot(ap);
    if d1 <= 0.0 && d2 <= 0.0 {
        return a;
    }

    let bp = p - b;
    let d3 = ab.dot(bp);
    let d4 = ac.dot(bp);
    if d3 >= 0.0 && d4 <= d3 {
        return b;
    }

    let vc = d1 * d4 - d3 * d2;
    if vc <= 0.0 && d1 >= 0.0 && d3 <= 0.0 {
        let v = d1 / (d1 - d3);
        return a + ab * v;
    }

    let cp = p - c;
    let d5 = ab.dot(cp);
    let d6 = ac.dot(cp);
    if d6 >= 0.0 && d5 <= d6 {
        return c;
    }

    let vb = d5 * d2 - d1 * d6;
    if vb <= 0.0 && d2 >= 0.0 && d6 <= 0.0 {
        let w = d2 / (d2 - d6);
        return a + ac * w;
    }

    let va = d3 * d6 - d5 * d4;
    if va <= 0.0 && (d4 - d3) >= 0.0 && (d5 - d6) >= 0.0 {
        let w = (d4 - d3) / ((d4 - d3) + (d5 - d6));
        return b + (c - b) * w;
    }

    let denom = 1.0 / (va + vb + vc);
    let v = vb * denom;
    let w = vc * denom;
    a + ab * v + ac * w
}


// ===============================================================================================
// ===== Ray
// ===============================================================================================

/// A half-infinite ray `origin + t * dir` with `t >= 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Point,
    pub dir: Vector,
}

impl Ray {
    pub fn new(origin: Point, dir: Vector) -> Self {
        Self { origin, dir }
    }

    /// Returns the point at parameter `t`.
    pub fn at(&self, t: Scalar) -> Point {
        self.origin + self.dir * t
    }
}


// ===============================================================================================
// ===== Aabb
// ===============================================================================================

/// An axis aligned bounding box.
#[derive(Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Point,
    pub max: Point,
}

impl Aabb {
    /// Creates an invalid bounding box: all lower bounds are ∞, all upper
    /// bounds are -∞. Once a single point is added, the box is valid.
    pub fn new() -> Self {
        let inf = Scalar::infinity();
        Self {
            min: Point::new(inf, inf, inf),
            max: Point::new(-inf, -inf, -inf),
        }
    }

    /// Creates a bounding box around all given points. If the iterator is
    /// empty, an invalid bounding box is returned.
    pub fn around(points: impl IntoIterator<Item = Point>) -> Self {
        let mut out = Self::new();
        for p in points {
            out.add_point(p);
        }
        out
    }

    /// Enlarges the box to contain `p`.
    pub fn add_point(&mut self, p: Point) {
        for i in 0..3 {
            self.min[i] = self.min[i].min(p[i]);
            self.max[i] = self.max[i].max(p[i]);
        }
    }

    /// Enlarges the box to contain `other`.
    pub fn add_box(&mut self, other: &Aabb) {
        if other.is_valid() {
            self.add_point(other.min);
            self.add_point(other.max);
        }
    }

    /// Returns `true` if all bounds are finite.
    pub fn is_valid(&self) -> bool {
        (0..3).all(|i| self.min[i].is_finite() && self.max[i].is_finite())
    }

    pub fn center(&self) -> Point {
        self.min.midpoint(self.max)
    }

    pub fn extent(&self) -> Vector {
        self.max - self.min
    }

    /// Index (0, 1 or 2) of the axis with the largest extent.
    pub fn longest_axis(&self) -> usize {
        let e = self.extent();
        if e.x >= e.y && e.x >= e.z {
            0
        } else if e.y >= e.z {
            1
        } else {
            2
        }
    }

    pub fn contains(&self, p: Point) -> bool {
        (0..3).all(|i| self.min[i] <= p[i] && p[i] <= self.max[i])
    }

    /// Squared distance from `p` to the box (0 if `p` is inside).
    pub fn distance2(&self, p: Point) -> Scalar {
        let mut d = 0.0;
        for i in 0..3 {
            let excess = if p[i] < self.min[i] {
                self.min[i] - p[i]
            } else if p[i] > self.max[i] {
                p[i] - self.max[i]
            } else {
                0.0
            };
            d += excess * excess;
        }
        d
    }

    /// Slab test. Returns the parameter interval `[t_enter, t_exit]` (clipped
    /// to `t >= 0`) in which the ray is inside the box.
    pub fn intersect_ray(&self, ray: &Ray) -> Option<(Scalar, Scalar)> {
        let mut t_min: Scalar = 0.0;
        let mut t_max = Scalar::infinity();
        for i in 0..3 {
            if ray.dir[i] == 0.0 {
                if ray.origin[i] < self.min[i] || ray.origin[i] > self.max[i] {
                    return None;
                }
                continue;
            }

            let inv = 1.0 / ray.dir[i];
            let mut t0 = (self.min[i] - ray.origin[i]) * inv;
            let mut t1 = (self.max[i] - ray.origin[i]) * inv;
            if t0 > t1 {
                std::mem::swap(&mut t0, &mut t1);
            }
            t_min = t_min.max(t0);
            t_max = t_max.min(t1);
            if t_min > t_max {
                return None;
            }
        }

        Some((t_min, t_max))
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Aabb {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Aabb")
            .field("x", &(self.min.x..self.max.x))
            .field("y", &(self.min.y..self.max.y))
            .field("z", &(self.min.z..self.max.z))
            .finish()
    }
}
