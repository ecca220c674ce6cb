//! Mesh fixtures and assertion helpers shared by the unit tests.

use std::{collections::HashMap, fmt::Debug};

use cgmath::prelude::*;

use crate::{
    dcel::{Dcel, IndexedMesh},
    math::{Point, Scalar},
};


/// Asserts that two slices are equal when treated as rings (i.e. one is a
/// rotation of the other).
macro_rules! assert_rotated_eq {
    ($lhs:expr, $rhs:expr) => {{
        let lhs = $lhs;
        let rhs = $rhs;
        if let Err(rotated) = crate::test_utils::cmp_rotated(&lhs, &rhs) {
            panic!(
                "assert_rotated_eq failed:\n\
                    |  left: {:?} ({})\n\
                    | right: {:?} ({}, rotated)\n",
                lhs,
                stringify!($lhs),
                rotated,
                stringify!($rhs),
            );
        }
    }};
}

/// Compares `actual` and `expected` as rings: `[a, b, c]`, `[b, c, a]` and
/// `[c, a, b]` are all equal.
///
/// On mismatch, returns `Err(rotated)` where `rotated` is `expected` rotated
/// to look as similar to `actual` as possible (for the error message).
pub(crate) fn cmp_rotated<T: Debug + PartialEq + Clone>(
    actual: &[T],
    expected: &[T],
) -> Result<(), Vec<T>> {
    let mut rotated = expected.to_vec();
    if actual.len() != expected.len() {
        return Err(rotated);
    }

    if !actual.is_empty() {
        let pos = match actual.iter().position(|e| e == &expected[0]) {
            Some(pos) => pos,
            None => return Err(rotated),
        };
        rotated.rotate_right(pos);

        if actual != &rotated[..] {
            return Err(rotated);
        }
    }

    Ok(())
}

fn p(x: Scalar, y: Scalar, z: Scalar) -> Point {
    Point::new(x, y, z)
}

pub(crate) fn build(mesh: &IndexedMesh) -> Dcel {
    Dcel::from_triangles(&mesh.positions, &mesh.triangles)
        .expect("fixture is not a valid mesh")
}

/// Two triangles sharing the edge between vertex 1 and 2.
///
/// ```text
///   2 ---- 3
///   | \    |
///   |   \  |
///   0 ---- 1
/// ```
pub(crate) fn strip() -> IndexedMesh {
    IndexedMesh::new(
        vec![p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0), p(1.0, 1.0, 0.0)],
        vec![[0, 1, 2], [2, 1, 3]],
    )
}

pub(crate) fn tetrahedron() -> IndexedMesh {
    IndexedMesh::new(
        vec![p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(0.0, 1.0, 0.0), p(0.0, 0.0, 1.0)],
        vec![[0, 2, 1], [0, 1, 3], [0, 3, 2], [1, 2, 3]],
    )
}

/// The unit cube: 8 vertices, 12 triangles, outward facing.
pub(crate) fn cube() -> IndexedMesh {
    IndexedMesh::new(
        vec![
            p(0.0, 0.0, 0.0), p(1.0, 0.0, 0.0), p(1.0, 1.0, 0.0), p(0.0, 1.0, 0.0),
            p(0.0, 0.0, 1.0), p(1.0, 0.0, 1.0), p(1.0, 1.0, 1.0), p(0.0, 1.0, 1.0),
        ],
        vec![
            [0, 2, 1], [0, 3, 2], // bottom
            [4, 5, 6], [4, 6, 7], // top
            [0, 1, 5], [0, 5, 4], // front
            [3, 7, 6], [3, 6, 2], // back
            [0, 4, 7], [0, 7, 3], // left
            [1, 2, 6], [1, 6, 5], // right
        ],
    )
}

/// A flat `n x n` grid of unit quads in the `z = 0` plane, each split into
/// two triangles. Vertex `(i, j)` has index `j * (n + 1) + i`.
pub(crate) fn grid(n: usize) -> IndexedMesh {
    height_field(n, |_, _| 0.0)
}

/// Like `grid`, but with `z = height(x, y)`.
pub(crate) fn height_field(n: usize, height: impl Fn(Scalar, Scalar) -> Scalar) -> IndexedMesh {
    let idx = |i: usize, j: usize| j * (n + 1) + i;

    let mut positions = Vec::new();
    for j in 0..=n {
        for i in 0..=n {
            let (x, y) = (i as Scalar, j as Scalar);
            positions.push(p(x, y, height(x, y)));
        }
    }

    let mut triangles = Vec::new();
    for j in 0..n {
        for i in 0..n {
            triangles.push([idx(i, j), idx(i + 1, j), idx(i + 1, j + 1)]);
            triangles.push([idx(i, j), idx(i + 1, j + 1), idx(i, j + 1)]);
        }
    }

    IndexedMesh::new(positions, triangles)
}

/// A unit icosphere: the icosahedron, subdivided `subdivisions` times with
/// all vertices projected onto the unit sphere.
pub(crate) fn sphere(subdivisions: usize) -> IndexedMesh {
    let t = (1.0 + (5.0 as Scalar).sqrt()) / 2.0;
    let mut positions: Vec<Point> = vec![
        p(-1.0, t, 0.0), p(1.0, t, 0.0), p(-1.0, -t, 0.0), p(1.0, -t, 0.0),
        p(0.0, -1.0, t), p(0.0, 1.0, t), p(0.0, -1.0, -t), p(0.0, 1.0, -t),
        p(t, 0.0, -1.0), p(t, 0.0, 1.0), p(-t, 0.0, -1.0), p(-t, 0.0, 1.0),
    ];
    for pos in &mut positions {
        *pos = Point::from_vec(pos.to_vec().normalize());
    }

    let mut triangles = vec![
        [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
        [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
        [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
        [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
    ];

    for _ in 0..subdivisions {
        let mut midpoints = HashMap::new();
        let mut midpoint = |a: usize, b: usize, positions: &mut Vec<Point>| -> usize {
            let key = (a.min(b), a.max(b));
            *midpoints.entry(key).or_insert_with(|| {
                let m = positions[a].midpoint(positions[b]);
                positions.push(Point::from_vec(m.to_vec().normalize()));
                positions.len() - 1
            })
        };

        let mut next = Vec::with_capacity(triangles.len() * 4);
        for &[a, b, c] in &triangles {
            let ab = midpoint(a, b, &mut positions);
            let bc = midpoint(b, c, &mut positions);
            let ca = midpoint(c, a, &mut positions);
            next.push([a, ab, ca]);
            next.push([b, bc, ab]);
            next.push([c, ca, bc]);
            next.push([ab, bc, ca]);
        }
        triangles = next;
    }

    IndexedMesh::new(positions, triangles)
}

/// Deterministic pseudo random points in `[-1, 1]³`.
pub(crate) fn lcg_points(n: usize, seed: u64) -> Vec<Point> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut next = || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((state >> 11) as Scalar / (1u64 << 53) as Scalar) * 2.0 - 1.0
    };

    (0..n).map(|_| p(next(), next(), next())).collect()
}
