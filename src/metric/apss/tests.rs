use crate::{
    dcel::Dcel,
    math::approx_eq,
    test_utils::{build, grid, height_field, lcg_points, sphere},
};
use super::*;


fn p(x: Scalar, y: Scalar, z: Scalar) -> Point {
    Point::new(x, y, z)
}

fn vertex_prims(metric: &ApssMetric, dcel: &Dcel) -> DenseMap<VertexHandle, AlgebraicSphere> {
    dcel.vertices()
        .map(|v| (v, metric.vertex_primitive(dcel, v).unwrap()))
        .collect()
}

#[test]
fn fit_recovers_sphere() {
    let center = p(1.0, 2.0, 3.0);
    let samples: Vec<_> = sphere(1).positions.iter()
        .map(|dir| (center + dir.to_vec() * 2.0, dir.to_vec(), 1.0))
        .collect();

    let fitted = AlgebraicSphere::fit(samples[0].0, &samples).unwrap();
    assert!(!fitted.is_plane());
    assert!((fitted.sphere_center().unwrap() - center).magnitude() < 1e-6);
    assert!(approx_eq(fitted.radius().unwrap(), 2.0, 1e-6));
    assert!(approx_eq(fitted.pratt_norm(), 1.0, 1e-9));

    // Close to the surface, a Pratt normalized field is a signed distance.
    let outside = center + Vector::unit_x() * 2.01;
    assert!(approx_eq(fitted.eval(outside), 0.01, 1e-4));
}

#[test]
fn fit_needs_three_weighted_samples() {
    let n = Vector::unit_z();
    let two = [(p(0.0, 0.0, 0.0), n, 1.0), (p(1.0, 0.0, 0.0), n, 1.0)];
    assert_eq!(AlgebraicSphere::fit(p(0.0, 0.0, 0.0), &two), Err(Error::InsufficientNeighbors(2)));

    let metric = ApssMetric::default();
    let start = p(0.0, 0.0, 0.0);
    assert_eq!(
        metric.fit_samples(&[(start, n), (p(1.0, 0.0, 0.0), n)], start, 1e-3),
        Err(Error::InsufficientNeighbors(2)),
    );
    assert_eq!(
        metric.fit_samples(&[(start, n); 4], start, 1e-3),
        Err(Error::InsufficientNeighbors(0)),
    );

    let zero_weight = [
        (p(0.0, 0.0, 0.0), n, 1.0),
        (p(1.0, 0.0, 0.0), n, 0.5),
        (p(0.0, 1.0, 0.0), n, 0.0),
    ];
    assert_eq!(
        AlgebraicSphere::fit(p(0.0, 0.0, 0.0), &zero_weight),
        Err(Error::InsufficientNeighbors(2)),
    );
}

#[test]
fn basis_change_and_projection() {
    // |x|² - 1
    let unit = AlgebraicSphere {
        center: Point::origin(),
        uc: -1.0,
        ul: Vector::zero(),
        uq: 1.0,
    };
    assert!((unit.sphere_center().unwrap() - Point::origin()).magnitude() < 1e-12);
    assert!(approx_eq(unit.radius().unwrap(), 1.0, 1e-12));

    let moved = unit.change_basis(p(0.3, -0.2, 0.5));
    for &x in &[p(0.0, 0.0, 0.0), p(2.0, 1.0, 0.5), p(-1.0, 3.0, -2.0)] {
        assert!(approx_eq(unit.eval(x), moved.eval(x), 1e-12));
        assert!((unit.gradient(x) - moved.gradient(x)).magnitude() < 1e-12);
    }
    assert!(approx_eq(unit.pratt_norm(), moved.pratt_norm(), 1e-12));

    let projected = moved.project(p(2.0, 1.0, 0.5));
    assert!(approx_eq(projected.to_vec().magnitude(), 1.0, 1e-9));

    let plane = AlgebraicSphere::plane(p(0.0, 0.0, 2.0), Vector::unit_z());
    assert!(plane.is_plane());
    assert_eq!(plane.radius(), None);
    assert!((plane.project(p(4.0, 5.0, -1.0)) - p(4.0, 5.0, 2.0)).magnitude() < 1e-12);
}

#[test]
fn combine_is_linear() {
    let metric = ApssMetric::default();
    let a = AlgebraicSphere { center: p(1.0, 0.0, 0.0), uc: -0.5, ul: Vector::unit_x(), uq: 0.5 };
    let b = AlgebraicSphere::plane(p(0.0, 2.0, 1.0), Vector::new(0.0, 0.6, 0.8));

    let ab = metric.combine(&[(&a, 0.25), (&b, 0.75)]);
    let ba = metric.combine(&[(&b, 0.75), (&a, 0.25)]);
    for &x in &[p(0.0, 0.0, 0.0), p(1.0, 2.0, 3.0), p(-4.0, 0.5, 2.0)] {
        let expected = 0.25 * a.eval(x) + 0.75 * b.eval(x);
        assert!(approx_eq(ab.eval(x), expected, 1e-12));
        assert!(approx_eq(ba.eval(x), expected, 1e-12));
    }
}

#[test]
fn planar_patch_has_zero_error() {
    let dcel = build(&grid(4));
    let metric = ApssMetric::default();
    let prims = vertex_prims(&metric, &dcel);

    for v in dcel.vertices() {
        assert!(prims[v].is_plane());
        for &x in &[p(0.3, 0.7, 0.0), p(3.5, 1.0, 0.0)] {
            assert!(approx_eq(prims[v].eval(x), 0.0, 1e-9));
        }
    }

    for e in dcel.edges() {
        let [a, b] = dcel.endpoints(e);
        let cost = metric.compute_error(&dcel, e, &prims).unwrap();
        assert!(approx_eq(cost.error, 0.0, 1e-9));
        assert_eq!(cost.placement, Placement::Optimal);
        assert!((cost.position - dcel.position(a).midpoint(dcel.position(b))).magnitude() < 1e-12);
    }
}

#[test]
fn icosphere_vertices_fit_the_sphere() {
    let dcel = build(&sphere(2));

    for &robust in &[false, true] {
        let metric = ApssMetric::new(ApssParams { robust, ..ApssParams::default() });
        for v in dcel.vertices() {
            let s = metric.vertex_primitive(&dcel, v).unwrap();
            assert!(s.is_finite());
            assert!(s.distance(dcel.position(v)) < 0.1);

            if !robust {
                let r = s.radius().unwrap();
                assert!(r > 0.7 && r < 1.4, "radius {} at {:?}", r, v);
            }
        }
    }
}

#[test]
fn lonely_face_falls_back_to_plane() {
    let dcel = Dcel::from_triangles(
        &[p(0.0, 0.0, 1.0), p(1.0, 0.0, 1.0), p(0.0, 1.0, 1.0)],
        &[[0, 1, 2]],
    ).unwrap();
    let metric = ApssMetric::default();

    let f = dcel.faces().next().unwrap();
    let s = metric.face_primitive(&dcel, f).unwrap();
    assert!(s.is_plane());
    for pos in &dcel.face_positions(f) {
        assert!(approx_eq(s.eval(*pos), 0.0, 1e-12));
    }

    // Each vertex sees all three, which is just enough.
    for v in dcel.vertices() {
        let s = metric.vertex_primitive(&dcel, v).unwrap();
        assert!(approx_eq(s.distance(p(0.3, 0.3, 1.0)), 0.0, 1e-9));
    }
}

#[test]
fn face_search_is_never_worse() {
    let dcel = build(&height_field(4, |x, y| 0.05 * (x * x + y * y)));
    let segment = ApssMetric::default();
    let faces = ApssMetric::new(ApssParams { search: EdgeSearch::Faces, ..ApssParams::default() });
    let prims = vertex_prims(&segment, &dcel);

    for e in dcel.edges().filter(|&e| !dcel.is_boundary_edge(e)) {
        let [a, b] = dcel.endpoints(e);
        let (pa, pb) = (dcel.position(a), dcel.position(b));

        let on_edge = segment.compute_error(&dcel, e, &prims).unwrap();
        assert!(on_edge.error.is_finite() && on_edge.error >= 0.0);
        assert!(on_edge.primitive.distance(on_edge.position) < 1e-6);
        let scale = pa.distance(pb);
        assert!(on_edge.position.distance(pa.midpoint(pb)) < scale);

        let in_faces = faces.compute_error(&dcel, e, &prims).unwrap();
        assert!(in_faces.error <= on_edge.error + 1e-12);
    }
}

#[test]
fn non_finite_input_fails_the_fit() {
    let n = Vector::unit_z();
    let samples = [
        (p(0.0, 0.0, 0.0), n, 1.0),
        (p(1.0, 0.0, 0.0), n, 1.0),
        (p(0.0, 1.0, 0.0), n, 1.0),
        (p(Scalar::NAN, 0.0, 0.0), n, 1.0),
    ];
    assert_eq!(AlgebraicSphere::fit(p(0.0, 0.0, 0.0), &samples), Err(Error::NonFiniteFit));

    let dcel = build(&grid(2));
    let broken = AlgebraicSphere {
        center: Point::origin(),
        uc: Scalar::NAN,
        ul: Vector::unit_z(),
        uq: Scalar::NAN,
    };
    let prims: DenseMap<_, _> = dcel.vertices().map(|v| (v, broken)).collect();
    let e = dcel.edges().find(|&e| !dcel.is_boundary_edge(e)).unwrap();
    assert_eq!(
        ApssMetric::default().compute_error(&dcel, e, &prims),
        Err(Error::NonFiniteFit),
    );
}

#[test]
fn rimls_settles_on_noisy_sphere() {
    let mesh = sphere(2);
    let noise = lcg_points(mesh.positions.len(), 7);
    let samples: Vec<_> = mesh.positions.iter()
        .zip(&noise)
        .map(|(dir, jitter)| {
            let dir = dir.to_vec().normalize();
            (Point::from_vec(dir * (1.0 + 0.01 * jitter.x)), dir)
        })
        .collect();

    for &dir in &[Vector::unit_x(), Vector::new(0.0, 0.6, -0.8), Vector::new(-0.48, 0.6, 0.64)] {
        let x = Point::from_vec(dir * 1.1);
        let s = rimls_fit(&samples, x, 1.0).unwrap();
        assert!(s.is_finite());

        let on_surface = s.project(x);
        assert!(approx_eq(on_surface.to_vec().magnitude(), 1.0, 0.03), "{:?}", on_surface);
        assert!(on_surface.to_vec().normalize().dot(dir) > 0.99);
    }
}

/// Sum of the mean corner and centroid distances of the faces around `v`.
fn distance_around(dcel: &Dcel, v: VertexHandle, s: &AlgebraicSphere) -> (Scalar, Scalar) {
    dcel.vf(v).list()
        .into_iter()
        .map(|f| {
            let [a, b, c] = dcel.face_positions(f);
            let centroid = math::triangle_centroid(a, b, c);
            let distance = [a, b, c, centroid].iter().map(|&x| s.distance(x)).sum::<Scalar>() / 4.0;
            (distance, math::triangle_area(a, b, c))
        })
        .fold((0.0, 0.0), |(d, area), (fd, fa)| (d + fd, area + fa))
}

#[test]
fn error_measures_the_collapsed_faces() {
    let dcel = build(&sphere(2));
    let segment = ApssMetric::default();
    let faces = ApssMetric::new(ApssParams { search: EdgeSearch::Faces, ..ApssParams::default() });
    let prims = vertex_prims(&segment, &dcel);

    let mut checked = 0;
    for e in dcel.edges().step_by(7) {
        let cost = segment.compute_error(&dcel, e, &prims).unwrap();
        let mut collapsed = dcel.clone();
        if let Ok(split) = collapsed.collapse_edge_to(e, cost.position) {
            let (distance, _) = distance_around(&collapsed, split.kept_vertex(), &cost.primitive);
            assert!(approx_eq(cost.error, distance, 1e-9), "{} vs {}", cost.error, distance);
            checked += 1;
        }

        // The face scan rates by distance per area, where no face turns
        // against the sphere.
        let cost = faces.compute_error(&dcel, e, &prims).unwrap();
        let mut collapsed = dcel.clone();
        if let Ok(split) = collapsed.collapse_edge_to(e, cost.position) {
            let kept = split.kept_vertex();
            let (distance, area) = distance_around(&collapsed, kept, &cost.primitive);
            if !approx_eq(cost.error, distance, 1e-9) {
                assert!(approx_eq(cost.error, distance / area, 1e-9));
                let gradient = cost.primitive.gradient(cost.position);
                for f in collapsed.vf(kept).list() {
                    assert!(collapsed.face_normal(f).dot(gradient) > 0.0);
                }
            }
        }
    }
    assert!(checked > 10);
}
