//! Measures building, simplifying and refining progressive meshes.

use criterion::{
    criterion_group, criterion_main, black_box, BatchSize, Criterion,
};

use lodmesh::{
    ApssMetric, Dcel, IndexedMesh, ProgressiveMesh, QuadricMetric,
    kdtree::PointKdTree,
    math::{Point, Scalar},
};


// ===============================================================================================
// ===== Helper utilities
// ===============================================================================================

/// A height field with `2 * n * n` faces.
fn terrain(n: usize) -> IndexedMesh {
    let idx = |i: usize, j: usize| j * (n + 1) + i;
    let mut positions = Vec::new();
    for j in 0..=n {
        for i in 0..=n {
            let (x, y) = (i as Scalar / n as Scalar, j as Scalar / n as Scalar);
            positions.push(Point::new(x, y, 0.1 * (x * 9.0).sin() * (y * 7.0).cos()));
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

fn dcel(mesh: &IndexedMesh) -> Dcel {
    Dcel::from_triangles(&mesh.positions, &mesh.triangles).unwrap()
}


// ===============================================================================================
// ===== Benchmarks
// ===============================================================================================

fn build_dcel(c: &mut Criterion) {
    let mesh = terrain(100);
    c.bench_function("build_dcel_20k", |b| {
        b.iter(|| black_box(dcel(black_box(&mesh))))
    });
}

fn quadric_simplify(c: &mut Criterion) {
    let mesh = terrain(60);
    c.bench_function("quadric_simplify_7200_to_720", |b| {
        b.iter_batched(
            || ProgressiveMesh::new(dcel(&mesh), QuadricMetric::default()).unwrap(),
            |mut pm| {
                pm.simplify_to(720).unwrap();
                pm
            },
            BatchSize::LargeInput,
        )
    });
}

fn apss_simplify(c: &mut Criterion) {
    let mesh = terrain(20);
    c.bench_function("apss_simplify_800_to_200", |b| {
        b.iter_batched(
            || ProgressiveMesh::new(dcel(&mesh), ApssMetric::default()).unwrap(),
            |mut pm| {
                pm.simplify_to(200).unwrap();
                pm
            },
            BatchSize::LargeInput,
        )
    });
}

fn refine_full(c: &mut Criterion) {
    let mesh = terrain(60);
    c.bench_function("quadric_refine_720_to_7200", |b| {
        b.iter_batched(
            || {
                let mut pm = ProgressiveMesh::new(dcel(&mesh), QuadricMetric::default()).unwrap();
                pm.simplify_to(720).unwrap();
                pm
            },
            |mut pm| {
                pm.set_lod(mesh.num_faces()).unwrap();
                pm
            },
            BatchSize::LargeInput,
        )
    });
}

fn kdtree_nearest(c: &mut Criterion) {
    let points = terrain(100).positions;
    let mut tree = PointKdTree::new();
    tree.build(points);

    c.bench_function("kdtree_nearest_1000", |b| {
        b.iter(|| {
            for i in 0..1000 {
                let t = i as Scalar / 1000.0;
                black_box(tree.nearest(Point::new(t, 1.0 - t, 0.05)));
            }
        })
    });
}


criterion_group!(benches,
    build_dcel,
    quadric_simplify,
    apss_simplify,
    refine_full,
    kdtree_nearest,
);
criterion_main!(benches);
