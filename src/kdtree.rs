//! A static k-d tree over points or triangles.
//!
//! The tree is built once from a list of primitives and answers nearest
//! neighbor, radius and ray queries. It is never updated incrementally: after
//! the data changes, build it again.

use std::cmp::Ordering;

use cgmath::prelude::*;

use crate::math::{self, Aabb, Point, Ray, Scalar};


/// Default maximum number of primitives in a leaf.
pub const DEFAULT_PRIMS_PER_LEAF: usize = 3;

/// Something that can be stored in a [`KdTree`].
pub trait KdPrimitive {
    fn aabb(&self) -> Aabb;

    /// Point used to sort primitives into the two halves of a node.
    fn centroid(&self) -> Point;

    /// The point of the primitive closest to `p`.
    fn closest_point(&self, p: Point) -> Point;

    /// Ray parameter of the first intersection, if any. Primitives without
    /// area are never hit.
    fn intersect_ray(&self, _ray: &Ray) -> Option<Scalar> {
        None
    }
}

impl KdPrimitive for Point {
    fn aabb(&self) -> Aabb {
        Aabb { min: *self, max: *self }
    }

    fn centroid(&self) -> Point {
        *self
    }

    fn closest_point(&self, _: Point) -> Point {
        *self
    }
}

/// A triangle given by its three corners.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle(pub [Point; 3]);

impl KdPrimitive for Triangle {
    fn aabb(&self) -> Aabb {
        Aabb::around(self.0.iter().cloned())
    }

    fn centroid(&self) -> Point {
        let [a, b, c] = self.0;
        math::triangle_centroid(a, b, c)
    }

    fn closest_point(&self, p: Point) -> Point {
        let [a, b, c] = self.0;
        math::closest_point_on_triangle(p, a, b, c)
    }

    fn intersect_ray(&self, ray: &Ray) -> Option<Scalar> {
        let [a, b, c] = self.0;
        math::ray_triangle(ray, a, b, c)
    }
}

pub type PointKdTree = KdTree<Point>;
pub type TriangleKdTree = KdTree<Triangle>;

/// Result of [`KdTree::nearest`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    /// Index of the primitive in the list passed to `build`.
    pub index: usize,

    /// Closest point on that primitive.
    pub point: Point,

    pub distance2: Scalar,
}

/// Result of [`KdTree::cast_ray`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KdRayHit {
    /// Index of the primitive in the list passed to `build`.
    pub index: usize,
    pub t: Scalar,
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Aabb,
    kind: NodeKind,
}

#[derive(Debug, Clone)]
enum NodeKind {
    /// Range in `KdTree::order`.
    Leaf { start: usize, end: usize },
    Inner { axis: usize, left: usize, right: usize },
}

/// A k-d tree over primitives of type `T`.
///
/// Nodes are stored in one arena vector, the root being the first one. Each
/// inner node splits its primitives at the median along the longest axis of
/// their centroids' bounding box.
#[derive(Debug, Clone)]
pub struct KdTree<T> {
    prims: Vec<T>,
    /// Primitive indices, ordered such that each leaf owns a contiguous range.
    order: Vec<usize>,
    nodes: Vec<Node>,
    prims_per_leaf: usize,
}

impl<T: KdPrimitive> KdTree<T> {
    /// Creates an empty tree with the default leaf size.
    pub fn new() -> Self {
        Self::with_leaf_size(DEFAULT_PRIMS_PER_LEAF)
    }

    /// Creates an empty tree whose leaves hold at most `prims_per_leaf`
    /// primitives (at least 1).
    pub fn with_leaf_size(prims_per_leaf: usize) -> Self {
        Self {
            prims: Vec::new(),
            order: Vec::new(),
            nodes: Vec::new(),
            prims_per_leaf: prims_per_leaf.max(1),
        }
    }

    /// (Re)builds the tree from the given primitives. Returns `false` (and
    /// leaves the tree empty) if `prims` is empty.
    pub fn build(&mut self, prims: Vec<T>) -> bool {
        self.nodes.clear();
        self.order = (0..prims.len()).collect();
        self.prims = prims;
        if self.prims.is_empty() {
            return false;
        }

        let centroids: Vec<_> = self.prims.iter().map(|p| p.centroid()).collect();
        self.build_node(&centroids, 0, self.prims.len());
        true
    }

    fn build_node(&mut self, centroids: &[Point], start: usize, end: usize) -> usize {
        let mut bounds = Aabb::new();
        for &i in &self.order[start..end] {
            bounds.add_box(&self.prims[i].aabb());
        }

        let idx = self.nodes.len();
        self.nodes.push(Node { bounds, kind: NodeKind::Leaf { start, end } });
        if end - start <= self.prims_per_leaf {
            return idx;
        }

        let axis = Aabb::around(self.order[start..end].iter().map(|&i| centroids[i]))
            .longest_axis();
        let mid = start + (end - start) / 2;
        self.order[start..end].select_nth_unstable_by(mid - start, |&a, &b| {
            centroids[a][axis].partial_cmp(&centroids[b][axis]).unwrap_or(Ordering::Equal)
        });

        let left = self.build_node(centroids, start, mid);
        let right = self.build_node(centroids, mid, end);
        self.nodes[idx].kind = NodeKind::Inner { axis, left, right };
        idx
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of primitives in the tree.
    pub fn len(&self) -> usize {
        if self.is_empty() { 0 } else { self.prims.len() }
    }

    /// The primitives in the order they were passed to `build`.
    pub fn primitives(&self) -> &[T] {
        &self.prims
    }

    /// Depth of the tree (0 if empty, 1 if the root is a leaf).
    pub fn depth(&self) -> usize {
        fn depth_of<T>(tree: &KdTree<T>, node: usize) -> usize {
            match tree.nodes[node].kind {
                NodeKind::Leaf { .. } => 1,
                NodeKind::Inner { left, right, .. } => {
                    1 + depth_of(tree, left).max(depth_of(tree, right))
                }
            }
        }

        if self.nodes.is_empty() { 0 } else { depth_of(self, 0) }
    }

    /// Finds the primitive closest to `p`. Returns `None` if the tree is
    /// empty.
    pub fn nearest(&self, p: Point) -> Option<Nearest> {
        if self.is_empty() {
            return None;
        }

        let mut best = None;
        self.nearest_in(0, p, &mut best);
        best
    }

    fn nearest_in(&self, node: usize, p: Point, best: &mut Option<Nearest>) {
        let best_d2 = best.map_or(Scalar::INFINITY, |b| b.distance2);
        if self.nodes[node].bounds.distance2(p) > best_d2 {
            return;
        }

        match self.nodes[node].kind {
            NodeKind::Leaf { start, end } => {
                for &index in &self.order[start..end] {
                    let point = self.prims[index].closest_point(p);
                    let distance2 = point.distance2(p);
                    if best.map_or(true, |b| distance2 < b.distance2) {
                        *best = Some(Nearest { index, point, distance2 });
                    }
                }
            }
            NodeKind::Inner { left, right, .. } => {
                // Visit the closer child first to prune more of the other.
                let dl = self.nodes[left].bounds.distance2(p);
                let dr = self.nodes[right].bounds.distance2(p);
                let (first, second) = if dl <= dr { (left, right) } else { (right, left) };
                self.nearest_in(first, p, best);
                self.nearest_in(second, p, best);
            }
        }
    }

    /// Returns the indices (ascending) of all primitives with distance at
    /// most `radius` to `p`.
    pub fn within_radius(&self, p: Point, radius: Scalar) -> Vec<usize> {
        let mut out = Vec::new();
        if self.is_empty() {
            return out;
        }

        let r2 = radius * radius;
        let mut stack = vec![0];
        while let Some(node) = stack.pop() {
            if self.nodes[node].bounds.distance2(p) > r2 {
                continue;
            }

            match self.nodes[node].kind {
                NodeKind::Leaf { start, end } => {
                    out.extend(self.order[start..end].iter().cloned().filter(|&i| {
                        self.prims[i].closest_point(p).distance2(p) <= r2
                    }));
                }
                NodeKind::Inner { left, right, .. } => {
                    stack.push(left);
                    stack.push(right);
                }
            }
        }

        out.sort_unstable();
        out
    }

    /// Returns the primitive with the smallest ray parameter `t >= 0` hit by
    /// the ray.
    pub fn cast_ray(&self, ray: &Ray) -> Option<KdRayHit> {
        if self.is_empty() {
            return None;
        }

        let mut best: Option<KdRayHit> = None;
        let mut stack = vec![0];
        while let Some(node) = stack.pop() {
            let t_enter = match self.nodes[node].bounds.intersect_ray(ray) {
                Some((t_enter, _)) => t_enter,
                None => continue,
            };
            if best.map_or(false, |b| t_enter > b.t) {
                continue;
            }

            match self.nodes[node].kind {
                NodeKind::Leaf { start, end } => {
                    for &index in &self.order[start..end] {
                        if let Some(t) = self.prims[index].intersect_ray(ray) {
                            if best.map_or(true, |b| t < b.t) {
                                best = Some(KdRayHit { index, t });
                            }
                        }
                    }
                }
                NodeKind::Inner { axis, left, right } => {
                    // Push the far child first so that the near one is
                    // visited first.
                    if ray.dir[axis] >= 0.0 {
                        stack.push(right);
                        stack.push(left);
                    } else {
                        stack.push(left);
                        stack.push(right);
                    }
                }
            }
        }

        best
    }
}

impl<T: KdPrimitive> Default for KdTree<T> {
    fn default() -> Self {
        Self::new()
    }
}
