//! The progressive mesh: greedy edge collapses with an undo history.
//!
//! [`ProgressiveMesh`] owns a [`Dcel`] and repeatedly collapses the edge with
//! the smallest error according to its [`ErrorMetric`]. Every collapse is
//! recorded, so the mesh can be refined again by replaying vertex splits in
//! reverse. Moving between levels of detail never recomputes anything from
//! scratch: positions, handles and primitives are restored exactly.
//!
//! ```
//! use lodmesh::{Dcel, ProgressiveMesh, QuadricMetric, math::Point};
//!
//! // An octahedron.
//! let positions = vec![
//!     Point::new(1.0, 0.0, 0.0), Point::new(-1.0, 0.0, 0.0),
//!     Point::new(0.0, 1.0, 0.0), Point::new(0.0, -1.0, 0.0),
//!     Point::new(0.0, 0.0, 1.0), Point::new(0.0, 0.0, -1.0),
//! ];
//! let triangles = vec![
//!     [0, 2, 4], [2, 1, 4], [1, 3, 4], [3, 0, 4],
//!     [2, 0, 5], [1, 2, 5], [3, 1, 5], [0, 3, 5],
//! ];
//! let dcel = Dcel::from_triangles(&positions, &triangles)?;
//!
//! let mut pm = ProgressiveMesh::new(dcel, QuadricMetric::default())?;
//! pm.simplify_to(6)?;
//! assert_eq!(pm.dcel().num_faces(), 6);
//!
//! pm.set_lod(8)?;
//! assert_eq!(pm.current_mesh().triangles.len(), 8);
//! # Ok::<(), lodmesh::Error>(())
//! ```

use std::{fmt, mem, time::Instant};

use fxhash::FxHashSet;
use tracing::{debug, trace};

use crate::{
    dcel::{Dcel, FaceIndex, IndexedMesh, RayHit, VertexIndex, VertexSplit},
    error::{Error, Result},
    handle::{hsize, EdgeHandle, FaceHandle, VertexHandle},
    map::DenseMap,
    math::{Point, Ray, Scalar},
    metric::{CollapseCost, ErrorMetric, Placement, QuadricMetric},
    queue::{Entry, PriorityQueue},
};


/// Limits for one simplification batch, checked between collapses.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Budget {
    /// Maximum number of collapses in this batch.
    pub max_collapses: Option<usize>,

    /// The batch stops once this point in time has passed.
    pub deadline: Option<Instant>,
}

impl Budget {
    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn collapses(max: usize) -> Self {
        Self {
            max_collapses: Some(max),
            deadline: None,
        }
    }

    pub fn until(deadline: Instant) -> Self {
        Self {
            max_collapses: None,
            deadline: Some(deadline),
        }
    }

    fn exhausted(&self, done: usize) -> bool {
        self.max_collapses.map_or(false, |max| done >= max)
            || self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }
}

/// The level of detail a [`ProgressiveMesh`] is currently at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LodState {
    /// No collapse is applied.
    FullResolution,

    /// Some collapses are applied, but the last requested target was not
    /// reached (budget exhausted or no valid collapse left) or no target was
    /// requested.
    Simplified { collapses: usize },

    /// The last requested target was reached.
    TargetReached { collapses: usize },
}

/// Information about one applied collapse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollapseInfo {
    pub edge: EdgeHandle,
    pub kept: VertexHandle,
    pub removed: VertexHandle,
    pub error: Scalar,
    pub position: Point,
    pub placement: Placement,

    /// Number of faces after the collapse.
    pub faces_left: hsize,
}

/// Everything needed to undo one collapse, including the primitives.
#[derive(Debug, Clone)]
struct HistoryEntry<P> {
    split: VertexSplit,
    position: Point,
    merged_primitive: P,
    kept_primitive: P,
    removed_primitive: P,
    changed_face_primitives: Vec<(FaceHandle, P)>,
}


/// The new rating of an edge; `None` removes it from the queue.
type Rating<P> = (EdgeHandle, Option<CollapseCost<P>>);


/// A mesh that can be simplified and refined incrementally.
///
/// The metric is a type parameter so that primitives are stored unboxed and
/// all metric calls are statically dispatched.
pub struct ProgressiveMesh<M: ErrorMetric = QuadricMetric> {
    dcel: Dcel,
    metric: M,
    primitives: DenseMap<VertexHandle, M::Primitive>,
    face_primitives: DenseMap<FaceHandle, M::Primitive>,
    queue: PriorityQueue<M::Primitive>,
    history: Vec<HistoryEntry<M::Primitive>>,
    max_faces: hsize,
    target_reached: bool,

    // Both are `None` when stale.
    face_index: Option<FaceIndex>,
    vertex_index: Option<VertexIndex>,
}

impl<M: ErrorMetric> ProgressiveMesh<M> {
    /// Computes all primitives and rates all edges of `dcel`.
    ///
    /// Edges on the boundary and edges the metric cannot rate are not
    /// queued. Errors of the metric that are not recoverable are returned.
    pub fn new(dcel: Dcel, metric: M) -> Result<Self> {
        let primitives = dcel.vertices()
            .map(|v| metric.vertex_primitive(&dcel, v).map(|p| (v, p)))
            .collect::<Result<DenseMap<_, _>>>()?;
        let face_primitives = dcel.faces()
            .map(|f| metric.face_primitive(&dcel, f).map(|p| (f, p)))
            .collect::<Result<DenseMap<_, _>>>()?;

        let max_faces = dcel.num_faces();
        let mut out = Self {
            dcel,
            metric,
            primitives,
            face_primitives,
            queue: PriorityQueue::new(),
            history: Vec::new(),
            max_faces,
            target_reached: false,
            face_index: None,
            vertex_index: None,
        };

        let ratings = out.dcel.edges()
            .map(|e| out.rate_edge(e).map(|cost| (e, cost)))
            .collect::<Result<Vec<_>>>()?;
        out.apply_ratings(ratings);

        debug!(
            vertices = out.dcel.num_vertices(),
            faces = max_faces,
            queued = out.queue.num_live(),
            "initialized progressive mesh",
        );
        Ok(out)
    }

    /// Rates `edge`. `None` means the edge is not queued: it lies on the
    /// boundary or the metric cannot rate it.
    fn rate_edge(&self, edge: EdgeHandle) -> Result<Option<CollapseCost<M::Primitive>>> {
        if self.dcel.is_boundary_edge(edge) {
            return Ok(None);
        }

        match self.metric.compute_error(&self.dcel, edge, &self.primitives) {
            Ok(cost) => Ok(Some(cost)),
            Err(Error::InsufficientNeighbors(_)) | Err(Error::DegenerateCollapse(_)) => {
                trace!(?edge, "edge cannot be rated, not queued");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Rates all edges whose cost or validity may depend on the
    /// neighborhood of the given vertices: the edges incident to any vertex
    /// within `1 + AFFECTED_RING` rings. Nothing is changed, so a failure can
    /// be rolled back.
    fn rate_around(&self, vertices: &[VertexHandle]) -> Result<Vec<Rating<M::Primitive>>> {
        let mut nearby = FxHashSet::default();
        let mut ring = FxHashSet::default();
        for &v in vertices {
            self.dcel.vv(v).n_ring(1 + M::AFFECTED_RING, &mut ring);
            nearby.extend(ring.iter().copied());
        }

        let mut edges: Vec<_> = nearby.iter()
            .flat_map(|&v| self.dcel.outgoing_half_edges(v))
            .map(|he| self.dcel.edge_of(he))
            .collect();
        edges.sort();
        edges.dedup();

        edges.into_iter()
            .map(|e| self.rate_edge(e).map(|cost| (e, cost)))
            .collect()
    }

    fn apply_ratings(&mut self, ratings: Vec<Rating<M::Primitive>>) {
        for (edge, cost) in ratings {
            match cost {
                Some(cost) => self.queue.update_or_insert(edge, cost),
                None => {
                    self.queue.invalidate(edge);
                }
            }
        }
    }

    /// Computes fresh face primitives for all faces whose primitive depends
    /// on the faces around `v`.
    fn fresh_face_primitives(&self, v: VertexHandle) -> Result<Vec<(FaceHandle, M::Primitive)>> {
        let mut affected = FxHashSet::default();
        let mut ring = FxHashSet::default();
        for f in self.dcel.vf(v).list() {
            self.dcel.ff(f).n_ring(self.metric.face_ring(), &mut ring);
            affected.extend(ring.iter().copied());
        }

        let mut affected: Vec<_> = affected.into_iter().collect();
        affected.sort();
        affected.into_iter()
            .map(|f| self.metric.face_primitive(&self.dcel, f).map(|p| (f, p)))
            .collect()
    }

    fn take_primitive(&mut self, v: VertexHandle) -> M::Primitive {
        self.primitives.remove(v)
            .unwrap_or_else(|| panic!("bug: no primitive stored for {:?}", v))
    }

    /// Collapses the edge with the smallest error.
    ///
    /// Edges whose collapse turns out to be invalid are skipped (and stay out
    /// of the queue until their neighborhood changes). Returns
    /// `Error::QueueExhausted` if no valid collapse is left. On any error,
    /// the mesh is unchanged.
    pub fn collapse_one(&mut self) -> Result<CollapseInfo> {
        loop {
            let dcel = &self.dcel;
            let entry = self.queue.pop_min(|e| dcel.contains_edge(e))
                .ok_or(Error::QueueExhausted)?;

            match self.dcel.collapse_edge_to(entry.edge, entry.position) {
                Ok(split) => return self.finish_collapse(entry, split),
                Err(Error::DegenerateCollapse(_)) | Err(Error::Topology(_)) => {
                    trace!(edge = ?entry.edge, "collapse rejected, dropping edge");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn finish_collapse(
        &mut self,
        entry: Entry<M::Primitive>,
        split: VertexSplit,
    ) -> Result<CollapseInfo> {
        let a = split.kept_vertex();
        let b = split.removed_vertex();

        let kept_primitive = mem::replace(&mut self.primitives[a], entry.primitive.clone());
        let removed_primitive = self.take_primitive(b);

        let refreshed = self.fresh_face_primitives(a)
            .and_then(|fresh| self.rate_around(&[a]).map(|ratings| (fresh, ratings)));
        let (fresh, ratings) = match refreshed {
            Ok(refreshed) => refreshed,
            Err(e) => {
                // Roll back, so that the mesh stays in its last valid state.
                self.dcel.apply_split(&split)?;
                self.primitives[a] = kept_primitive;
                self.primitives.insert(b, removed_primitive);
                self.queue.update_or_insert(entry.edge, entry.into_cost());
                return Err(e);
            }
        };

        // ===================================================================
        // ===== Commit
        // ===================================================================
        let mut changed_face_primitives = Vec::new();
        for &f in &split.removed_faces() {
            if let Some(p) = self.face_primitives.remove(f) {
                changed_face_primitives.push((f, p));
            }
        }
        for (f, p) in fresh {
            if let Some(old) = self.face_primitives.insert(f, p) {
                changed_face_primitives.push((f, old));
            }
        }

        for &e in &split.removed_edges() {
            self.queue.invalidate(e);
        }
        self.apply_ratings(ratings);

        self.history.push(HistoryEntry {
            split,
            position: entry.position,
            merged_primitive: entry.primitive,
            kept_primitive,
            removed_primitive,
            changed_face_primitives,
        });
        self.target_reached = false;
        self.face_index = None;
        self.vertex_index = None;

        let info = CollapseInfo {
            edge: entry.edge,
            kept: a,
            removed: b,
            error: entry.error,
            position: entry.position,
            placement: entry.placement,
            faces_left: self.dcel.num_faces(),
        };
        trace!(
            edge = ?info.edge,
            error = info.error,
            placement = ?info.placement,
            faces_left = info.faces_left,
            "applied collapse",
        );
        Ok(info)
    }

    /// Undoes the most recent collapse and returns the restored vertex.
    ///
    /// Returns `Error::FullResolution` if there is nothing to undo. On any
    /// error, the mesh is unchanged.
    pub fn split_one(&mut self) -> Result<VertexHandle> {
        let entry = self.history.pop().ok_or(Error::FullResolution)?;
        if let Err(e) = self.dcel.apply_split(&entry.split) {
            self.history.push(entry);
            return Err(e);
        }

        let a = entry.split.kept_vertex();
        let b = entry.split.removed_vertex();
        self.primitives[a] = entry.kept_primitive.clone();
        self.primitives.insert(b, entry.removed_primitive.clone());

        let ratings = match self.rate_around(&[a, b]) {
            Ok(ratings) => ratings,
            Err(e) => {
                // Collapsing again restores exactly the state before the split.
                self.primitives.remove(b);
                self.primitives[a] = entry.merged_primitive.clone();
                self.dcel.collapse_edge_to(entry.split.edge(), entry.position)?;
                self.history.push(entry);
                return Err(e);
            }
        };

        let HistoryEntry { split, changed_face_primitives, .. } = entry;
        for (f, p) in changed_face_primitives {
            self.face_primitives.insert(f, p);
        }
        self.apply_ratings(ratings);

        self.target_reached = false;
        self.face_index = None;
        self.vertex_index = None;

        trace!(edge = ?split.edge(), restored = ?b, "applied split");
        Ok(b)
    }

    /// Collapses edges until the mesh has at most `target_faces` faces or no
    /// valid collapse is left.
    pub fn simplify_to(&mut self, target_faces: usize) -> Result<LodState> {
        self.simplify_with(target_faces, Budget::unlimited())
    }

    /// Like [`ProgressiveMesh::simplify_to`], but stops early when the budget
    /// is used up.
    pub fn simplify_with(&mut self, target_faces: usize, budget: Budget) -> Result<LodState> {
        let mut done = 0;
        while self.num_faces() > target_faces && !budget.exhausted(done) {
            match self.collapse_one() {
                Ok(_) => done += 1,
                Err(Error::QueueExhausted) => {
                    debug!(faces = self.num_faces(), "no valid collapse left");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        self.target_reached = self.num_faces() <= target_faces;
        debug!(
            collapses = done,
            faces = self.num_faces(),
            target = target_faces,
            reached = self.target_reached,
            "simplification batch done",
        );
        Ok(self.state())
    }

    /// Splits vertices until the mesh has at least `target_faces` faces or is
    /// at full resolution.
    pub fn refine_to(&mut self, target_faces: usize) -> Result<LodState> {
        let mut done = 0;
        while self.num_faces() < target_faces && !self.history.is_empty() {
            self.split_one()?;
            done += 1;
        }

        self.target_reached = self.num_faces() >= target_faces;
        debug!(splits = done, faces = self.num_faces(), target = target_faces, "refinement done");
        Ok(self.state())
    }

    /// Moves to the level of detail closest to `target_faces`, in either
    /// direction.
    pub fn set_lod(&mut self, target_faces: usize) -> Result<LodState> {
        if target_faces < self.num_faces() {
            self.simplify_to(target_faces)
        } else {
            self.refine_to(target_faces)
        }
    }

    pub fn state(&self) -> LodState {
        let collapses = self.history.len();
        if collapses == 0 {
            LodState::FullResolution
        } else if self.target_reached {
            LodState::TargetReached { collapses }
        } else {
            LodState::Simplified { collapses }
        }
    }

    /// Number of currently applied collapses.
    pub fn num_collapses(&self) -> usize {
        self.history.len()
    }

    /// Number of faces at full resolution.
    pub fn max_faces(&self) -> hsize {
        self.max_faces
    }

    fn num_faces(&self) -> usize {
        self.dcel.num_faces() as usize
    }

    /// Error of the collapse `collapse_one` would try next.
    pub fn next_error(&mut self) -> Option<Scalar> {
        let dcel = &self.dcel;
        self.queue.peek_error(|e| dcel.contains_edge(e))
    }

    /// Exports the current level of detail.
    pub fn current_mesh(&self) -> IndexedMesh {
        self.dcel.to_indexed()
    }

    pub fn dcel(&self) -> &Dcel {
        &self.dcel
    }

    pub fn metric(&self) -> &M {
        &self.metric
    }

    /// Releases the mesh at its current level of detail.
    pub fn into_dcel(self) -> Dcel {
        self.dcel
    }

    pub fn primitive(&self, v: VertexHandle) -> Option<&M::Primitive> {
        self.primitives.get(v)
    }

    pub fn face_primitive(&self, f: FaceHandle) -> Option<&M::Primitive> {
        self.face_primitives.get(f)
    }

    /// Rebuilds the face index over the current level of detail. The index
    /// goes stale with the next collapse or split.
    pub fn rebuild_index(&mut self) {
        self.face_index = Some(self.dcel.face_index());
    }

    pub fn is_index_fresh(&self) -> bool {
        self.face_index.is_some()
    }

    /// Casts a ray onto the current level of detail, using the face index if
    /// it is fresh.
    pub fn cast_ray(&self, ray: &Ray) -> Option<RayHit> {
        match &self.face_index {
            Some(index) => self.dcel.cast_ray_indexed(ray, index),
            None => self.dcel.cast_ray(ray),
        }
    }

    /// The vertex closest to `p`. The vertex index is rebuilt if stale.
    pub fn nearest_vertex(&mut self, p: Point) -> Option<VertexHandle> {
        let dcel = &self.dcel;
        self.vertex_index
            .get_or_insert_with(|| dcel.vertex_index())
            .nearest(p)
    }
}

impl<M: ErrorMetric + fmt::Debug> fmt::Debug for ProgressiveMesh<M> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ProgressiveMesh")
            .field("metric", &self.metric)
            .field("vertices", &self.dcel.num_vertices())
            .field("faces", &self.dcel.num_faces())
            .field("max_faces", &self.max_faces)
            .field("state", &self.state())
            .field("queued", &self.queue.num_live())
            .finish()
    }
}
