//! Error metrics that rate edge collapses.
//!
//! An [`ErrorMetric`] attaches a *primitive* (a local surface approximation)
//! to every vertex and face. To rate the collapse of an edge, the primitives
//! of its endpoints are combined and the metric decides where the merged
//! vertex should go and how much error that introduces.
//!
//! Two strategies exist:
//! - [`QuadricMetric`]: Garland-Heckbert style error quadrics.
//! - [`ApssMetric`]: algebraic point set surfaces (fitted algebraic spheres),
//!   optionally with the robust RIMLS fit.

use std::fmt;

use crate::{
    dcel::Dcel,
    error::Result,
    handle::{EdgeHandle, FaceHandle, VertexHandle},
    map::DenseMap,
    math::{Point, Scalar},
};


pub mod apss;
pub mod quadric;

pub use self::{
    apss::{AlgebraicSphere, ApssMetric, ApssParams, EdgeSearch},
    quadric::{Quadric, QuadricMetric, QuadricWeighting},
};


/// How the position of a collapse was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// The position minimizes the metric's error.
    Optimal,

    /// The optimization problem was (near) singular and the position was
    /// chosen from a few candidates instead.
    Fallback,
}

/// The rating of one edge collapse.
#[derive(Debug, Clone, PartialEq)]
pub struct CollapseCost<P> {
    /// The error introduced by the collapse (never negative).
    pub error: Scalar,

    /// Where the merged vertex is placed.
    pub position: Point,

    /// The primitive of the merged vertex.
    pub primitive: P,

    pub placement: Placement,
}

/// A strategy to rate edge collapses.
///
/// Implementations are plain parameter structs: all mesh state is passed in.
pub trait ErrorMetric {
    /// The local surface approximation stored per vertex and per face.
    type Primitive: Clone + fmt::Debug;

    /// Number of vertex rings around a merged vertex (in addition to its
    /// direct neighbors) in which edge costs depend on the merged vertex.
    ///
    /// After a collapse or split, all edges incident to a vertex within
    /// `1 + AFFECTED_RING` rings around the changed vertices are re-rated.
    const AFFECTED_RING: usize;

    /// Computes the primitive of a vertex from the current mesh.
    fn vertex_primitive(&self, dcel: &Dcel, v: VertexHandle) -> Result<Self::Primitive>;

    /// Computes the primitive of a face from the current mesh.
    fn face_primitive(&self, dcel: &Dcel, f: FaceHandle) -> Result<Self::Primitive>;

    /// Number of face rings a face primitive depends on (0 if it only
    /// depends on the face itself).
    fn face_ring(&self) -> usize {
        0
    }

    /// Weighted combination of primitives. Commutative and associative.
    fn combine(&self, prims: &[(&Self::Primitive, Scalar)]) -> Self::Primitive;

    /// Rates the collapse of `edge`, given the primitives of all vertices.
    fn compute_error(
        &self,
        dcel: &Dcel,
        edge: EdgeHandle,
        primitives: &DenseMap<VertexHandle, Self::Primitive>,
    ) -> Result<CollapseCost<Self::Primitive>>;
}
