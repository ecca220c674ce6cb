//! Half-edge triangle meshes and progressive mesh simplification.
//!
//! The [`Dcel`] is an index-based half-edge structure supporting edge
//! collapses and their exact inverse, vertex splits. On top of it,
//! [`ProgressiveMesh`] greedily collapses the cheapest edge according to an
//! [`ErrorMetric`] ([`QuadricMetric`] or [`ApssMetric`]) and can move between
//! levels of detail in both directions. A k-d tree ([`kdtree`]) accelerates
//! ray casts and nearest-neighbor queries.


#[cfg(test)]
#[macro_use]
mod test_utils;

pub mod dcel;
mod error;
pub mod handle;
pub mod kdtree;
pub mod map;
pub mod math;
pub mod metric;
pub mod pm;
pub mod queue;

pub use self::{
    dcel::{Dcel, IndexedMesh, RayHit, VertexSplit},
    error::{Error, Result},
    handle::{hsize, EdgeHandle, FaceHandle, HalfEdgeHandle, VertexHandle},
    metric::{ApssMetric, ApssParams, ErrorMetric, QuadricMetric},
    pm::{Budget, CollapseInfo, LodState, ProgressiveMesh},
};
