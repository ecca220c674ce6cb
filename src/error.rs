use failure::Fail;

use crate::handle::EdgeHandle;


/// All errors that can be returned by operations of this crate.
///
/// Some of these are recoverable inside a simplification run (the engine
/// simply skips the edge), while others are returned to the caller. In all
/// cases, the mesh is left in the last valid state: operations validate
/// everything before mutating anything.
#[derive(Debug, Clone, PartialEq, Fail)]
pub enum Error {
    /// The mesh connectivity does not allow the requested operation (e.g. a
    /// non-manifold input or collapsing a boundary edge).
    #[fail(display = "invalid mesh topology: {}", _0)]
    Topology(String),

    /// Collapsing the edge would produce a degenerate or folded mesh.
    #[fail(display = "collapsing {:?} would create a degenerate mesh", _0)]
    DegenerateCollapse(EdgeHandle),

    /// Not enough neighbors to fit a surface primitive.
    #[fail(display = "only {} neighbors with non-zero weight (at least 3 required)", _0)]
    InsufficientNeighbors(usize),

    /// A numerical fit produced NaN or infinite coefficients.
    #[fail(display = "surface fit produced non-finite coefficients")]
    NonFiniteFit,

    /// There is no edge left that can be collapsed.
    #[fail(display = "no valid edge collapse left")]
    QueueExhausted,

    /// There is no collapse left that could be undone.
    #[fail(display = "mesh is already at full resolution")]
    FullResolution,

    /// The input data is malformed (e.g. a vertex index out of range).
    #[fail(display = "invalid input: {}", _0)]
    InvalidInput(String),
}

/// `Result` with this crate's [`Error`] as error type.
pub type Result<T> = std::result::Result<T, Error>;
