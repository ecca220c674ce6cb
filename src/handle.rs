//! Handles to refer to mesh elements.
//!
//! All elements of a [`Dcel`][crate::Dcel] are referred to by a handle: a
//! typed wrapper around an integer index into one of the index maps. Handles
//! are `Copy`, cheap to compare and hash and are never reused by a mesh after
//! their element was removed. Handles of different element kinds cannot be
//! mixed up, as each kind has its own type.

use std::{fmt, hash::Hash};

use static_assertions::const_assert_eq;


/// The integer type used as index inside of handles.
///
/// This is `u32` by default, which is plenty for nearly all meshes. If you
/// need more, enable the `large-handle` feature to make this `u64`.
#[cfg(not(feature = "large-handle"))]
#[allow(non_camel_case_types)]
pub type hsize = u32;

/// The integer type used as index inside of handles.
#[cfg(feature = "large-handle")]
#[allow(non_camel_case_types)]
pub type hsize = u64;


/// Types that can be used as a handle to refer to some element.
pub trait Handle: 'static + Copy + fmt::Debug + Eq + Ord + Hash {
    /// Creates a handle from the given index.
    fn new(idx: hsize) -> Self;

    /// Returns the index of this handle.
    fn idx(&self) -> hsize;

    /// Helper method to create a handle directly from a `usize`.
    ///
    /// Panics if the given value does not fit into `hsize`.
    #[inline(always)]
    fn from_usize(raw: usize) -> Self {
        assert!(
            raw <= hsize::max_value() as usize,
            "handle index {} too large (enable the `large-handle` feature)",
            raw,
        );
        Self::new(raw as hsize)
    }

    /// Helper method to get the index as `usize` directly.
    #[inline(always)]
    fn to_usize(&self) -> usize {
        self.idx() as usize
    }
}

macro_rules! make_handle_type {
    ($(#[$attr:meta])* $name:ident = $short:expr;) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, derive_more::From)]
        pub struct $name(hsize);

        impl Handle for $name {
            #[inline(always)]
            fn new(idx: hsize) -> Self {
                $name(idx)
            }

            #[inline(always)]
            fn idx(&self) -> hsize {
                self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}{}", $short, self.0)
            }
        }

        impl optional::Noned for $name {
            #[inline(always)]
            fn is_none(&self) -> bool {
                self.0 == hsize::max_value()
            }

            #[inline(always)]
            fn get_none() -> Self {
                $name(hsize::max_value())
            }
        }

        impl optional::OptEq for $name {
            fn opt_eq(&self, other: &Self) -> bool {
                self == other
            }
        }

        const_assert_eq!(std::mem::size_of::<$name>(), std::mem::size_of::<hsize>());
    };
}

make_handle_type! {
    /// A handle referring to a vertex.
    VertexHandle = "V";
}
make_handle_type! {
    /// A handle referring to a directed half edge.
    HalfEdgeHandle = "HE";
}
make_handle_type! {
    /// A handle referring to a full (undirected) edge, i.e. a pair of twin
    /// half edges.
    EdgeHandle = "E";
}
make_handle_type! {
    /// A handle referring to a (triangular) face.
    FaceHandle = "F";
}


#[cfg(test)]
mod tests {
    use optional::{Noned, Optioned as Opt};
    use super::*;

    #[test]
    fn debug_output() {
        assert_eq!(format!("{:?}", VertexHandle::new(3)), "V3");
        assert_eq!(format!("{:?}", HalfEdgeHandle::new(7)), "HE7");
        assert_eq!(format!("{:?}", EdgeHandle::new(2)), "E2");
        assert_eq!(format!("{:?}", FaceHandle::from_usize(0)), "F0");
    }

    #[test]
    fn optional_handles() {
        let none: Opt<FaceHandle> = Opt::none();
        assert!(none.is_none());
        assert!(FaceHandle::get_none().is_none());

        let some = Opt::some(FaceHandle::new(5));
        assert_eq!(some.into_option(), Some(FaceHandle::new(5)));
        assert_eq!(std::mem::size_of_val(&some), std::mem::size_of::<hsize>());
    }

    #[test]
    fn usize_roundtrip() {
        let h = EdgeHandle::from_usize(42);
        assert_eq!(h.to_usize(), 42);
        assert_eq!(h, EdgeHandle::from(42 as hsize));
    }
}
