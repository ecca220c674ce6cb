//! Index-stable containers mapping handles to elements.
//!
//! The [`Dcel`][crate::Dcel] stores each of its four element kinds in a
//! [`DenseMap`]. Removing an element leaves a hole, but never changes the
//! handles of other elements. This is what allows the progressive mesh to keep
//! handles in its queue and in its vertex split records across many
//! collapses.



mod dense;

pub use self::dense::{DenseMap, Handles, Iter, IterMut, Values};


/// Types that have an "empty" value, like the empty mesh or an empty map.
pub trait Empty {
    /// Returns an empty value of this type.
    fn empty() -> Self;
}

impl<T> Empty for Vec<T> {
    fn empty() -> Self {
        Vec::new()
    }
}
