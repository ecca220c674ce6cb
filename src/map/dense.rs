use std::{
    fmt,
    iter::{FromIterator, FusedIterator},
    marker::PhantomData,
    ops::{Index, IndexMut},
};

use stable_vec::{
    StableVec,
    core::DefaultCore,
    iter::{Indices, Iter as SvIter, IterMut as SvIterMut, Values as SvValues},
};

use crate::handle::{hsize, Handle};
use super::Empty;


/// A map from handles to elements that uses a contiguous vector (with holes)
/// as storage.
///
/// The handle is simply used as index into the underlying `StableVec`. This
/// has a few important consequences:
///
/// - **Good**: access is just an array lookup; inserting at the end and
///   removing anywhere is O(1). Removing an element never invalidates other
///   handles.
/// - **Bad**: memory usage grows with the highest handle index and not with
///   the number of elements.
///
/// `push` always appends after the last slot ever used, so handles of removed
/// elements are *not* reused (unless you explicitly `insert` at them again).
/// The map is *compact* if there are no holes, i.e. every index in
/// `0..num_elements` is occupied.
///
/// # Example
///
/// ```
/// use lodmesh::{FaceHandle, handle::Handle, map::DenseMap};
///
/// let mut map = DenseMap::new();
/// let a: FaceHandle = map.push("anna");
/// let b = map.push("bob");
/// assert!(map.is_compact());
///
/// assert_eq!(map.remove(a), Some("anna"));
/// assert_eq!(map.get(b), Some(&"bob"));
/// assert!(!map.is_compact());
///
/// // Inserting into the hole restores the old handle.
/// map.insert(a, "anna");
/// assert_eq!(map[a], "anna");
/// assert!(map.is_compact());
/// ```
#[derive(Clone)]
pub struct DenseMap<H: Handle, T> {
    vec: StableVec<T>,
    _dummy: PhantomData<H>,
}

impl<H: Handle, T> DenseMap<H, T> {
    /// Creates an empty `DenseMap`.
    pub fn new() -> Self {
        Self {
            vec: StableVec::new(),
            _dummy: PhantomData,
        }
    }

    /// Creates an empty `DenseMap` with memory for `cap` elements.
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            vec: StableVec::with_capacity(cap),
            _dummy: PhantomData,
        }
    }

    /// Adds the element at the end and returns its handle.
    pub fn push(&mut self, elem: T) -> H {
        H::from_usize(self.vec.push(elem))
    }

    /// Inserts the element at the given handle, returning the element that
    /// was previously stored there (if any). Grows the map if necessary.
    pub fn insert(&mut self, handle: H, elem: T) -> Option<T> {
        let idx = handle.to_usize();
        self.vec.reserve_for(idx);
        self.vec.insert(idx, elem)
    }

    /// Removes and returns the element with the given handle. Returns `None`
    /// if there is no such element.
    pub fn remove(&mut self, handle: H) -> Option<T> {
        let idx = handle.to_usize();
        if idx >= self.vec.capacity() {
            return None;
        }

        self.vec.remove(idx)
    }

    pub fn get(&self, handle: H) -> Option<&T> {
        let idx = handle.to_usize();
        if idx >= self.vec.capacity() {
            return None;
        }

        self.vec.get(idx)
    }

    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        let idx = handle.to_usize();
        if idx >= self.vec.capacity() {
            return None;
        }

        self.vec.get_mut(idx)
    }

    pub fn contains_handle(&self, handle: H) -> bool {
        let idx = handle.to_usize();
        idx < self.vec.capacity() && self.vec.has_element_at(idx)
    }

    pub fn num_elements(&self) -> hsize {
        self.vec.num_elements() as hsize
    }

    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }

    /// Returns `true` if there are no holes: all indices in
    /// `0..num_elements` are occupied.
    pub fn is_compact(&self) -> bool {
        self.vec.is_compact()
    }

    /// The handle the next `push` will return.
    pub fn next_push_handle(&self) -> H {
        H::from_usize(self.vec.next_push_index())
    }

    pub fn last_handle(&self) -> Option<H> {
        self.vec.find_last_index().map(H::from_usize)
    }

    pub fn clear(&mut self) {
        self.vec.clear();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.vec.reserve(additional);
    }

    pub fn iter(&self) -> Iter<'_, H, T> {
        Iter::new(self)
    }
    pub fn handles(&self) -> Handles<'_, H, T> {
        Handles::new(self)
    }
    pub fn values(&self) -> Values<'_, H, T> {
        Values::new(self)
    }
    pub fn iter_mut(&mut self) -> IterMut<'_, H, T> {
        IterMut::new(self)
    }
}

impl<H: Handle, T> Default for DenseMap<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: Handle, T> Empty for DenseMap<H, T> {
    fn empty() -> Self {
        Self::new()
    }
}

impl<H: Handle, T> Index<H> for DenseMap<H, T> {
    type Output = T;
    fn index(&self, handle: H) -> &Self::Output {
        match self.get(handle) {
            None => panic!("no element found for handle '{:?}'", handle),
            Some(r) => r,
        }
    }
}

impl<H: Handle, T> IndexMut<H> for DenseMap<H, T> {
    fn index_mut(&mut self, handle: H) -> &mut Self::Output {
        match self.get_mut(handle) {
            None => panic!("no element found for handle '{:?}'", handle),
            Some(r) => r,
        }
    }
}

impl<H: Handle, T: fmt::Debug> fmt::Debug for DenseMap<H, T> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

impl<H: Handle, T> Extend<(H, T)> for DenseMap<H, T> {
    fn extend<I: IntoIterator<Item = (H, T)>>(&mut self, iter: I) {
        // Same strategy as the std `HashMap`: keys may already be present, so
        // we don't necessarily want to reserve too much.
        let iter = iter.into_iter();
        let cap = if self.is_empty() {
            iter.size_hint().0
        } else {
            (iter.size_hint().0 + 1) / 2
        };
        self.reserve(cap);

        for (handle, value) in iter {
            self.insert(handle, value);
        }
    }
}

impl<H: Handle, T> FromIterator<(H, T)> for DenseMap<H, T> {
    fn from_iter<I: IntoIterator<Item = (H, T)>>(iter: I) -> Self {
        let mut out = Self::empty();
        out.extend(iter);
        out
    }
}


// ===== Iterator wrappers =======================================================================

/// Generates an iterator wrapper around one of the `StableVec` iterators.
macro_rules! gen_iter_wrapper {
    (
        $name:ident, $sv_name:ident, $iter_method:ident, [$($mutable:ident)?], [$($clone:ident)?],
        |$lt:tt, $h:ident, $t:ident| $item:ty,
        [$($mapping:tt)*] $(,)?
    ) => {
        #[derive(Debug, $($clone)?)]
        pub struct $name<$lt, $h: Handle, $t> {
            iter: $sv_name<$lt, $t, DefaultCore<$t>>,
            _dummy: PhantomData<&$lt $h>,
        }

        impl<$lt, $h: Handle, $t> $name<$lt, $h, $t> {
            fn new(map: &$lt $($mutable)? DenseMap<$h, $t>) -> Self {
                Self {
                    iter: map.vec.$iter_method(),
                    _dummy: PhantomData,
                }
            }
        }

        impl<$lt, $h: Handle, $t> Iterator for $name<$lt, $h, $t> {
            type Item = $item;
            fn next(&mut self) -> Option<Self::Item> {
                self.iter.next() $($mapping)*
            }

            fn size_hint(&self) -> (usize, Option<usize>) {
                self.iter.size_hint()
            }
        }

        impl<$lt, $h: Handle, $t> DoubleEndedIterator for $name<$lt, $h, $t> {
            fn next_back(&mut self) -> Option<Self::Item> {
                self.iter.next_back() $($mapping)*
            }
        }

        impl<$lt, $h: Handle, $t> ExactSizeIterator for $name<$lt, $h, $t> {}
        impl<$lt, $h: Handle, $t> FusedIterator for $name<$lt, $h, $t> {}
    };
}

gen_iter_wrapper!(
    Iter, SvIter, iter, [], [Clone],
    |'map, H, T| (H, &'map T),
    [.map(|(i, e)| (H::from_usize(i), e))],
);
gen_iter_wrapper!(
    IterMut, SvIterMut, iter_mut, [mut], [],
    |'map, H, T| (H, &'map mut T),
    [.map(|(i, e)| (H::from_usize(i), e))],
);
gen_iter_wrapper!(Handles, Indices, indices, [], [Clone], |'map, H, T| H, [.map(H::from_usize)]);
gen_iter_wrapper!(Values, SvValues, values, [], [Clone], |'map, H, T| &'map T, []);
