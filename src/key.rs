//! Key trait for storage handles.
//!
//! Containers in this crate never hold references to nodes; they hold
//! integer handles into caller-provided storage. The [`Key`] trait abstracts
//! over the handle type and provides the shared nil sentinel (`NONE`) that
//! link fields are set to when a node is not part of any structure.

/// Trait for handle/index types used in storage.
///
/// Provides a sentinel value (`NONE`) and conversion to/from `usize`.
/// `NONE` doubles as the nil leaf of the tree and the "unlinked" marker of
/// stack and queue nodes: a link field equal to `NONE` means "no node here".
///
/// Implemented for common unsigned integer types. Custom handle types
/// (e.g. strongly-typed slot ids) can implement it as well.
///
/// # Example
///
/// ```
/// use arbor_collections::Key;
///
/// let handle: u32 = 7;
/// assert!(handle.is_some());
/// assert!(u32::NONE.is_none());
/// ```
pub trait Key: Copy + Eq {
    /// Sentinel value representing "no node" / nil.
    ///
    /// For integer types this is `MAX`, which also caps usable capacity at
    /// `MAX - 1` slots.
    const NONE: Self;

    /// Creates a key from a `usize` slot index.
    fn from_usize(val: usize) -> Self;

    /// Returns the key as a `usize` slot index.
    fn as_usize(&self) -> usize;

    /// Returns `true` if this is the nil sentinel.
    #[inline]
    fn is_none(&self) -> bool {
        *self == Self::NONE
    }

    /// Returns `true` if this is NOT the nil sentinel.
    #[inline]
    fn is_some(&self) -> bool {
        !self.is_none()
    }
}

impl Key for u16 {
    const NONE: Self = u16::MAX;

    #[inline]
    fn from_usize(val: usize) -> Self {
        val as u16
    }

    #[inline]
    fn as_usize(&self) -> usize {
        *self as usize
    }
}

impl Key for u32 {
    const NONE: Self = u32::MAX;

    #[inline]
    fn from_usize(val: usize) -> Self {
        val as u32
    }

    #[inline]
    fn as_usize(&self) -> usize {
        *self as usize
    }
}

impl Key for u64 {
    const NONE: Self = u64::MAX;

    #[inline]
    fn from_usize(val: usize) -> Self {
        val as u64
    }

    #[inline]
    fn as_usize(&self) -> usize {
        *self as usize
    }
}

impl Key for usize {
    const NONE: Self = usize::MAX;

    #[inline]
    fn from_usize(val: usize) -> Self {
        val
    }

    #[inline]
    fn as_usize(&self) -> usize {
        *self
    }
}
