//! In-stack call frames.
//!
//! A call reserves three slots directly below the caller's `sp`. With `sb`
//! set to the post-reservation `sp` they read:
//!
//! ```text
//!  sb + 4 + i   argument / capture i     (frame offset -4 - i)
//!  sb + 3       return value slot        (frame offset -3)
//!  sb + 2       return / trace address   (frame offset -2)
//!  sb + 1       frame link               (frame offset -1)
//!  sb - k       local k                  (frame offset  k)
//! ```
//!
//! The link stores the caller's `sb` as a distance from the end of the stack,
//! so relocating the stack to a bigger buffer never rewrites live frames.

/// Number of slots reserved by every call.
pub const FRAME_SLOTS: usize = 3;

pub const LINK_OFFSET: i16 = -1;
pub const RETURN_ADDRESS_OFFSET: i16 = -2;
pub const RETURN_VALUE_OFFSET: i16 = -3;

/// Highest argument (or capture) index whose frame offset still fits in an
/// `i16`.
pub const MAX_ARGUMENT_INDEX: u16 = (-4 - i16::MIN as i32) as u16;

/// Frame offset of argument (or capture) `index`, `None` past
/// [`MAX_ARGUMENT_INDEX`].
pub const fn argument_offset(index: u16) -> Option<i16> {
    if index > MAX_ARGUMENT_INDEX {
        None
    } else {
        Some(-4 - index as i16)
    }
}

/// How a frame was entered, which decides what its return does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// Script to script inside one environment; returning just continues.
    Near,
    /// Crossed an environment or JIT boundary; returning re-resolves the
    /// environment from the return address.
    Far,
    /// Entered from the embedding API; returning stops the dispatch loop.
    FromNative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameLink {
    pub kind: CallKind,
    pub caller_sb_from_end: usize,
}

/// Physical stack index addressed by a frame offset.
#[inline]
pub(crate) fn slot_index(sb: usize, offset: i16) -> usize {
    (sb as isize - offset as isize) as usize
}
