//! # Error Types for the Refresh Subsystem
//!
//! Every failure a `Block` can observe while driving a refresh, applying a
//! received message, or building the geometry for one, is one variant of
//! [`RefreshError`]. Boundary-crossing operations — constructing a [`Box`](crate::geometry::BoxRegion),
//! applying a message body, validating a `RefreshSpec` — return
//! `Result<_, RefreshError>`. Invariant checks that could only fail from a bug
//! inside this crate (not from bad external input) use `debug_assert!`
//! instead; a release build trusts its own bookkeeping but never trusts a
//! message's contents.

use thiserror::Error;

/// All fatal conditions defined in the refresh subsystem's error handling
/// design. Variants are grouped the way the design groups them: geometry,
/// precision, state-machine, and padded-stencil violations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RefreshError {
    /// A face vector component was not in `{-1, 0, 1}`, or all components
    /// were zero.
    #[error("invalid face vector {0:?}: components must be in {{-1,0,1}}, not all zero")]
    InvalidFace([i32; 3]),

    /// A child vector component was not in `{0, 1}`.
    #[error("invalid child vector {0:?}: components must be in {{0,1}}")]
    InvalidChild([i32; 3]),

    /// A computed send/receive region escaped the bounds of the underlying
    /// array.
    #[error("region [{lo:?}, {hi:?}) escapes array bounds {bound:?}")]
    RegionOutOfBounds {
        lo: [i32; 3],
        hi: [i32; 3],
        bound: [i32; 3],
    },

    /// A field's declared precision does not match the precision recorded
    /// for the incoming data.
    #[error("precision mismatch: field declares {declared:?}, message carries {actual:?}")]
    PrecisionMismatch {
        declared: crate::field::Precision,
        actual: crate::field::Precision,
    },

    /// A field precision value was not one of single/double/quadruple.
    #[error("unsupported field precision tag {0}")]
    UnsupportedPrecision(u8),

    /// A particle position attribute used a precision other than single or
    /// double.
    #[error("unsupported particle position precision: only single/double are defined")]
    UnsupportedParticlePrecision,

    /// `refresh_start` was called while the `Sync` for this id was not
    /// `INACTIVE`, or `refresh_wait` was called while it was not `ACTIVE`.
    #[error("sync state violation for refresh {id}: expected {expected}, found {found:?}")]
    SyncStateViolation {
        id: u32,
        expected: &'static str,
        found: crate::refresh::sync::SyncState,
    },

    /// `refresh_wait` was called with a callback tag that does not match the
    /// `RefreshSpec`'s configured callback.
    #[error("callback mismatch for refresh {id}: spec expects {expected}, got {actual}")]
    CallbackMismatch { id: u32, expected: u64, actual: u64 },

    /// The pending-message queue for a refresh id was non-empty when
    /// completion was declared.
    #[error("refresh {0} completed with {1} message(s) still pending")]
    PendingQueueNotEmpty(u32, usize),

    /// A received padded-face region does not fit the receiver's staging
    /// array for that face.
    #[error("padded region size {incoming:?} does not match staging array size {staged:?}")]
    PaddedGeometryMismatch {
        incoming: [i32; 3],
        staged: [i32; 3],
    },

    /// An odd ghost depth was configured for a non-padded prolong operator,
    /// which the stencil cannot represent exactly.
    #[error("odd ghost depth {0} is incompatible with a non-padded prolong operator")]
    OddGhostDepth(i32),

    /// A particle's position after a periodic update did not land inside the
    /// receiving block's domain.
    #[error("particle position {0:?} outside receiving block domain [{1:?}, {2:?})")]
    ParticleOutOfDomain([f64; 3], [f64; 3], [f64; 3]),

    /// The level difference between an "extra" block and the direct sender
    /// was outside `{-1, 0, 1}`.
    #[error("extra-block level difference {0} is outside {{-1,0,1}}")]
    InvalidExtraLevelDifference(i32),

    /// A padded prolongation's configured padding exceeds the sender's own
    /// ghost depth along a tangential axis, so the sender's own array cannot
    /// source its whole padded footprint and the two-sided extra protocol's
    /// self-sourcing precondition does not hold.
    #[error("padding {padding} exceeds ghost depth {ghost_depth:?} on a tangential axis")]
    PaddingExceedsGhostDepth { padding: i32, ghost_depth: [i32; 3] },

    /// A `RefreshSpec` identifier was negative or otherwise out of range.
    #[error("invalid refresh id {0}")]
    InvalidRefreshId(i32),

    /// A field, particle type, or flux face id was not present in the
    /// queried store.
    #[error("unknown store id {0}")]
    UnknownStoreId(usize),

    /// A `MsgRefresh` failed to encode or decode with `bincode`.
    #[error("message codec failure for refresh {0}")]
    MessageCodec(u32),
}

pub type Result<T> = std::result::Result<T, RefreshError>;
