//! The refresh operation itself: its immutable [`RefreshSpec`], the
//! per-block [`sync::Sync`] state machine, wire [`message`] types, and the
//! dispatch logic a [`crate::block::Block`] drives through them.

pub mod dispatch;
pub mod message;
pub mod padded;
pub mod spec;
pub mod sync;

pub use message::{DataMsg, FieldFaceMsg, MsgRefresh, PaddedFaceMsg};
pub use padded::{count_extra_messages, padding_fits_ghost_depth, prolong_and_crop, send_extra_contributions};
pub use spec::{NeighborType, RefreshSpec};
pub use sync::{Sync, SyncState};
