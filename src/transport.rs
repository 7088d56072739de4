//! # `Transport` — unordered, reliable, point-to-point delivery
//!
//! The refresh subsystem never opens a socket or spawns a thread itself: it
//! is handed a [`Transport`] by the host application (spec.md §1's "message
//! transport" collaborator). [`ChannelTransport`] is the `mpsc`-based
//! reference harness this crate's own tests and [`crate::block`] examples
//! use to exercise the protocol end to end — it is not a production
//! multi-node transport; a host application supplies its own impl (TCP,
//! MPI, an actor framework's mailbox) for real delivery.

use crate::geometry::Index;
use crate::refresh::MsgRefresh;
use std::collections::HashMap;
use std::sync::mpsc::{Receiver, Sender};

/// Unordered, reliable, point-to-point block-to-block delivery.
/// Implementations may reorder messages between a given sender/receiver
/// pair but must never drop one.
pub trait Transport {
    fn send(&self, dst: Index, msg: MsgRefresh);
}

/// An `mpsc`-channel-backed [`Transport`] connecting a fixed set of blocks
/// known up front, for use in tests and the `demos/` example. Each block
/// gets one `Sender` clone per peer and one shared `Receiver` it drains on
/// its own turn — modeling the "one actor, one mailbox" execution model
/// spec.md §5 describes without pulling in an actual scheduler.
pub struct ChannelTransport {
    senders: HashMap<Index, Sender<MsgRefresh>>,
}

impl ChannelTransport {
    /// Builds a transport with one channel per named block, returning the
    /// transport plus each block's own `Receiver`, in the same order as
    /// `blocks`.
    pub fn new(blocks: &[Index]) -> (Self, Vec<Receiver<MsgRefresh>>) {
        let mut senders = HashMap::new();
        let mut receivers = Vec::with_capacity(blocks.len());
        for block in blocks {
            let (tx, rx) = std::sync::mpsc::channel();
            senders.insert(block.clone(), tx);
            receivers.push(rx);
        }
        (ChannelTransport { senders }, receivers)
    }
}

impl Transport for ChannelTransport {
    fn send(&self, dst: Index, msg: MsgRefresh) {
        if let Some(tx) = self.senders.get(&dst) {
            // A closed receiver only happens when the owning block has
            // already shut down; dropping the message is the right
            // behavior for a reference harness, not a live cluster.
            let _ = tx.send(msg);
        }
    }
}
