//! Wire types for one refresh's block-to-block traffic: `MsgRefresh` and its
//! `DataMsg` payload. Tagged `serde` enums, serialized with `bincode` —
//! `bincode`'s length-prefixed discriminant realizes spec.md §6's "portable,
//! versioned, tagged sum" wire format; the byte layout spec.md §6 describes
//! is the logical field order bincode already encodes, not a format this
//! crate hand-rolls.

use crate::error::{RefreshError, Result};
use crate::field::Precision;
use crate::geometry::{Child, Face, Index, Region};
use crate::particle::ParticleData;
use serde::{Deserialize, Serialize};

/// One field-pair's worth of same-level, restricted, or prolonged data,
/// packed by [`crate::field::FieldFace::pack`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldFaceMsg {
    pub src_field: usize,
    pub dst_field: usize,
    pub precision: Precision,
    /// The sender's region shape (in sender-local cells) the packed buffer
    /// was flattened from; the receiver needs this to know how to
    /// restrict/prolong it.
    pub send_n3: [i32; 3],
    pub accumulate: bool,
    pub values: Vec<f64>,
}

/// One sender's contribution to a receiver's padded coarse-shape staging
/// array (spec §4.4): which sub-region of the array this message fills, and
/// the packed values for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaddedFaceMsg {
    pub field: FieldFaceMsg,
    /// The region of the receiver's padded array this message's `values`
    /// fill, in the padded array's own local coordinates.
    pub region: Region,
}

/// Content of one [`MsgRefresh`], dispatched on the shape of what a refresh
/// step is moving.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DataMsg {
    /// One or more (src, dst) field pairs sharing the same send/receive
    /// geometry (spec.md §6's `field_count` + per-field array).
    FieldFace(Vec<FieldFaceMsg>),
    /// One or more field pairs' contributions to a padded coarse-to-fine
    /// transfer (spec §4.4), one [`PaddedFaceMsg`] per field pair, all
    /// sharing the same widened source region.
    PaddedFace(Vec<PaddedFaceMsg>),
    ParticleData {
        data: ParticleData,
        /// Whether this message transfers ownership of `data` to the
        /// receiver (always true in practice per spec.md §3's ownership
        /// rule, kept explicit since the original protocol carries the
        /// flag on the wire).
        owned: bool,
    },
    /// One message's worth of coarse-side flux contributions, one entry per
    /// flux field in the sender's store (spec.md §6's `num_fields` +
    /// per-field array). Shipped only when the receiver is coarser than the
    /// sender; same/fine-level flux refreshes ship `DataMsg::None` instead.
    FaceFluxes(Vec<(usize, crate::flux::FaceFlux)>),
    /// A zero-payload counter message: same/fine-level flux refreshes, and
    /// any refresh whose spec has nothing to ship but still needs the
    /// receiver's `Sync` counter to advance.
    None,
}

/// One message in flight for a given refresh id, from one block to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MsgRefresh {
    pub refresh_id: u32,
    pub sender: Index,
    pub receiver: Index,
    /// Direction from `sender` toward `receiver`, from the sender's point of
    /// view. Needed on arrival to know which face array a `FaceFluxes`
    /// payload accumulates into, and to rebuild the same `Box` the sender
    /// used so the receiver can ask it for its own side of the transfer.
    pub face: Face,
    /// The sender's child vector within the interface this message crosses,
    /// carried so a receiver handling a padded or restricted transfer knows
    /// where the payload lands without recomputing the `Box`.
    pub child: Child,
    /// Receiver level minus sender level: `-1`, `0`, or `+1`.
    pub relative_level: i32,
    pub data: Option<DataMsg>,
}

impl MsgRefresh {
    pub fn counter_only(
        refresh_id: u32,
        sender: Index,
        receiver: Index,
        face: Face,
        child: Child,
        relative_level: i32,
    ) -> Self {
        MsgRefresh {
            refresh_id,
            sender,
            receiver,
            face,
            child,
            relative_level,
            data: None,
        }
    }

    /// Serializes this message with `bincode`, following the same
    /// `serialize_into`-style pattern this crate's field/particle stores use
    /// elsewhere for on-disk snapshots.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        bincode::serialize_into(&mut buf, self).map_err(|_| RefreshError::MessageCodec(self.refresh_id))?;
        Ok(buf)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize_from(bytes).map_err(|_| RefreshError::MessageCodec(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_only_message_round_trips_through_bincode() {
        let msg = MsgRefresh::counter_only(
            7,
            Index::root([0, 0, 0]),
            Index::root([1, 0, 0]),
            [1, 0, 0],
            [0, 0, 0],
            0,
        );
        let bytes = msg.to_bytes().unwrap();
        let back = MsgRefresh::from_bytes(&bytes).unwrap();
        assert_eq!(back.refresh_id, 7);
        assert!(back.data.is_none());
    }

    #[test]
    fn field_face_message_round_trips() {
        let msg = MsgRefresh {
            refresh_id: 1,
            sender: Index::root([0, 0, 0]),
            receiver: Index::root([1, 0, 0]),
            face: [1, 0, 0],
            child: [0, 0, 0],
            relative_level: 0,
            data: Some(DataMsg::FieldFace(vec![FieldFaceMsg {
                src_field: 0,
                dst_field: 0,
                precision: Precision::Double,
                send_n3: [1, 4, 4],
                accumulate: false,
                values: vec![1.0; 16],
            }])),
        };
        let bytes = msg.to_bytes().unwrap();
        let back = MsgRefresh::from_bytes(&bytes).unwrap();
        match back.data {
            Some(DataMsg::FieldFace(f)) => assert_eq!(f[0].values.len(), 16),
            _ => panic!("expected FieldFace variant"),
        }
    }
}
