//! # `BoxRegion` — send/receive/extra intersection geometry
//!
//! Parameterizes the region of cells that moves across a block boundary when
//! the sender and receiver may be at different refinement levels. All
//! coordinates are in *cells*, half-open `[lo, hi)`.
//!
//! The box is always built in the coordinate frame of one sender block (the
//! block driving the refresh). A receive participant and, for the padded
//! prolongation protocol (spec §4.4), an extra participant are configured
//! with [`BoxRegion::set_block`]; [`BoxRegion::compute_region`] then derives
//! the transferred region, and [`BoxRegion::get_limits`] reports it in
//! either the sender's or the chosen participant's local array coordinates.

use crate::error::{RefreshError, Result};
use crate::geometry::child::{validate_child, Child};
use crate::geometry::face::{validate_face, Face};

/// Which participant of a [`BoxRegion`] a query or configuration call refers
/// to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Send,
    Receive,
    Extra,
}

/// Relative level, face, and child configured for one non-`Send`
/// participant of a box.
#[derive(Debug, Clone, Copy)]
struct ParticipantConfig {
    /// Receiver level minus sender level: `-1` (coarser), `0` (same), `+1`
    /// (finer).
    relative_level: i32,
    face: Face,
    child: Child,
}

/// A half-open cell range `[lo, hi)` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
    pub lo: [i32; 3],
    pub hi: [i32; 3],
}

impl Region {
    pub fn size(&self) -> [i32; 3] {
        [
            self.hi[0] - self.lo[0],
            self.hi[1] - self.lo[1],
            self.hi[2] - self.lo[2],
        ]
    }

    pub fn volume(&self) -> i64 {
        self.size().iter().map(|&n| n as i64).product()
    }
}

/// Send/receive/extra intersection geometry for one block boundary.
pub struct BoxRegion {
    rank: usize,
    /// Sender block's interior cell count per axis.
    n3: [i32; 3],
    /// Ghost depth per axis.
    g3: [i32; 3],
    /// Whether ghost cells along a *tangential* axis (face component zero)
    /// are included in the transferred region even outside `accumulate`.
    ghost_axis: [bool; 3],
    /// Padding added to tangential axes on the coarse side of a padded
    /// prolongation (spec §4.4). Zero for ordinary exchanges.
    padding: i32,
    accumulate: bool,
    receive: Option<ParticipantConfig>,
    extra: Option<ParticipantConfig>,
    /// Computed by `compute_region`, in sender-local cell coordinates,
    /// without padding applied.
    send_region: Option<Region>,
    /// Computed by `compute_region` when `padding > 0` and a coarse-side
    /// (relative_level == +1) receive/extra participant is configured: the
    /// widened coarse-side source region, in sender-local coordinates.
    padded_send_region: Option<Region>,
}

impl BoxRegion {
    pub fn new(rank: usize, n3: [i32; 3], g3: [i32; 3]) -> Self {
        BoxRegion {
            rank,
            n3,
            g3,
            ghost_axis: [false; 3],
            padding: 0,
            accumulate: false,
            receive: None,
            extra: None,
            send_region: None,
            padded_send_region: None,
        }
    }

    pub fn set_ghost_axis(&mut self, ghost_axis: [bool; 3]) -> &mut Self {
        self.ghost_axis = ghost_axis;
        self
    }

    pub fn set_accumulate(&mut self, accumulate: bool) -> &mut Self {
        self.accumulate = accumulate;
        self
    }

    pub fn set_padding(&mut self, padding: i32) -> &mut Self {
        self.padding = padding;
        self
    }

    /// Configures the receive or extra participant. `relative_level` is the
    /// participant's level minus the sender's level, and must be in
    /// `{-1, 0, 1}`.
    pub fn set_block(
        &mut self,
        which: Participant,
        relative_level: i32,
        face: Face,
        child: Child,
    ) -> Result<&mut Self> {
        validate_face(face)?;
        validate_child(child)?;
        if !(-1..=1).contains(&relative_level) {
            return Err(RefreshError::InvalidExtraLevelDifference(relative_level));
        }
        let cfg = ParticipantConfig {
            relative_level,
            face,
            child,
        };
        match which {
            Participant::Send => {
                // The sender is always the box's own reference frame; a
                // zero relative level is the only sensible configuration.
            }
            Participant::Receive => self.receive = Some(cfg),
            Participant::Extra => self.extra = Some(cfg),
        }
        Ok(self)
    }

    /// Active axes: axes beyond `rank` are degenerate (size 1, no ghosts).
    fn active_axis(&self, axis: usize) -> bool {
        axis < self.rank
    }

    /// Computes the sender-side transfer region (and, if padding is set and
    /// the configured participant is coarse-to-fine, the widened coarse
    /// source region) from whichever of receive/extra is configured.
    /// `extra` takes precedence when both are set, matching the original
    /// protocol's reuse of one `BoxRegion` for successive queries.
    pub fn compute_region(&mut self) -> Result<()> {
        let cfg = self.extra.or(self.receive).ok_or_else(|| {
            RefreshError::RegionOutOfBounds {
                lo: [0, 0, 0],
                hi: [0, 0, 0],
                bound: self.n3,
            }
        })?;

        let mut lo = [0i32; 3];
        let mut hi = [0i32; 3];
        let mut plo = [0i32; 3];
        let mut phi = [0i32; 3];

        for axis in 0..3 {
            let n = self.n3[axis];
            let g = if self.active_axis(axis) { self.g3[axis] } else { 0 };
            let f = cfg.face[axis];

            if !self.active_axis(axis) {
                lo[axis] = 0;
                hi[axis] = 1;
                plo[axis] = 0;
                phi[axis] = 1;
                continue;
            }

            if f != 0 {
                // Normal axis: a ghost-depth-thick slab near the
                // appropriate edge of the interior, regardless of relative
                // level (spec §4.1 tie-break rules).
                if f < 0 {
                    lo[axis] = g;
                    hi[axis] = 2 * g;
                } else {
                    lo[axis] = n;
                    hi[axis] = n + g;
                }
                plo[axis] = lo[axis];
                phi[axis] = hi[axis];
            } else {
                // Tangential axis.
                match cfg.relative_level {
                    0 => {
                        let include_ghost = self.accumulate || self.ghost_axis[axis];
                        if include_ghost {
                            lo[axis] = 0;
                            hi[axis] = n + 2 * g;
                        } else {
                            lo[axis] = g;
                            hi[axis] = g + n;
                        }
                        plo[axis] = lo[axis];
                        phi[axis] = hi[axis];
                    }
                    1 => {
                        // Coarse sender -> fine receiver: ship the coarse
                        // half selected by the receiver's child index.
                        let half = n / 2;
                        let base = g + cfg.child[axis] * half;
                        lo[axis] = base;
                        hi[axis] = base + half;
                        // Padded coarse source: widen symmetrically by
                        // `padding`, allowed to escape this block's own
                        // bounds (extra senders cover the remainder).
                        plo[axis] = base - self.padding;
                        phi[axis] = base + half + self.padding;
                    }
                    -1 => {
                        // Fine sender -> coarse receiver: ship everything
                        // this (fine) block has; the receiver's child index
                        // selects where it lands, not what is sent.
                        lo[axis] = g;
                        hi[axis] = g + n;
                        plo[axis] = lo[axis];
                        phi[axis] = hi[axis];
                    }
                    _ => unreachable!("relative_level validated to {{-1,0,1}} in set_block"),
                }
            }
        }

        self.send_region = Some(Region { lo, hi });
        self.padded_send_region = if self.padding > 0 {
            Some(Region { lo: plo, hi: phi })
        } else {
            None
        };
        Ok(())
    }

    /// Returns the computed region, expressed in the coordinate frame of
    /// `frame`. `Participant::Send` returns sender-local interior/ghost
    /// coordinates directly; `Participant::Receive` translates into the
    /// receiver's own ghost-zone coordinates (same shape, mirrored across
    /// the interface); `Participant::Extra` is only meaningful once an extra
    /// participant has been configured and plays the role of "receive" for
    /// that query.
    pub fn get_limits(&self, frame: Participant) -> Result<Region> {
        let region = self.send_region.ok_or_else(|| RefreshError::RegionOutOfBounds {
            lo: [0, 0, 0],
            hi: [0, 0, 0],
            bound: self.n3,
        })?;
        match frame {
            Participant::Send => Ok(region),
            Participant::Receive | Participant::Extra => {
                let cfg = if matches!(frame, Participant::Extra) {
                    self.extra.or(self.receive)
                } else {
                    self.receive.or(self.extra)
                }
                .ok_or_else(|| RefreshError::RegionOutOfBounds {
                    lo: [0, 0, 0],
                    hi: [0, 0, 0],
                    bound: self.n3,
                })?;
                Ok(self.translate_to_receiver(region, cfg))
            }
        }
    }

    /// The widened coarse-side source region used when staging a padded
    /// prolongation, in sender-local coordinates. `None` if no padding was
    /// configured.
    pub fn padded_send_limits(&self) -> Option<Region> {
        self.padded_send_region
    }

    fn translate_to_receiver(&self, region: Region, cfg: ParticipantConfig) -> Region {
        let mut lo = [0i32; 3];
        let mut hi = [0i32; 3];
        for axis in 0..3 {
            if !self.active_axis(axis) {
                lo[axis] = 0;
                hi[axis] = 1;
                continue;
            }
            let n = self.n3[axis];
            let g = self.g3[axis];
            let f = cfg.face[axis];
            let size = region.hi[axis] - region.lo[axis];

            if f != 0 {
                // The sent slab lands in the receiver's ghost zone on the
                // opposite side of the interface.
                if f < 0 {
                    // Neighbor is in the -axis direction from us, so we sit
                    // on its +axis side.
                    lo[axis] = n + g;
                    hi[axis] = n + g + size;
                } else {
                    lo[axis] = g - size;
                    hi[axis] = g;
                }
            } else {
                match cfg.relative_level {
                    0 => {
                        lo[axis] = region.lo[axis];
                        hi[axis] = region.hi[axis];
                    }
                    1 => {
                        // Coarse sender -> fine receiver: the receiver's
                        // whole tangential ghost strip is filled by this
                        // one sender (post-prolongation).
                        lo[axis] = 0;
                        hi[axis] = n;
                    }
                    -1 => {
                        // Fine sender -> coarse receiver: lands in the half
                        // of the coarse ghost strip selected by the
                        // receiver's own child index.
                        let half = n / 2;
                        let base = cfg.child[axis] * half;
                        lo[axis] = base;
                        hi[axis] = base + half;
                    }
                    _ => unreachable!(),
                }
            }
        }
        Region { lo, hi }
    }
}
