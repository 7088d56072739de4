//! Geometry primitives shared by every refresh operation: face and child
//! vectors, hierarchical block addressing, and send/receive region
//! computation.

mod box_region;
mod child;
mod face;
mod index;

pub use box_region::{BoxRegion, Participant, Region};
pub use child::{validate_child, Child};
pub use face::{face_rank, opposite_face, tangential_child, validate_face, Face};
pub use index::Index;
