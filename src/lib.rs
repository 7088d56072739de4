//! Ghost-zone refresh core for a block-structured AMR mesh: geometry,
//! per-block synchronization, field/particle/flux exchange, and the actor
//! dispatch that drives a refresh across a `Mesh`/`Transport` pair supplied
//! by a host application.

pub mod block;
pub mod context;
pub mod error;
pub mod field;
pub mod flux;
pub mod geometry;
pub mod iter;
pub mod mesh;
pub mod particle;
pub mod prolong_restrict;
pub mod refresh;
pub mod transport;
