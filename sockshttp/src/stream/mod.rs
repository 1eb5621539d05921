//! Stream composition used to frame and assemble message bodies.

pub mod chunked;
mod concat;
mod limited;
mod shared;

pub use concat::{Concat, PartList};
pub use limited::Limited;
pub use shared::Shared;
