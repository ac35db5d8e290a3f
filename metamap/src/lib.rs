//! Map/level-graph engine for a randomizing patcher: metalocation grids,
//! connectivity under traversal modes, bidirectional exit-graph maintenance,
//! and randomized transfer of exits, pits, and spawns onto regenerated
//! layouts.

pub mod metalocation;
pub mod transfer;
pub mod traverse;
pub mod world;
pub mod write;

pub use metalocation::{ExitSpec, Metalocation};
pub use traverse::{Traversal, TraverseOpts};
pub use world::MetaWorld;
