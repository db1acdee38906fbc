//! Storage module
//!
//! Piece assembly and destinations for verified pieces.

pub mod backend;
pub mod file;
pub mod piece;

pub use backend::{MemorySink, PieceSink};
pub use file::FileSink;
pub use piece::{plan_blocks, BlockRequest, Piece};
