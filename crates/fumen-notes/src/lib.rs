//! Chart notes on the 4x4 button grid and the interval tree that stores them.

pub mod error;
pub mod interval_tree;
pub mod note;
pub mod note_store;
pub mod position;

pub use error::NoteError;
pub use interval_tree::IntervalTree;
pub use note::{LongNote, Note, TapNote};
pub use note_store::NoteStore;
pub use position::Position;
