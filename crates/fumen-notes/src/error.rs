use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NoteError {
    #[error("Invalid button position ({x}, {y}), the grid is 4x4")]
    InvalidPosition { x: usize, y: usize },

    #[error("Invalid long note: {0}")]
    InvalidLongNoteGeometry(String),
}
