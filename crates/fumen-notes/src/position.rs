use std::fmt;

use crate::error::NoteError;

pub const GRID_SIZE: usize = 4;

/// One of the 16 buttons. Origin is the top-left button, x grows rightward
/// and y grows downward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position {
    x: u8,
    y: u8,
}

impl Position {
    pub fn new(x: usize, y: usize) -> Result<Self, NoteError> {
        if x >= GRID_SIZE || y >= GRID_SIZE {
            return Err(NoteError::InvalidPosition { x, y });
        }
        Ok(Self {
            x: x as u8,
            y: y as u8,
        })
    }

    /// From a linear index `x + 4 * y`.
    pub fn from_index(index: usize) -> Result<Self, NoteError> {
        Self::new(index % GRID_SIZE, index / GRID_SIZE)
    }

    pub fn index(&self) -> usize {
        self.x() + GRID_SIZE * self.y()
    }

    pub fn x(&self) -> usize {
        usize::from(self.x)
    }

    pub fn y(&self) -> usize {
        usize::from(self.y)
    }

    /// All buttons in index order.
    pub fn all() -> impl Iterator<Item = Position> {
        (0..GRID_SIZE * GRID_SIZE).map(|i| Position {
            x: (i % GRID_SIZE) as u8,
            y: (i / GRID_SIZE) as u8,
        })
    }
}

impl TryFrom<usize> for Position {
    type Error = NoteError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        Self::from_index(index)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_and_coordinates_agree() {
        let position = Position::from_index(6).unwrap();
        assert_eq!((position.x(), position.y()), (2, 1));
        assert_eq!(Position::new(2, 1).unwrap().index(), 6);
    }

    #[test]
    fn out_of_grid_is_rejected() {
        assert_eq!(
            Position::from_index(16),
            Err(NoteError::InvalidPosition { x: 0, y: 4 })
        );
        assert_eq!(
            Position::new(4, 0),
            Err(NoteError::InvalidPosition { x: 4, y: 0 })
        );
        assert!(Position::try_from(15).is_ok());
    }

    #[test]
    fn all_covers_the_grid_in_order() {
        let indices: Vec<_> = Position::all().map(|p| p.index()).collect();
        assert_eq!(indices, (0..16).collect::<Vec<_>>());
    }
}
