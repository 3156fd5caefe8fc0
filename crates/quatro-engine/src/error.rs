//! Error types for the board engine.

/// Errors produced by board operations.
///
/// A failed drop never mutates the board: both column checks run before
/// any cell is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BoardError {
    /// The column index is outside `0..COLS`.
    #[error("column {0} is out of range")]
    InvalidColumn(usize),

    /// The column's top cell is already occupied.
    #[error("column {0} is full")]
    ColumnFull(usize),

    /// A serialized board could not be parsed.
    #[error("malformed board: {0}")]
    Malformed(String),
}
