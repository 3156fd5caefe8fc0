//! The 6×7 Connect Four grid.
//!
//! Row 0 is the top of the board, row 5 the bottom. Tokens fall to the
//! lowest empty row of a column, so a column is full exactly when its
//! top cell is occupied, and the board is full exactly when the top row is.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::BoardError;

/// Number of rows on the board.
pub const ROWS: usize = 6;
/// Number of columns on the board.
pub const COLS: usize = 7;
/// Length of a winning run.
pub const CONNECT: usize = 4;

// ---------------------------------------------------------------------------
// Token / Cell
// ---------------------------------------------------------------------------

/// One of the two token colors. The session's first participant plays
/// `A` and moves first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Token {
    A,
    B,
}

impl Token {
    /// The opposing token.
    pub fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }

    /// The cell value this token occupies.
    pub fn cell(self) -> Cell {
        match self {
            Self::A => Cell::A,
            Self::B => Cell::B,
        }
    }
}

/// The content of a single board cell.
///
/// On the wire a cell is a plain number: `0` empty, `1` token A,
/// `2` token B.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cell {
    #[default]
    Empty,
    A,
    B,
}

impl Cell {
    fn code(self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::A => 1,
            Self::B => 2,
        }
    }

    fn from_code(code: u8) -> Result<Self, BoardError> {
        match code {
            0 => Ok(Self::Empty),
            1 => Ok(Self::A),
            2 => Ok(Self::B),
            other => Err(BoardError::Malformed(format!(
                "unknown cell value {other}"
            ))),
        }
    }

    /// Returns `true` if the cell holds no token.
    pub fn is_empty(self) -> bool {
        matches!(self, Self::Empty)
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// A Connect Four board.
///
/// Serializes as a 6×7 array of cell codes (top row first), which is the
/// representation sent to clients on `session_started` and `board_updated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "Vec<Vec<u8>>", try_from = "Vec<Vec<u8>>")]
pub struct Board {
    cells: [[Cell; COLS]; ROWS],
}

impl Board {
    /// Creates an empty board.
    pub fn new() -> Self {
        Self {
            cells: [[Cell::Empty; COLS]; ROWS],
        }
    }

    /// Returns the cell at `(row, column)`. Panics if out of range.
    pub fn get(&self, row: usize, column: usize) -> Cell {
        self.cells[row][column]
    }

    /// Returns `true` if `column` is out of range or its top cell is taken.
    pub fn is_column_full(&self, column: usize) -> bool {
        column >= COLS || !self.cells[0][column].is_empty()
    }

    /// Columns that can still accept a token, in ascending order.
    pub fn legal_columns(&self) -> impl Iterator<Item = usize> + '_ {
        (0..COLS).filter(|&c| !self.is_column_full(c))
    }

    /// Drops `token` into `column` and returns the row it landed on.
    ///
    /// # Errors
    /// - [`BoardError::InvalidColumn`] if `column >= COLS`
    /// - [`BoardError::ColumnFull`] if the column's top cell is occupied
    ///
    /// The board is untouched on either error.
    pub fn drop_token(
        &mut self,
        column: usize,
        token: Token,
    ) -> Result<usize, BoardError> {
        if column >= COLS {
            return Err(BoardError::InvalidColumn(column));
        }
        if self.is_column_full(column) {
            return Err(BoardError::ColumnFull(column));
        }

        let row = (0..ROWS)
            .rev()
            .find(|&r| self.cells[r][column].is_empty())
            .ok_or(BoardError::ColumnFull(column))?;
        self.cells[row][column] = token.cell();
        Ok(row)
    }

    /// Returns `true` if the token at `(row, column)` completes a run of
    /// at least [`CONNECT`] in any of the four axis directions.
    ///
    /// Only runs through the given cell are considered, so this is meant
    /// to be called with the coordinates `drop_token` just returned.
    pub fn is_winning_drop(
        &self,
        row: usize,
        column: usize,
        token: Token,
    ) -> bool {
        if row >= ROWS || column >= COLS || self.get(row, column) != token.cell() {
            return false;
        }

        // (dr, dc): horizontal, vertical, "\" diagonal, "/" diagonal.
        const AXES: [(isize, isize); 4] = [(0, 1), (1, 0), (1, 1), (1, -1)];

        AXES.iter().any(|&(dr, dc)| {
            let run = 1
                + self.count_run(row, column, dr, dc, token)
                + self.count_run(row, column, -dr, -dc, token);
            run >= CONNECT
        })
    }

    /// Counts contiguous `token` cells starting one step away from
    /// `(row, column)` in direction `(dr, dc)`. The origin is not counted.
    fn count_run(
        &self,
        row: usize,
        column: usize,
        dr: isize,
        dc: isize,
        token: Token,
    ) -> usize {
        let mut count = 0;
        let mut r = row as isize + dr;
        let mut c = column as isize + dc;
        while (0..ROWS as isize).contains(&r)
            && (0..COLS as isize).contains(&c)
            && self.cells[r as usize][c as usize] == token.cell()
        {
            count += 1;
            r += dr;
            c += dc;
        }
        count
    }

    /// Returns `true` if every top-row cell is occupied.
    pub fn is_full(&self) -> bool {
        self.cells[0].iter().all(|c| !c.is_empty())
    }
}

#[cfg(test)]
impl Board {
    /// Builds a board from top-to-bottom row strings using `.`, `A`, `B`.
    pub(crate) fn from_rows(rows: [&str; ROWS]) -> Self {
        let mut board = Board::new();
        for (r, row) in rows.iter().enumerate() {
            for (c, ch) in row.chars().enumerate() {
                board.cells[r][c] = match ch {
                    'A' => Cell::A,
                    'B' => Cell::B,
                    _ => Cell::Empty,
                };
            }
        }
        board
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Board> for Vec<Vec<u8>> {
    fn from(board: Board) -> Self {
        board
            .cells
            .iter()
            .map(|row| row.iter().map(|c| c.code()).collect())
            .collect()
    }
}

impl TryFrom<Vec<Vec<u8>>> for Board {
    type Error = BoardError;

    fn try_from(rows: Vec<Vec<u8>>) -> Result<Self, Self::Error> {
        if rows.len() != ROWS {
            return Err(BoardError::Malformed(format!(
                "expected {ROWS} rows, got {}",
                rows.len()
            )));
        }
        let mut board = Board::new();
        for (r, row) in rows.iter().enumerate() {
            if row.len() != COLS {
                return Err(BoardError::Malformed(format!(
                    "row {r} has {} cells, expected {COLS}",
                    row.len()
                )));
            }
            for (c, code) in row.iter().enumerate() {
                board.cells[r][c] = Cell::from_code(*code)?;
            }
        }
        Ok(board)
    }
}

/// The persisted string form: rows top to bottom, separated by `/`,
/// each cell a digit. An empty board is `0000000/0000000/...`.
impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (r, row) in self.cells.iter().enumerate() {
            if r > 0 {
                f.write_str("/")?;
            }
            for cell in row {
                write!(f, "{}", cell.code())?;
            }
        }
        Ok(())
    }
}

impl FromStr for Board {
    type Err = BoardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rows = s
            .split('/')
            .map(|row| {
                row.chars()
                    .map(|ch| {
                        ch.to_digit(10).map(|d| d as u8).ok_or_else(|| {
                            BoardError::Malformed(format!(
                                "unexpected character {ch:?}"
                            ))
                        })
                    })
                    .collect::<Result<Vec<u8>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Board::try_from(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_token_lands_on_lowest_empty_row() {
        let mut board = Board::new();

        assert_eq!(board.drop_token(3, Token::A), Ok(5));
        assert_eq!(board.drop_token(3, Token::B), Ok(4));
        assert_eq!(board.get(5, 3), Cell::A);
        assert_eq!(board.get(4, 3), Cell::B);
    }

    #[test]
    fn test_drop_token_every_column_fills_bottom_up() {
        let mut board = Board::new();
        for column in 0..COLS {
            for expected_row in (0..ROWS).rev() {
                let row = board.drop_token(column, Token::A).unwrap();
                assert_eq!(row, expected_row, "column {column}");
            }
        }
        assert!(board.is_full());
    }

    #[test]
    fn test_drop_token_full_column_rejected_without_mutation() {
        let mut board = Board::new();
        for _ in 0..ROWS {
            board.drop_token(0, Token::A).unwrap();
        }
        let before = board;

        assert_eq!(board.drop_token(0, Token::B), Err(BoardError::ColumnFull(0)));
        assert_eq!(board, before);
    }

    #[test]
    fn test_drop_token_out_of_range_rejected() {
        let mut board = Board::new();
        assert_eq!(
            board.drop_token(COLS, Token::A),
            Err(BoardError::InvalidColumn(COLS))
        );
        assert_eq!(board, Board::new());
    }

    #[test]
    fn test_is_winning_drop_horizontal() {
        let board = Board::from_rows([
            ".......",
            ".......",
            ".......",
            ".......",
            "...BBB.",
            ".AAAA..",
        ]);
        for column in 1..=4 {
            assert!(board.is_winning_drop(5, column, Token::A), "column {column}");
        }
        assert!(!board.is_winning_drop(4, 4, Token::B));
    }

    #[test]
    fn test_is_winning_drop_vertical() {
        let mut board = Board::new();
        let mut last = 0;
        for _ in 0..4 {
            last = board.drop_token(2, Token::B).unwrap();
        }
        assert_eq!(last, 2);
        assert!(board.is_winning_drop(last, 2, Token::B));
    }

    #[test]
    fn test_is_winning_drop_alternating_column_is_not_a_win() {
        // Alternating owners in one column never form a vertical run.
        let mut board = Board::new();
        let mut token = Token::A;
        let mut last = (0, 0);
        for column in [0, 0, 0, 0] {
            last = (board.drop_token(column, token).unwrap(), column);
            token = token.other();
        }
        assert!(!board.is_winning_drop(last.0, last.1, Token::B));
    }

    #[test]
    fn test_is_winning_drop_diagonals() {
        let rising = Board::from_rows([
            ".......",
            ".......",
            "...A...",
            "..AB...",
            ".ABB...",
            "ABBB...",
        ]);
        assert!(rising.is_winning_drop(2, 3, Token::A));
        assert!(rising.is_winning_drop(5, 0, Token::A));

        let falling = Board::from_rows([
            ".......",
            ".......",
            "B......",
            "AB.....",
            "AAB....",
            "AAAB...",
        ]);
        assert!(falling.is_winning_drop(5, 3, Token::B));
        assert!(!falling.is_winning_drop(5, 2, Token::A));
    }

    #[test]
    fn test_is_winning_drop_three_in_a_row_is_not_a_win() {
        let board = Board::from_rows([
            ".......",
            ".......",
            ".......",
            ".......",
            ".......",
            "AAA.AAB",
        ]);
        assert!(!board.is_winning_drop(5, 2, Token::A));
        assert!(!board.is_winning_drop(5, 4, Token::A));
    }

    #[test]
    fn test_is_winning_drop_wrong_token_or_empty_cell() {
        let board = Board::from_rows([
            ".......",
            ".......",
            ".......",
            ".......",
            ".......",
            "AAAA...",
        ]);
        assert!(!board.is_winning_drop(5, 0, Token::B));
        assert!(!board.is_winning_drop(0, 0, Token::A));
    }

    #[test]
    fn test_is_full_only_when_top_row_occupied() {
        let mut board = Board::new();
        assert!(!board.is_full());
        for column in 0..COLS {
            for _ in 0..ROWS {
                board.drop_token(column, Token::B).unwrap();
            }
            assert_eq!(board.is_full(), column == COLS - 1);
        }
    }

    #[test]
    fn test_legal_columns_skips_full_columns() {
        let mut board = Board::new();
        for _ in 0..ROWS {
            board.drop_token(4, Token::A).unwrap();
        }
        let legal: Vec<usize> = board.legal_columns().collect();
        assert_eq!(legal, vec![0, 1, 2, 3, 5, 6]);
    }

    #[test]
    fn test_transport_form_round_trip() {
        let board = Board::from_rows([
            ".......",
            ".......",
            "...A...",
            "..AB...",
            ".ABB..B",
            "ABBBA.A",
        ]);
        let json = serde_json::to_string(&board).unwrap();
        assert!(json.starts_with("[[0,0,0,0,0,0,0],"));

        let back: Board = serde_json::from_str(&json).unwrap();
        assert_eq!(back, board);
    }

    #[test]
    fn test_transport_form_rejects_bad_shape() {
        let result: Result<Board, _> = serde_json::from_str("[[0,0,0]]");
        assert!(result.is_err());

        let result: Result<Board, _> =
            serde_json::from_str(&format!("[{}]", vec!["[0,0,0,0,0,0,9]"; ROWS].join(",")));
        assert!(result.is_err());
    }

    #[test]
    fn test_string_form_round_trip() {
        let mut board = Board::new();
        board.drop_token(3, Token::A).unwrap();
        board.drop_token(3, Token::B).unwrap();
        board.drop_token(6, Token::A).unwrap();

        let text = board.to_string();
        assert_eq!(text.len(), ROWS * COLS + ROWS - 1);
        assert!(text.ends_with("0001001"));
        assert_eq!(text.parse::<Board>(), Ok(board));
    }

    #[test]
    fn test_string_form_rejects_garbage() {
        assert!("not a board".parse::<Board>().is_err());
        assert!("0000000".parse::<Board>().is_err());
    }
}
