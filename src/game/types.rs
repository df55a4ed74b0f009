//! Board primitives and rule configuration shared by every rule

use serde::{Deserialize, Serialize};

use super::GameError;

/// Board edge length
pub const BOARD_SIZE: usize = 5;
/// Total number of cells on the board
pub const CELL_COUNT: usize = BOARD_SIZE * BOARD_SIZE;
/// Index of the last row (settlement row for the phase rule)
pub const LAST_ROW: usize = BOARD_SIZE - 1;

/// Claim color. `None` marks an empty slot and is never a valid claimant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    #[default]
    None,
    Red,
    Blue,
}

impl Color {
    /// Both claimant colors, red first (scan order for lines and wins)
    pub const CLAIMANTS: [Color; 2] = [Color::Red, Color::Blue];

    pub fn is_none(self) -> bool {
        self == Color::None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Color::None => "none",
            Color::Red => "red",
            Color::Blue => "blue",
        }
    }
}

/// Marking rule set for a game
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    /// Each cell is claimed once; a full line or a full board ends the game
    #[default]
    Normal,
    /// Both colors may claim every cell; first to 25 claims wins
    Blackout,
    /// Row-by-row unlocking with per-row limits and settlement scoring
    Phase,
}

impl Rule {
    pub fn as_str(self) -> &'static str {
        match self {
            Rule::Normal => "normal",
            Rule::Blackout => "blackout",
            Rule::Phase => "phase",
        }
    }
}

/// Game lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    #[default]
    Waiting,
    Playing,
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinReason {
    Bingo,
    FullBoard,
    Blackout,
    Phase,
}

/// Final result, present only once the game is finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    /// `None` on a drawn full board
    pub winner: Color,
    pub reason: WinReason,
    pub red_score: u32,
    pub blue_score: u32,
}

/// Scoring and unlock parameters for the phase rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// Score per primary claim, by row
    pub row_scores: [u32; BOARD_SIZE],
    /// Score per secondary claim, by row
    pub second_half_scores: [u32; BOARD_SIZE],
    /// Max cells one color may claim within a row
    pub cells_per_row: u32,
    /// Claims in a row needed before the next row opens
    pub unlock_threshold: u32,
    /// Bonus for the recorded Bingo achiever
    pub bingo_bonus: u32,
    /// Bonus for the first color to settle
    pub final_bonus: u32,
}

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            row_scores: [2, 2, 4, 4, 6],
            second_half_scores: [1, 1, 2, 2, 3],
            cells_per_row: 3,
            unlock_threshold: 2,
            bingo_bonus: 3,
            final_bonus: 3,
        }
    }
}

/// Partial phase configuration as sent by clients
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseConfigPatch {
    pub row_scores: Option<Vec<u32>>,
    pub second_half_scores: Option<Vec<u32>>,
    pub cells_per_row: Option<u32>,
    pub unlock_threshold: Option<u32>,
    pub bingo_bonus: Option<u32>,
    pub final_bonus: Option<u32>,
}

impl PhaseConfig {
    /// Apply client overrides. Score arrays apply only with exactly five
    /// entries; scalars apply only when positive.
    pub fn with_overrides(mut self, patch: &PhaseConfigPatch) -> Self {
        fn row_array(values: &Option<Vec<u32>>) -> Option<[u32; BOARD_SIZE]> {
            values.as_deref().and_then(|v| v.try_into().ok())
        }
        fn positive(value: Option<u32>) -> Option<u32> {
            value.filter(|v| *v > 0)
        }

        if let Some(scores) = row_array(&patch.row_scores) {
            self.row_scores = scores;
        }
        if let Some(scores) = row_array(&patch.second_half_scores) {
            self.second_half_scores = scores;
        }
        if let Some(v) = positive(patch.cells_per_row) {
            self.cells_per_row = v;
        }
        if let Some(v) = positive(patch.unlock_threshold) {
            self.unlock_threshold = v;
        }
        if let Some(v) = positive(patch.bingo_bonus) {
            self.bingo_bonus = v;
        }
        if let Some(v) = positive(patch.final_bonus) {
            self.final_bonus = v;
        }
        self
    }
}

/// Validated board coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    row: usize,
    col: usize,
}

impl Position {
    /// Validate raw wire coordinates
    pub fn new(row: i64, col: i64) -> Result<Self, GameError> {
        let in_range = |v: i64| usize::try_from(v).ok().filter(|v| *v < BOARD_SIZE);
        match (in_range(row), in_range(col)) {
            (Some(row), Some(col)) => Ok(Self { row, col }),
            _ => Err(GameError::InvalidPosition { row, col }),
        }
    }

    pub(crate) fn at(row: usize, col: usize) -> Self {
        debug_assert!(row < BOARD_SIZE && col < BOARD_SIZE);
        Self { row, col }
    }

    pub fn row(self) -> usize {
        self.row
    }

    pub fn col(self) -> usize {
        self.col
    }
}

/// Which slot a shared claim landed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Primary,
    Secondary,
}

/// A single board cell
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    /// First claimant
    pub marked_by: Color,
    /// Second claimant (blackout and phase rules)
    pub second_mark: Color,
    /// Number of claims held, kept equal to the filled slot count
    pub times: u8,
    pub text: String,
}

impl Cell {
    pub fn holds(&self, color: Color) -> bool {
        !color.is_none() && (self.marked_by == color || self.second_mark == color)
    }

    pub fn is_claimed(&self) -> bool {
        !self.marked_by.is_none()
    }

    /// Single-occupancy claim (normal rule)
    pub(crate) fn claim_exclusive(&mut self, color: Color) -> Result<(), GameError> {
        if self.is_claimed() {
            return Err(GameError::AlreadyMarked);
        }
        self.marked_by = color;
        self.recount();
        Ok(())
    }

    /// Dual-occupancy claim (blackout and phase rules)
    pub(crate) fn claim_shared(&mut self, color: Color) -> Result<Slot, GameError> {
        if self.holds(color) {
            return Err(GameError::AlreadyClaimed);
        }
        let slot = if self.marked_by.is_none() {
            self.marked_by = color;
            Slot::Primary
        } else if self.second_mark.is_none() {
            self.second_mark = color;
            Slot::Secondary
        } else {
            return Err(GameError::AlreadyMarked);
        };
        self.recount();
        Ok(slot)
    }

    /// Overwrite every claim with a single primary claim
    pub(crate) fn force(&mut self, color: Color) {
        self.marked_by = color;
        self.second_mark = Color::None;
        self.recount();
    }

    /// Drop one color's claim, promoting the remaining claim to primary.
    /// Returns false when the color held nothing here.
    pub(crate) fn release(&mut self, color: Color) -> bool {
        if color.is_none() {
            return false;
        }
        if self.marked_by == color {
            self.marked_by = self.second_mark;
            self.second_mark = Color::None;
        } else if self.second_mark == color {
            self.second_mark = Color::None;
        } else {
            return false;
        }
        self.recount();
        true
    }

    /// Drop every claim, returning the previous (primary, secondary) holders
    pub(crate) fn clear(&mut self) -> (Color, Color) {
        let previous = (self.marked_by, self.second_mark);
        self.marked_by = Color::None;
        self.second_mark = Color::None;
        self.times = 0;
        previous
    }

    fn recount(&mut self) {
        self.times = u8::from(!self.marked_by.is_none()) + u8::from(!self.second_mark.is_none());
    }
}

/// Fixed 5x5 board
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub cells: [[Cell; BOARD_SIZE]; BOARD_SIZE],
}

impl Board {
    pub fn cell(&self, pos: Position) -> &Cell {
        &self.cells[pos.row][pos.col]
    }

    pub(crate) fn cell_mut(&mut self, pos: Position) -> &mut Cell {
        &mut self.cells[pos.row][pos.col]
    }

    pub fn positions() -> impl Iterator<Item = Position> {
        (0..BOARD_SIZE).flat_map(|row| (0..BOARD_SIZE).map(move |col| Position::at(row, col)))
    }

    /// Claims held by (red, blue), counting either slot
    pub fn claim_counts(&self) -> (u32, u32) {
        Self::positions().fold((0, 0), |(red, blue), pos| {
            let cell = self.cell(pos);
            (
                red + u32::from(cell.holds(Color::Red)),
                blue + u32::from(cell.holds(Color::Blue)),
            )
        })
    }

    /// Color holding every primary slot of the line, if any
    pub fn line_owner(&self, line: Line) -> Option<Color> {
        let mut cells = line.positions().map(|pos| self.cell(pos).marked_by);
        let first = cells.next()?;
        if first.is_none() {
            return None;
        }
        cells.all(|c| c == first).then_some(first)
    }

    /// Whether the color holds every cell of the line in either slot
    pub fn line_held_by(&self, line: Line, color: Color) -> bool {
        line.positions().all(|pos| self.cell(pos).holds(color))
    }
}

/// A straight line across the board
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Line {
    Row(usize),
    Column(usize),
    /// Top-left to bottom-right
    Diagonal,
    /// Top-right to bottom-left
    AntiDiagonal,
}

impl Line {
    /// The 12 lines checked by the normal rule: rows, columns, diagonals
    pub fn all() -> impl Iterator<Item = Line> {
        (0..BOARD_SIZE)
            .map(Line::Row)
            .chain((0..BOARD_SIZE).map(Line::Column))
            .chain([Line::Diagonal, Line::AntiDiagonal])
    }

    /// The 7 lines that count for phase-rule Bingo, in scan order
    pub fn bingo_lines() -> impl Iterator<Item = Line> {
        (0..BOARD_SIZE)
            .map(Line::Column)
            .chain([Line::Diagonal, Line::AntiDiagonal])
    }

    pub fn positions(self) -> impl Iterator<Item = Position> {
        (0..BOARD_SIZE).map(move |i| match self {
            Line::Row(row) => Position::at(row, i),
            Line::Column(col) => Position::at(i, col),
            Line::Diagonal => Position::at(i, i),
            Line::AntiDiagonal => Position::at(i, BOARD_SIZE - 1 - i),
        })
    }

    /// Wire index of a Bingo line: 0-4 columns, 5 diagonal, 6 anti-diagonal
    pub fn bingo_index(self) -> Option<i8> {
        match self {
            Line::Column(col) => Some(col as i8),
            Line::Diagonal => Some(5),
            Line::AntiDiagonal => Some(6),
            Line::Row(_) => None,
        }
    }

    pub fn from_bingo_index(index: i8) -> Option<Line> {
        match index {
            0..=4 => Some(Line::Column(index as usize)),
            5 => Some(Line::Diagonal),
            6 => Some(Line::AntiDiagonal),
            _ => None,
        }
    }
}
