//! Game state and the rule-independent operations

use serde::{Deserialize, Serialize};

use super::types::{
    Board, Color, GameStatus, Line, PhaseConfig, Position, Rule, WinReason, Winner, BOARD_SIZE,
    CELL_COUNT,
};
use super::GameError;

/// Complete state of one game (authoritative, owned by its room)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Game {
    pub board: Board,
    pub rule: Rule,
    pub phase_config: PhaseConfig,
    pub status: GameStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner: Option<Winner>,

    // Phase rule: claims per row for each color
    pub red_row_marks: [u32; BOARD_SIZE],
    pub blue_row_marks: [u32; BOARD_SIZE],

    // Phase rule: highest playable row for each color
    pub red_unlocked_row: usize,
    pub blue_unlocked_row: usize,

    // Phase rule: first recorded Bingo, line -1 when none
    pub bingo_achiever: Color,
    pub bingo_line: i8,

    // Phase rule: settlement
    pub red_settled: bool,
    pub blue_settled: bool,
    pub first_settler: Color,
}

impl Game {
    /// New waiting game with the default phase configuration
    pub fn new(rule: Rule) -> Self {
        Self::with_config(rule, PhaseConfig::default())
    }

    pub fn with_config(rule: Rule, phase_config: PhaseConfig) -> Self {
        Self {
            board: Board::default(),
            rule,
            phase_config,
            status: GameStatus::Waiting,
            winner: None,
            red_row_marks: [0; BOARD_SIZE],
            blue_row_marks: [0; BOARD_SIZE],
            red_unlocked_row: 0,
            blue_unlocked_row: 0,
            bingo_achiever: Color::None,
            bingo_line: -1,
            red_settled: false,
            blue_settled: false,
            first_settler: Color::None,
        }
    }

    /// waiting -> playing
    pub fn start(&mut self) -> Result<(), GameError> {
        match self.status {
            GameStatus::Waiting => {
                self.status = GameStatus::Playing;
                Ok(())
            }
            GameStatus::Playing => Err(GameError::AlreadyInProgress),
            GameStatus::Finished => Err(GameError::AlreadyFinished),
        }
    }

    /// Claim a cell for a color under the active rule
    pub fn mark_cell(&mut self, pos: Position, color: Color) -> Result<(), GameError> {
        self.ensure_playing()?;
        ensure_claimant(color)?;

        match self.rule {
            Rule::Normal => self.board.cell_mut(pos).claim_exclusive(color)?,
            Rule::Blackout => {
                self.board.cell_mut(pos).claim_shared(color)?;
            }
            Rule::Phase => return self.mark_phase(pos, color),
        }

        self.refresh_outcome();
        Ok(())
    }

    /// Referee override: the cell ends up held by `color` alone
    pub fn mark_cell_force(&mut self, pos: Position, color: Color) -> Result<(), GameError> {
        if self.rule == Rule::Phase {
            return Err(GameError::ForceNotAllowed);
        }
        self.ensure_correctable()?;
        ensure_claimant(color)?;

        self.board.cell_mut(pos).force(color);
        self.refresh_outcome();
        Ok(())
    }

    /// Remove every claim from a cell
    pub fn unmark_cell(&mut self, pos: Position) -> Result<(), GameError> {
        self.ensure_correctable()?;

        let (primary, secondary) = self.board.cell_mut(pos).clear();
        if self.rule == Rule::Phase {
            for holder in [primary, secondary] {
                if !holder.is_none() {
                    self.release_row_mark(holder, pos.row());
                }
            }
            self.revalidate_bingo();
        } else {
            self.refresh_outcome();
        }
        Ok(())
    }

    /// Remove one color's claim from a cell. No-op when the color holds none.
    pub fn clear_cell_mark(&mut self, pos: Position, color: Color) -> Result<(), GameError> {
        self.ensure_correctable()?;
        ensure_claimant(color)?;

        if !self.board.cell_mut(pos).release(color) {
            return Ok(());
        }
        if self.rule == Rule::Phase {
            self.release_row_mark(color, pos.row());
            self.revalidate_bingo();
        } else {
            self.refresh_outcome();
        }
        Ok(())
    }

    pub fn set_cell_text(&mut self, pos: Position, text: String) {
        self.board.cell_mut(pos).text = text;
    }

    /// Replace all 25 texts, row-major
    pub fn set_all_cell_texts(&mut self, texts: Vec<String>) -> Result<(), GameError> {
        if texts.len() != CELL_COUNT {
            return Err(GameError::InvalidTextCount {
                expected: CELL_COUNT,
                got: texts.len(),
            });
        }
        for (pos, text) in Board::positions().zip(texts) {
            self.board.cell_mut(pos).text = text;
        }
        Ok(())
    }

    /// Back to a fresh waiting board, keeping rule and phase configuration
    pub fn reset(&mut self) {
        *self = Self::with_config(self.rule, self.phase_config);
    }

    pub fn is_finished(&self) -> bool {
        self.status == GameStatus::Finished
    }

    /// Re-derive win state for the normal and blackout rules. A game that
    /// finished automatically goes back to playing when it no longer
    /// qualifies.
    pub(super) fn refresh_outcome(&mut self) {
        let outcome = match self.rule {
            Rule::Normal => self.normal_outcome(),
            Rule::Blackout => self.blackout_outcome(),
            Rule::Phase => return,
        };

        match outcome {
            Some(winner) => {
                self.status = GameStatus::Finished;
                self.winner = Some(winner);
            }
            None => {
                if self.status == GameStatus::Finished {
                    self.status = GameStatus::Playing;
                }
                self.winner = None;
            }
        }
    }

    fn normal_outcome(&self) -> Option<Winner> {
        let (red, blue) = self.board.claim_counts();

        if let Some(color) = Line::all().find_map(|line| self.board.line_owner(line)) {
            return Some(Winner {
                winner: color,
                reason: WinReason::Bingo,
                red_score: red,
                blue_score: blue,
            });
        }

        if (red + blue) as usize >= CELL_COUNT {
            let winner = match red.cmp(&blue) {
                std::cmp::Ordering::Greater => Color::Red,
                std::cmp::Ordering::Less => Color::Blue,
                std::cmp::Ordering::Equal => Color::None,
            };
            return Some(Winner {
                winner,
                reason: WinReason::FullBoard,
                red_score: red,
                blue_score: blue,
            });
        }

        None
    }

    fn blackout_outcome(&self) -> Option<Winner> {
        let (red, blue) = self.board.claim_counts();
        let winner = if red as usize == CELL_COUNT {
            Color::Red
        } else if blue as usize == CELL_COUNT {
            Color::Blue
        } else {
            return None;
        };

        Some(Winner {
            winner,
            reason: WinReason::Blackout,
            red_score: red,
            blue_score: blue,
        })
    }

    pub(super) fn ensure_playing(&self) -> Result<(), GameError> {
        match self.status {
            GameStatus::Playing => Ok(()),
            GameStatus::Waiting => Err(GameError::NotStarted),
            GameStatus::Finished => Err(GameError::AlreadyFinished),
        }
    }

    /// Corrections (unmark, clear, force) are allowed on an automatically
    /// finished game; a settled phase game is final.
    fn ensure_correctable(&self) -> Result<(), GameError> {
        match self.status {
            GameStatus::Waiting => Err(GameError::NotStarted),
            GameStatus::Finished if self.rule == Rule::Phase => Err(GameError::AlreadyFinished),
            _ => Ok(()),
        }
    }
}

pub(super) fn ensure_claimant(color: Color) -> Result<(), GameError> {
    if color.is_none() {
        Err(GameError::InvalidColor)
    } else {
        Ok(())
    }
}
