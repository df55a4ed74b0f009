//! Phase rule: row unlocking, per-row limits, Bingo tracking and settlement

use super::engine::{ensure_claimant, Game};
use super::types::{Color, GameStatus, Line, Position, Rule, WinReason, Winner, BOARD_SIZE, LAST_ROW};
use super::GameError;

/// Claims a color needs in the last row before it may settle first
pub const SETTLE_MIN_LAST_ROW_MARKS: u32 = 2;

impl Game {
    pub(super) fn mark_phase(&mut self, pos: Position, color: Color) -> Result<(), GameError> {
        let row = pos.row();
        if row > self.unlocked_row(color) {
            return Err(GameError::RowLocked);
        }
        if self.row_marks(color)[row] >= self.phase_config.cells_per_row {
            return Err(GameError::RowLimitExceeded);
        }

        self.board.cell_mut(pos).claim_shared(color)?;
        self.row_marks_mut(color)[row] += 1;
        self.rederive_frontier(color);

        if self.bingo_achiever.is_none() {
            self.scan_bingo();
        }
        Ok(())
    }

    /// Claims per row for a color
    pub fn row_marks(&self, color: Color) -> &[u32; BOARD_SIZE] {
        match color {
            Color::Blue => &self.blue_row_marks,
            _ => &self.red_row_marks,
        }
    }

    fn row_marks_mut(&mut self, color: Color) -> &mut [u32; BOARD_SIZE] {
        match color {
            Color::Blue => &mut self.blue_row_marks,
            _ => &mut self.red_row_marks,
        }
    }

    /// Highest row the color may currently mark
    pub fn unlocked_row(&self, color: Color) -> usize {
        match color {
            Color::Blue => self.blue_unlocked_row,
            _ => self.red_unlocked_row,
        }
    }

    fn unlocked_row_mut(&mut self, color: Color) -> &mut usize {
        match color {
            Color::Blue => &mut self.blue_unlocked_row,
            _ => &mut self.red_unlocked_row,
        }
    }

    pub fn is_settled(&self, color: Color) -> bool {
        match color {
            Color::Red => self.red_settled,
            Color::Blue => self.blue_settled,
            Color::None => false,
        }
    }

    /// The largest row r such that every row before r meets the unlock
    /// threshold, capped at the last row
    fn frontier(&self, color: Color) -> usize {
        let threshold = self.phase_config.unlock_threshold;
        self.row_marks(color)
            .iter()
            .take(LAST_ROW)
            .position(|&marks| marks < threshold)
            .unwrap_or(LAST_ROW)
    }

    fn rederive_frontier(&mut self, color: Color) {
        let frontier = self.frontier(color);
        *self.unlocked_row_mut(color) = frontier;
    }

    /// Undo one claim in a row and roll the unlock frontier back as needed
    pub(super) fn release_row_mark(&mut self, color: Color, row: usize) {
        let marks = &mut self.row_marks_mut(color)[row];
        *marks = marks.saturating_sub(1);
        self.rederive_frontier(color);
    }

    /// Record the first column or diagonal fully held by one color
    fn scan_bingo(&mut self) {
        let found = Line::bingo_lines().find_map(|line| {
            Color::CLAIMANTS
                .into_iter()
                .find(|&color| self.board.line_held_by(line, color))
                .map(|color| (color, line))
        });

        if let Some((color, line)) = found {
            self.bingo_achiever = color;
            self.bingo_line = line.bingo_index().unwrap_or(-1);
        }
    }

    /// After a claim is removed: keep the recorded Bingo if its line still
    /// holds, otherwise drop it and rescan
    pub(super) fn revalidate_bingo(&mut self) {
        if self.bingo_achiever.is_none() {
            return;
        }

        let still_held = Line::from_bingo_index(self.bingo_line)
            .map(|line| self.board.line_held_by(line, self.bingo_achiever))
            .unwrap_or(false);
        if still_held {
            return;
        }

        self.bingo_achiever = Color::None;
        self.bingo_line = -1;
        self.scan_bingo();
    }

    /// Whether the color meets the first-settler condition
    pub fn can_settle(&self, color: Color) -> bool {
        self.row_marks(color)[LAST_ROW] >= SETTLE_MIN_LAST_ROW_MARKS
    }

    /// End a color's participation. The first settler must meet
    /// [`Game::can_settle`]; the second may settle unconditionally. Once both
    /// have settled the game is scored and finished.
    pub fn settle(&mut self, color: Color) -> Result<(), GameError> {
        if self.rule != Rule::Phase {
            return Err(GameError::SettlementUnavailable);
        }
        self.ensure_playing()?;
        ensure_claimant(color)?;

        if self.is_settled(color) {
            return Err(GameError::AlreadySettled);
        }
        if self.first_settler.is_none() {
            if !self.can_settle(color) {
                return Err(GameError::CannotSettleYet);
            }
            self.first_settler = color;
        }

        match color {
            Color::Red => self.red_settled = true,
            _ => self.blue_settled = true,
        }

        if self.red_settled && self.blue_settled {
            self.finish_phase();
        }
        Ok(())
    }

    /// (red, blue) settlement scores
    pub fn phase_scores(&self) -> (u32, u32) {
        let config = &self.phase_config;
        let mut scores = [0u32; 2];
        let slot = |color: Color| match color {
            Color::Red => Some(0),
            Color::Blue => Some(1),
            Color::None => None,
        };

        for (row, cells) in self.board.cells.iter().enumerate() {
            for cell in cells {
                if let Some(i) = slot(cell.marked_by) {
                    scores[i] += config.row_scores[row];
                }
                if let Some(i) = slot(cell.second_mark) {
                    scores[i] += config.second_half_scores[row];
                }
            }
        }
        if let Some(i) = slot(self.bingo_achiever) {
            scores[i] += config.bingo_bonus;
        }
        if let Some(i) = slot(self.first_settler) {
            scores[i] += config.final_bonus;
        }

        (scores[0], scores[1])
    }

    fn finish_phase(&mut self) {
        let (red_score, blue_score) = self.phase_scores();
        let winner = match red_score.cmp(&blue_score) {
            std::cmp::Ordering::Greater => Color::Red,
            std::cmp::Ordering::Less => Color::Blue,
            std::cmp::Ordering::Equal => self.first_settler,
        };

        self.winner = Some(Winner {
            winner,
            reason: WinReason::Phase,
            red_score,
            blue_score,
        });
        self.status = GameStatus::Finished;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::types::PhaseConfig;

    fn pos(row: usize, col: usize) -> Position {
        Position::new(row as i64, col as i64).unwrap()
    }

    fn phase_game() -> Game {
        let mut game = Game::new(Rule::Phase);
        game.start().unwrap();
        game
    }

    fn mark_all(game: &mut Game, color: Color, cells: &[(usize, usize)]) {
        for &(row, col) in cells {
            game.mark_cell(pos(row, col), color)
                .unwrap_or_else(|e| panic!("mark ({row}, {col}) for {color:?}: {e}"));
        }
    }

    /// Largest r with every earlier row at or above the threshold
    fn expected_frontier(game: &Game, color: Color) -> usize {
        let threshold = game.phase_config.unlock_threshold;
        let marks = game.row_marks(color);
        (0..=LAST_ROW)
            .take_while(|&r| (0..r).all(|prev| marks[prev] >= threshold))
            .last()
            .unwrap_or(0)
    }

    /// Two claims in each of rows 0-3 opens the last row
    const RED_LADDER: [(usize, usize); 8] =
        [(0, 0), (0, 1), (1, 0), (1, 1), (2, 0), (2, 1), (3, 0), (3, 1)];
    const BLUE_LADDER: [(usize, usize); 8] =
        [(0, 2), (0, 3), (1, 2), (1, 3), (2, 2), (2, 3), (3, 2), (3, 3)];

    #[test]
    fn rows_unlock_at_threshold() {
        let mut game = phase_game();
        assert_eq!(game.mark_cell(pos(1, 0), Color::Red), Err(GameError::RowLocked));

        mark_all(&mut game, Color::Red, &[(0, 0)]);
        assert_eq!(game.red_unlocked_row, 0);
        mark_all(&mut game, Color::Red, &[(0, 1)]);
        assert_eq!(game.red_unlocked_row, 1);
        assert_eq!(game.blue_unlocked_row, 0);

        mark_all(&mut game, Color::Red, &RED_LADDER[2..]);
        assert_eq!(game.red_unlocked_row, LAST_ROW);
    }

    #[test]
    fn row_limit_and_double_claim() {
        let mut game = phase_game();
        mark_all(&mut game, Color::Red, &[(0, 0), (0, 1), (0, 2)]);

        assert_eq!(game.mark_cell(pos(0, 3), Color::Red), Err(GameError::RowLimitExceeded));
        assert_eq!(game.red_row_marks[0], 3);

        mark_all(&mut game, Color::Blue, &[(0, 0)]);
        assert_eq!(game.board.cell(pos(0, 0)).second_mark, Color::Blue);
        assert_eq!(game.mark_cell(pos(0, 0), Color::Blue), Err(GameError::AlreadyClaimed));
    }

    #[test]
    fn clearing_rolls_frontier_back_row_by_row() {
        let mut game = phase_game();
        mark_all(&mut game, Color::Red, &[(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert_eq!(game.red_unlocked_row, 2);

        game.clear_cell_mark(pos(1, 1), Color::Red).unwrap();
        assert_eq!(game.red_unlocked_row, 1);

        game.clear_cell_mark(pos(0, 1), Color::Red).unwrap();
        assert_eq!(game.red_unlocked_row, 0);
        assert_eq!(game.mark_cell(pos(1, 2), Color::Red), Err(GameError::RowLocked));
    }

    #[test]
    fn unmark_rolls_back_only_the_holders() {
        let mut game = phase_game();
        mark_all(&mut game, Color::Red, &[(0, 0), (0, 1)]);
        mark_all(&mut game, Color::Blue, &[(0, 2), (0, 3)]);

        game.unmark_cell(pos(0, 1)).unwrap();
        assert_eq!(game.red_unlocked_row, 0);
        assert_eq!(game.blue_unlocked_row, 1);
        assert_eq!(game.red_row_marks[0], 1);
    }

    #[test]
    fn unmark_shared_cell_releases_both_colors() {
        let mut game = phase_game();
        mark_all(&mut game, Color::Red, &[(0, 0), (0, 1)]);
        mark_all(&mut game, Color::Blue, &[(0, 0), (0, 2)]);

        game.unmark_cell(pos(0, 0)).unwrap();
        assert_eq!((game.red_row_marks[0], game.blue_row_marks[0]), (1, 1));
        assert_eq!((game.red_unlocked_row, game.blue_unlocked_row), (0, 0));
    }

    #[test]
    fn frontier_matches_row_counts_after_mixed_marks_and_clears() {
        let mut game = phase_game();
        mark_all(&mut game, Color::Red, &RED_LADDER);
        mark_all(&mut game, Color::Red, &[(4, 0)]);

        // Break row 0 while later rows stay complete
        game.clear_cell_mark(pos(0, 0), Color::Red).unwrap();
        assert_eq!(game.red_unlocked_row, expected_frontier(&game, Color::Red));
        assert_eq!(game.red_unlocked_row, 0);

        // Repairing row 0 reopens everything already earned
        mark_all(&mut game, Color::Red, &[(0, 4)]);
        assert_eq!(game.red_unlocked_row, expected_frontier(&game, Color::Red));
        assert_eq!(game.red_unlocked_row, LAST_ROW);

        game.unmark_cell(pos(2, 1)).unwrap();
        game.clear_cell_mark(pos(3, 0), Color::Red).unwrap();
        assert_eq!(game.red_unlocked_row, expected_frontier(&game, Color::Red));
        assert_eq!(game.red_unlocked_row, 2);
    }

    #[test]
    fn row_marks_never_exceed_twice_the_row_limit() {
        let mut game = phase_game();
        mark_all(&mut game, Color::Red, &[(0, 0), (0, 1), (0, 2)]);
        mark_all(&mut game, Color::Blue, &[(0, 0), (0, 1), (0, 2)]);
        let _ = game.mark_cell(pos(0, 3), Color::Red);
        let _ = game.mark_cell(pos(0, 4), Color::Blue);

        let limit = game.phase_config.cells_per_row;
        assert!(game.red_row_marks[0] + game.blue_row_marks[0] <= 2 * limit);
    }

    /// Red diagonal alongside the ladder needed to reach each row
    fn red_diagonal(game: &mut Game) {
        mark_all(
            game,
            Color::Red,
            &[(0, 0), (0, 1), (1, 1), (1, 2), (2, 2), (2, 3), (3, 3), (3, 4), (4, 4)],
        );
    }

    #[test]
    fn diagonal_bingo_is_recorded_once() {
        let mut game = phase_game();
        red_diagonal(&mut game);

        assert_eq!(game.bingo_achiever, Color::Red);
        assert_eq!(game.bingo_line, 5);
        assert_eq!(game.status, GameStatus::Playing);
    }

    #[test]
    fn clearing_bingo_cell_drops_bingo() {
        let mut game = phase_game();
        red_diagonal(&mut game);

        game.clear_cell_mark(pos(2, 2), Color::Red).unwrap();
        assert_eq!(game.bingo_achiever, Color::None);
        assert_eq!(game.bingo_line, -1);
    }

    #[test]
    fn clearing_bingo_cell_transfers_to_existing_line() {
        let mut game = phase_game();
        red_diagonal(&mut game);
        mark_all(
            &mut game,
            Color::Blue,
            &[(0, 0), (0, 2), (1, 0), (1, 3), (2, 0), (2, 4), (3, 0), (3, 1), (4, 0)],
        );
        assert_eq!((game.bingo_achiever, game.bingo_line), (Color::Red, 5));

        game.unmark_cell(pos(2, 2)).unwrap();
        assert_eq!((game.bingo_achiever, game.bingo_line), (Color::Blue, 0));
    }

    #[test]
    fn rows_never_count_for_bingo() {
        let config = PhaseConfig {
            cells_per_row: 5,
            ..PhaseConfig::default()
        };
        let mut game = Game::with_config(Rule::Phase, config);
        game.start().unwrap();
        mark_all(&mut game, Color::Blue, &[(0, 0), (0, 1), (0, 2), (0, 3), (0, 4)]);

        assert_eq!(game.bingo_achiever, Color::None);
    }

    #[test]
    fn second_settler_needs_no_last_row_marks() {
        let mut game = phase_game();
        mark_all(&mut game, Color::Red, &RED_LADDER);
        mark_all(&mut game, Color::Red, &[(4, 0), (4, 1)]);

        game.settle(Color::Red).unwrap();
        assert!(game.red_settled);
        assert_eq!(game.first_settler, Color::Red);
        assert_eq!(game.status, GameStatus::Playing);

        game.settle(Color::Blue).unwrap();
        assert!(game.blue_settled);
        assert_eq!(game.status, GameStatus::Finished);

        let winner = game.winner.clone().unwrap();
        assert_eq!(winner.reason, WinReason::Phase);
        assert_eq!(winner.winner, Color::Red);
    }

    #[test]
    fn first_settler_needs_two_last_row_marks() {
        let mut game = phase_game();
        mark_all(&mut game, Color::Red, &RED_LADDER);
        mark_all(&mut game, Color::Red, &[(4, 0)]);

        assert_eq!(game.settle(Color::Red), Err(GameError::CannotSettleYet));
        assert!(!game.red_settled);
        assert_eq!(game.first_settler, Color::None);
    }

    #[test]
    fn settling_twice_is_rejected() {
        let mut game = phase_game();
        mark_all(&mut game, Color::Blue, &BLUE_LADDER);
        mark_all(&mut game, Color::Blue, &[(4, 2), (4, 3)]);

        game.settle(Color::Blue).unwrap();
        assert_eq!(game.settle(Color::Blue), Err(GameError::AlreadySettled));
    }

    #[test]
    fn settle_outside_phase_rule_is_unavailable() {
        let mut game = Game::new(Rule::Normal);
        game.start().unwrap();
        assert_eq!(game.settle(Color::Red), Err(GameError::SettlementUnavailable));
    }

    #[test]
    fn scores_primary_secondary_and_bonuses() {
        let mut game = phase_game();
        mark_all(&mut game, Color::Red, &RED_LADDER);
        mark_all(&mut game, Color::Red, &[(4, 2), (4, 3)]);
        mark_all(&mut game, Color::Blue, &[(0, 0), (0, 2)]);
        assert_eq!(game.bingo_achiever, Color::None);

        // red: rows 0-3 two primaries each (2+2+4+4)*2 = 24, row 4: 6*2 = 12
        // blue: (0,0) secondary 1, (0,2) primary 2
        assert_eq!(game.phase_scores(), (36, 3));

        game.settle(Color::Red).unwrap();
        game.settle(Color::Blue).unwrap();
        let winner = game.winner.clone().unwrap();
        assert_eq!((winner.red_score, winner.blue_score), (39, 3));
    }

    #[test]
    fn tie_goes_to_first_settler() {
        let config = PhaseConfig {
            row_scores: [0; BOARD_SIZE],
            second_half_scores: [0; BOARD_SIZE],
            bingo_bonus: 0,
            final_bonus: 0,
            ..PhaseConfig::default()
        };
        let mut game = Game::with_config(Rule::Phase, config);
        game.start().unwrap();
        mark_all(&mut game, Color::Blue, &BLUE_LADDER);
        mark_all(&mut game, Color::Blue, &[(4, 2), (4, 3)]);

        game.settle(Color::Blue).unwrap();
        game.settle(Color::Red).unwrap();
        let winner = game.winner.clone().unwrap();
        assert_eq!((winner.red_score, winner.blue_score), (0, 0));
        assert_eq!(winner.winner, Color::Blue);
    }

    #[test]
    fn settled_game_rejects_corrections() {
        let mut game = phase_game();
        mark_all(&mut game, Color::Red, &RED_LADDER);
        mark_all(&mut game, Color::Red, &[(4, 0), (4, 1)]);
        game.settle(Color::Red).unwrap();
        game.settle(Color::Blue).unwrap();

        assert_eq!(game.unmark_cell(pos(0, 0)), Err(GameError::AlreadyFinished));
        assert_eq!(
            game.clear_cell_mark(pos(0, 0), Color::Red),
            Err(GameError::AlreadyFinished)
        );
    }
}
