//! Role-based permission checks for room operations
//!
//! Every room operation asks [`authorize`] before touching the game, so the
//! full permission table lives here.

use crate::game::{Color, Rule};
use crate::user::Role;

use super::RoomError;

/// Who is asking
#[derive(Debug, Clone, Copy)]
pub struct Caller<'a> {
    pub id: &'a str,
    pub role: Role,
    pub color: Color,
    pub is_owner: bool,
}

/// What they are asking for
#[derive(Debug, Clone, Copy)]
pub enum Action<'a> {
    /// Password, rule, start, reset and cell texts
    ManageRoom,
    SetRole { target: &'a str },
    Mark { color: Color },
    Unmark,
    ClearMark { color: Color },
    Settle { color: Color },
}

/// How an allowed action should be carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permit {
    Granted,
    /// Referee mark under the normal rule: overwrite the cell
    ForceMark,
}

pub fn authorize(caller: &Caller<'_>, action: Action<'_>, rule: Rule) -> Result<Permit, RoomError> {
    match action {
        Action::ManageRoom => {
            if caller.is_owner {
                Ok(Permit::Granted)
            } else {
                Err(RoomError::NotOwner)
            }
        }
        Action::SetRole { target } => {
            if caller.is_owner || caller.id == target {
                Ok(Permit::Granted)
            } else {
                Err(RoomError::NotOwner)
            }
        }
        Action::Mark { color } => {
            act_for_color(caller, color)?;
            // Referees overwrite under the normal rule but take the same
            // constrained path as players under blackout and phase.
            if caller.role == Role::Referee && rule == Rule::Normal {
                Ok(Permit::ForceMark)
            } else {
                Ok(Permit::Granted)
            }
        }
        Action::Unmark => match caller.role {
            Role::Referee => Ok(Permit::Granted),
            _ => Err(RoomError::NotReferee),
        },
        Action::ClearMark { color } | Action::Settle { color } => {
            act_for_color(caller, color)?;
            Ok(Permit::Granted)
        }
    }
}

/// Spectators never act; players only for their own color
fn act_for_color(caller: &Caller<'_>, color: Color) -> Result<(), RoomError> {
    match caller.role {
        Role::Spectator => Err(RoomError::SpectatorForbidden),
        Role::Player if caller.color != color => Err(RoomError::WrongColor),
        Role::Player | Role::Referee => Ok(()),
    }
}
