//! Routes decoded client messages to the registries and rooms
//!
//! Every handler runs to completion synchronously. Room locks are taken and
//! released inside room methods. Each change and its publication (persistence
//! enqueue, then broadcast) run under the room's publish lock, so members and
//! the store see states in the order they committed.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::app::AppState;
use crate::error::ErrorKind;
use crate::game::{GameError, PhaseConfig, Position};
use crate::room::{Room, RoomError, RoomId};
use crate::user::User;

use super::protocol::{ClientMsg, ServerMsg, SetCellTextPayload};

/// Errors answered to the requesting connection only
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("invalid message format: {0}")]
    InvalidFrame(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("invalid payload for {msg_type}: {reason}")]
    InvalidPayload { msg_type: String, reason: String },

    #[error("name cannot be empty")]
    EmptyName,

    #[error("cannot change name while in a room")]
    NameLocked,

    #[error("not in a room")]
    NotInRoom,

    #[error("room not found")]
    RoomNotFound,

    #[error("too many messages, slow down")]
    RateLimited,

    #[error("internal server error")]
    Internal,

    #[error(transparent)]
    Room(#[from] RoomError),
}

impl From<GameError> for DispatchError {
    fn from(e: GameError) -> Self {
        DispatchError::Room(RoomError::Game(e))
    }
}

impl DispatchError {
    pub fn code(&self) -> &'static str {
        match self {
            DispatchError::InvalidFrame(_) => "invalid_frame",
            DispatchError::UnknownType(_) => "unknown_type",
            DispatchError::InvalidPayload { .. } => "invalid_payload",
            DispatchError::EmptyName => "empty_name",
            DispatchError::NameLocked => "name_locked",
            DispatchError::NotInRoom => "not_in_room",
            DispatchError::RoomNotFound => "room_not_found",
            DispatchError::RateLimited => "rate_limited",
            DispatchError::Internal => "internal",
            DispatchError::Room(e) => e.code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            DispatchError::InvalidFrame(_)
            | DispatchError::UnknownType(_)
            | DispatchError::InvalidPayload { .. }
            | DispatchError::EmptyName => ErrorKind::Validation,
            DispatchError::NameLocked | DispatchError::NotInRoom | DispatchError::RateLimited => {
                ErrorKind::State
            }
            DispatchError::RoomNotFound => ErrorKind::NotFound,
            DispatchError::Internal => ErrorKind::Internal,
            DispatchError::Room(e) => e.kind(),
        }
    }
}

/// Register a new connection and greet it
pub fn connect(state: &AppState, tx: mpsc::Sender<String>) -> User {
    let user = state.users.register();
    state.hub.attach(&user.id, tx);
    state.hub.send(
        &user.id,
        &ServerMsg::Connected {
            user_id: &user.id,
            user_name: &user.name,
        },
    );
    info!(user_id = %user.id, "User connected");
    user
}

/// Decode and dispatch one frame, answering any failure to the caller
pub fn handle_frame(state: &AppState, user_id: &str, frame: &str) {
    let result = ClientMsg::decode(frame).and_then(|msg| {
        let msg_type = msg.name();
        dispatch(state, user_id, msg).map_err(|e| {
            debug!(user_id = %user_id, msg_type, error = %e, "Rejected message");
            e
        })
    });
    if let Err(e) = result {
        reject(state, user_id, &e);
    }
}

/// Send an error to one connection
pub fn reject(state: &AppState, user_id: &str, err: &DispatchError) {
    state.hub.send(user_id, &ServerMsg::error(err));
}

pub fn dispatch(state: &AppState, user_id: &str, msg: ClientMsg) -> Result<(), DispatchError> {
    match msg {
        ClientMsg::SetName(payload) => set_name(state, user_id, payload.name),
        ClientMsg::CreateRoom(payload) => {
            leave_current_room(state, user_id);
            if let Some(name) = payload.user_name {
                rename_if_given(state, user_id, name);
            }
            create_room(state, user_id, payload.name, payload.password)
        }
        ClientMsg::JoinRoom(payload) => {
            join_room(state, user_id, &payload.room_id, &payload.password, payload.user_name)
        }
        ClientMsg::LeaveRoom => {
            let room_id = leave_current_room(state, user_id).ok_or(DispatchError::NotInRoom)?;
            state.hub.send(user_id, &ServerMsg::Left { room_id: &room_id });
            Ok(())
        }
        ClientMsg::ListRooms => {
            let rooms = state.rooms.list();
            state.hub.send(user_id, &ServerMsg::RoomList { rooms: &rooms });
            Ok(())
        }
        ClientMsg::SetRole(payload) => {
            let room = current_room(state, user_id)?;
            let target = payload.target_user_id.as_deref().unwrap_or(user_id);
            apply(state, &room, Commit::Broadcast, |room| {
                room.set_user_role(user_id, target, payload.role, payload.player_color)
            })
        }
        ClientMsg::SetPassword(payload) => {
            let room = current_room(state, user_id)?;
            apply(state, &room, Commit::Persist, |room| {
                room.set_password(user_id, payload.password)
            })
        }
        ClientMsg::SetRule(payload) => {
            let room = current_room(state, user_id)?;
            let config = PhaseConfig::default().with_overrides(&payload.phase_config);
            apply(state, &room, Commit::Persist, |room| {
                room.set_game_rule(user_id, payload.rule, config)
            })
        }
        ClientMsg::StartGame => {
            let room = current_room(state, user_id)?;
            apply(state, &room, Commit::Persist, |room| room.start_game(user_id))
        }
        ClientMsg::ResetGame => {
            let room = current_room(state, user_id)?;
            apply(state, &room, Commit::Persist, |room| room.reset_game(user_id))
        }
        ClientMsg::MarkCell(p) => {
            let room = current_room(state, user_id)?;
            let pos = Position::new(p.row, p.col)?;
            apply(state, &room, Commit::Persist, |room| room.mark_cell(user_id, pos, p.color))
        }
        ClientMsg::UnmarkCell(p) => {
            let room = current_room(state, user_id)?;
            let pos = Position::new(p.row, p.col)?;
            apply(state, &room, Commit::Persist, |room| room.unmark_cell(user_id, pos))
        }
        ClientMsg::ClearCellMark(p) => {
            let room = current_room(state, user_id)?;
            let pos = Position::new(p.row, p.col)?;
            apply(state, &room, Commit::Persist, |room| room.clear_cell_mark(user_id, pos, p.color))
        }
        ClientMsg::SetCellText(payload) => {
            let room = current_room(state, user_id)?;
            apply(state, &room, Commit::Persist, |room| set_cell_text(room, user_id, payload))
        }
        ClientMsg::Settle(payload) => {
            let room = current_room(state, user_id)?;
            apply(state, &room, Commit::Persist, |room| room.settle(user_id, payload.player))
        }
    }
}

/// Remove a closed connection from its room and the registries
pub fn disconnect(state: &AppState, user_id: &str) {
    leave_current_room(state, user_id);
    state.users.remove(user_id);
    state.hub.detach(user_id);
    info!(user_id = %user_id, "User disconnected");
}

fn set_name(state: &AppState, user_id: &str, name: String) -> Result<(), DispatchError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DispatchError::EmptyName);
    }
    let user = state
        .users
        .get(user_id)
        .ok_or(RoomError::UserNotFound)?;
    if user.in_room() {
        return Err(DispatchError::NameLocked);
    }

    state.users.rename(user_id, name.to_string());
    state.hub.send(user_id, &ServerMsg::NameSet { user_name: name });
    Ok(())
}

/// Apply the optional `user_name` of create/join. Only called while the
/// user is in the lobby; blank names are ignored.
fn rename_if_given(state: &AppState, user_id: &str, name: String) {
    let name = name.trim();
    if !name.is_empty() {
        state.users.rename(user_id, name.to_string());
    }
}

fn create_room(
    state: &AppState,
    user_id: &str,
    name: String,
    password: String,
) -> Result<(), DispatchError> {
    let user = state.users.get(user_id).ok_or(RoomError::UserNotFound)?;
    let room = state.rooms.create(name.trim().to_string(), password);
    let _publish = room.publish_lock();
    room.add_user(&user)?;
    state.users.set_room(user_id, room.id().to_string());
    info!(user_id = %user_id, room_id = %room.id(), "Room created");

    state.persistence.save(room.record());
    state.hub.announce_join(&room.snapshot(), user_id);
    Ok(())
}

fn join_room(
    state: &AppState,
    user_id: &str,
    room_id: &str,
    password: &str,
    user_name: Option<String>,
) -> Result<(), DispatchError> {
    let room = state.rooms.get(room_id).ok_or(DispatchError::RoomNotFound)?;
    let user = state.users.get(user_id).ok_or(RoomError::UserNotFound)?;

    if user.room_id.as_deref() == Some(room_id) {
        let _publish = room.publish_lock();
        let snapshot = room.snapshot();
        state.hub.send(user_id, &ServerMsg::Joined(snapshot.view_for(user_id)));
        return Ok(());
    }
    if !room.check_password(password) {
        return Err(RoomError::WrongPassword.into());
    }

    leave_current_room(state, user_id);
    if let Some(name) = user_name {
        rename_if_given(state, user_id, name);
    }
    let user = state.users.get(user_id).ok_or(RoomError::UserNotFound)?;
    // Taken after leaving the previous room: publish locks never nest
    let _publish = room.publish_lock();
    room.join(&user, password).map_err(|e| match e {
        RoomError::RoomClosed => DispatchError::RoomNotFound,
        other => other.into(),
    })?;
    state.users.set_room(user_id, room.id().to_string());
    info!(user_id = %user_id, room_id = %room_id, "User joined room");

    state.hub.announce_join(&room.snapshot(), user_id);
    Ok(())
}

fn set_cell_text(room: &Room, user_id: &str, payload: SetCellTextPayload) -> Result<(), DispatchError> {
    match payload {
        SetCellTextPayload {
            texts: Some(texts), ..
        } => room.set_all_cell_texts(user_id, texts)?,
        SetCellTextPayload {
            row: Some(row),
            col: Some(col),
            text,
            ..
        } => room.set_cell_text(user_id, Position::new(row, col)?, text.unwrap_or_default())?,
        _ => {
            return Err(DispatchError::InvalidPayload {
                msg_type: "set_cell_text".to_string(),
                reason: "expected row, col and text, or texts".to_string(),
            })
        }
    }
    Ok(())
}

/// The caller's current room
fn current_room(state: &AppState, user_id: &str) -> Result<Arc<Room>, DispatchError> {
    let user = state.users.get(user_id).ok_or(RoomError::UserNotFound)?;
    let room_id = user.room_id.ok_or(DispatchError::NotInRoom)?;
    state.rooms.get(&room_id).ok_or(DispatchError::RoomNotFound)
}

/// Take the user out of whatever room they are in and tell the remaining
/// members. Returns the room left, if any.
fn leave_current_room(state: &AppState, user_id: &str) -> Option<RoomId> {
    let room_id = state.users.get(user_id)?.room_id?;
    state.users.clear_room(user_id);

    let room = state.rooms.get(&room_id)?;
    let _publish = room.publish_lock();
    let departure = room.remove_user(user_id)?;
    info!(user_id = %user_id, room_id = %room_id, remaining = departure.remaining, "User left room");

    if departure.remaining == 0 {
        debug!(room_id = %room_id, "Room is empty, awaiting idle sweep");
    } else {
        if let Some(owner) = &departure.new_owner {
            info!(room_id = %room_id, new_owner = %owner, "Room ownership transferred");
        }
        publish(state, &room, Commit::Broadcast);
    }
    Some(room_id)
}

/// What changed in a successful room operation
enum Commit {
    /// Game or room settings: persist, then broadcast
    Persist,
    /// Roles or membership, which are never stored: broadcast only
    Broadcast,
}

/// Run `op` against the room and publish the result, all under the room's
/// publish lock. Nothing is published when `op` fails.
fn apply<E>(
    state: &AppState,
    room: &Room,
    change: Commit,
    op: impl FnOnce(&Room) -> Result<(), E>,
) -> Result<(), DispatchError>
where
    DispatchError: From<E>,
{
    let _publish = room.publish_lock();
    op(room)?;
    publish(state, room, change);
    Ok(())
}

/// Persist and broadcast the room's current state. The caller holds the
/// publish lock.
fn publish(state: &AppState, room: &Room, change: Commit) {
    let snapshot = room.snapshot();
    if let Commit::Persist = change {
        state.persistence.save(room.record());
    }
    state.hub.broadcast_state(&snapshot);
}
