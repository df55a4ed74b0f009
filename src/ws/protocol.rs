//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorKind;
use crate::game::{Color, PhaseConfigPatch, Rule};
use crate::room::{RoomInfo, StateView};
use crate::user::Role;

use super::dispatch::DispatchError;

/// Current protocol version. Clients must connect with exactly this value.
pub const PROTOCOL_VERSION: u32 = 1;

/// Inbound frame envelope
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(default)]
    pub room_id: Option<String>,
    /// Ignored; the connection's own identity is used
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMsg {
    SetName(SetNamePayload),
    CreateRoom(CreateRoomPayload),
    JoinRoom(JoinRoomPayload),
    LeaveRoom,
    ListRooms,
    SetRole(SetRolePayload),
    SetPassword(SetPasswordPayload),
    SetRule(SetRulePayload),
    StartGame,
    ResetGame,
    MarkCell(CellColorPayload),
    UnmarkCell(CellPayload),
    ClearCellMark(CellColorPayload),
    SetCellText(SetCellTextPayload),
    Settle(SettlePayload),
}

impl ClientMsg {
    /// Decode one frame: the envelope first, then the payload for its type
    pub fn decode(frame: &str) -> Result<Self, DispatchError> {
        let envelope: Envelope =
            serde_json::from_str(frame).map_err(|e| DispatchError::InvalidFrame(e.to_string()))?;
        Self::from_envelope(envelope)
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, DispatchError> {
        let Envelope {
            msg_type,
            room_id,
            payload,
            ..
        } = envelope;

        let msg = match msg_type.as_str() {
            "set_name" => ClientMsg::SetName(parse(&msg_type, payload)?),
            "create_room" => ClientMsg::CreateRoom(parse(&msg_type, payload)?),
            "join_room" => {
                let mut join: JoinRoomPayload = parse(&msg_type, payload)?;
                if join.room_id.is_empty() {
                    join.room_id = room_id.unwrap_or_default();
                }
                if join.room_id.is_empty() {
                    return Err(DispatchError::InvalidPayload {
                        msg_type,
                        reason: "missing room_id".to_string(),
                    });
                }
                ClientMsg::JoinRoom(join)
            }
            "leave_room" => ClientMsg::LeaveRoom,
            "list_rooms" => ClientMsg::ListRooms,
            "set_role" => ClientMsg::SetRole(parse(&msg_type, payload)?),
            "set_password" => ClientMsg::SetPassword(parse(&msg_type, payload)?),
            "set_rule" => ClientMsg::SetRule(parse(&msg_type, payload)?),
            "start_game" => ClientMsg::StartGame,
            "reset_game" => ClientMsg::ResetGame,
            "mark_cell" => ClientMsg::MarkCell(parse(&msg_type, payload)?),
            "unmark_cell" => ClientMsg::UnmarkCell(parse(&msg_type, payload)?),
            "clear_cell_mark" => ClientMsg::ClearCellMark(parse(&msg_type, payload)?),
            "set_cell_text" => ClientMsg::SetCellText(parse(&msg_type, payload)?),
            "settle" => ClientMsg::Settle(parse(&msg_type, payload)?),
            _ => return Err(DispatchError::UnknownType(msg_type)),
        };
        Ok(msg)
    }

    /// Wire name, for logging
    pub fn name(&self) -> &'static str {
        match self {
            ClientMsg::SetName(_) => "set_name",
            ClientMsg::CreateRoom(_) => "create_room",
            ClientMsg::JoinRoom(_) => "join_room",
            ClientMsg::LeaveRoom => "leave_room",
            ClientMsg::ListRooms => "list_rooms",
            ClientMsg::SetRole(_) => "set_role",
            ClientMsg::SetPassword(_) => "set_password",
            ClientMsg::SetRule(_) => "set_rule",
            ClientMsg::StartGame => "start_game",
            ClientMsg::ResetGame => "reset_game",
            ClientMsg::MarkCell(_) => "mark_cell",
            ClientMsg::UnmarkCell(_) => "unmark_cell",
            ClientMsg::ClearCellMark(_) => "clear_cell_mark",
            ClientMsg::SetCellText(_) => "set_cell_text",
            ClientMsg::Settle(_) => "settle",
        }
    }
}

fn parse<T: DeserializeOwned>(msg_type: &str, payload: Option<Value>) -> Result<T, DispatchError> {
    serde_json::from_value(payload.unwrap_or(Value::Null)).map_err(|e| {
        DispatchError::InvalidPayload {
            msg_type: msg_type.to_string(),
            reason: e.to_string(),
        }
    })
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetNamePayload {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateRoomPayload {
    pub name: String,
    #[serde(default)]
    pub password: String,
    /// Rename the caller before creating
    #[serde(default)]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JoinRoomPayload {
    #[serde(default)]
    pub room_id: String,
    #[serde(default)]
    pub password: String,
    /// Rename the caller before joining
    #[serde(default)]
    pub user_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetRolePayload {
    /// Defaults to the caller
    #[serde(default)]
    pub target_user_id: Option<String>,
    pub role: Role,
    #[serde(default)]
    pub player_color: Color,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetPasswordPayload {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetRulePayload {
    pub rule: Rule,
    #[serde(default)]
    pub phase_config: PhaseConfigPatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CellPayload {
    pub row: i64,
    pub col: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CellColorPayload {
    pub row: i64,
    pub col: i64,
    pub color: Color,
}

/// Either one cell (`row`, `col`, `text`) or the whole board (`texts`)
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetCellTextPayload {
    #[serde(default)]
    pub row: Option<i64>,
    #[serde(default)]
    pub col: Option<i64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub texts: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct SettlePayload {
    #[serde(alias = "color")]
    pub player: Color,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMsg<'a> {
    /// First frame on every connection
    Connected { user_id: &'a str, user_name: &'a str },

    NameSet { user_name: &'a str },

    /// Room state after a change, addressed to one member
    StateUpdate(StateView<'a>),

    /// Room state sent to a user who just entered the room
    Joined(StateView<'a>),

    RoomList { rooms: &'a [RoomInfo] },

    Left { room_id: &'a str },

    /// Error message
    Error {
        code: &'a str,
        kind: ErrorKind,
        message: String,
    },
}

impl ServerMsg<'_> {
    pub fn error(err: &DispatchError) -> ServerMsg<'static> {
        ServerMsg::Error {
            code: err.code(),
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
