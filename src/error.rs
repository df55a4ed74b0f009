//! Error taxonomy reported to clients

use serde::Serialize;

/// Coarse class of a rejected operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed frame or payload, out-of-range coordinates
    Validation,
    /// Wrong role, not the owner, wrong color
    Authorization,
    /// Operation not allowed in the current room or game state
    State,
    /// Unknown room or user
    NotFound,
    /// Server-side failure unrelated to the request
    Internal,
}
