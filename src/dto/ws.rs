use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::model::{GameMode, MainGame};

/// Reason reported for a `nack` that carried none.
pub const GENERIC_NACK_REASON: &str = "nack";

/// Command tags understood on the client wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum CommandTag {
    Hello,
    Ping,
    Start,
    Pause,
    Swap,
    Ack,
    Nack,
    Status,
    GamesUpdate,
    GamesUpdateAck,
    StateUpdate,
    ClearSaves,
    Reset,
    #[serde(other)]
    Unknown,
}

/// Envelope wrapping every message exchanged with emulator clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Envelope {
    /// Command tag.
    pub cmd: CommandTag,
    /// Tag-specific body, `null` when absent.
    #[serde(default)]
    #[schema(value_type = Object)]
    pub payload: Value,
    /// Correlation key; advisory for commands that expect no reply.
    #[serde(default)]
    pub id: String,
}

impl Envelope {
    /// Build an outbound command with a fresh correlation id.
    pub fn command<T: Serialize>(cmd: CommandTag, payload: &T) -> serde_json::Result<Self> {
        Ok(Self {
            cmd,
            payload: serde_json::to_value(payload)?,
            id: Uuid::new_v4().simple().to_string(),
        })
    }

    /// Build an outbound command without payload.
    pub fn bare(cmd: CommandTag) -> Self {
        Self {
            cmd,
            payload: Value::Null,
            id: Uuid::new_v4().simple().to_string(),
        }
    }

    /// Decode one text frame.
    pub fn from_json_str(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Decode the payload into a typed structure.
    pub fn payload_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(&self.payload)
    }

    /// Reason carried by a `nack`, either as a bare string or a `reason` field.
    pub fn nack_reason(&self) -> String {
        match &self.payload {
            Value::String(reason) if !reason.is_empty() => reason.clone(),
            Value::Object(map) => map
                .get("reason")
                .and_then(Value::as_str)
                .filter(|reason| !reason.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| GENERIC_NACK_REASON.to_string()),
            _ => GENERIC_NACK_REASON.to_string(),
        }
    }
}

/// Handshake payload announcing the player's name.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct HelloPayload {
    pub name: String,
}

/// Payload of `start` and `swap`: what to play next. Empty `game` means stop.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, ToSchema)]
pub struct AssignmentPayload {
    pub game: String,
    #[serde(default)]
    pub instance_id: String,
}

/// Catalog snapshot pushed on connect and after catalog edits.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct GamesUpdatePayload {
    pub games: Vec<String>,
    pub main_games: Vec<MainGame>,
}

/// Client report on whether the static game assets are present.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct GamesUpdateAckPayload {
    #[serde(default)]
    pub has_files: bool,
}

/// Session summary pushed after control changes.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct StateUpdatePayload {
    pub running: bool,
    pub swap_enabled: bool,
    pub mode: GameMode,
    pub next_swap_at: i64,
    pub updated_at: i64,
    pub completed_games: Vec<String>,
    pub completed_instances: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_tags_decode_to_unknown() {
        let envelope = Envelope::from_json_str(r#"{"cmd":"dance","payload":{},"id":"1"}"#).unwrap();
        assert_eq!(envelope.cmd, CommandTag::Unknown);
    }

    #[test]
    fn payload_and_id_are_optional() {
        let envelope = Envelope::from_json_str(r#"{"cmd":"ack"}"#).unwrap();
        assert_eq!(envelope.cmd, CommandTag::Ack);
        assert!(envelope.id.is_empty());
        assert_eq!(envelope.payload, Value::Null);
    }

    #[test]
    fn nack_reason_reads_string_or_object() {
        let mut envelope = Envelope::bare(CommandTag::Nack);
        assert_eq!(envelope.nack_reason(), GENERIC_NACK_REASON);

        envelope.payload = json!("rom missing");
        assert_eq!(envelope.nack_reason(), "rom missing");

        envelope.payload = json!({ "reason": "busy" });
        assert_eq!(envelope.nack_reason(), "busy");

        envelope.payload = json!({ "other": 1 });
        assert_eq!(envelope.nack_reason(), GENERIC_NACK_REASON);
    }

    #[test]
    fn outbound_commands_get_distinct_ids() {
        let payload = AssignmentPayload {
            game: "a.nes".into(),
            instance_id: String::new(),
        };
        let first = Envelope::command(CommandTag::Swap, &payload).unwrap();
        let second = Envelope::command(CommandTag::Swap, &payload).unwrap();
        assert_ne!(first.id, second.id);

        let text = serde_json::to_string(&first).unwrap();
        assert!(text.contains(r#""cmd":"swap""#));
        assert!(text.contains(r#""game":"a.nes""#));
    }
}
