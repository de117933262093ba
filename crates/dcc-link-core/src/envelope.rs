//! Command and response envelopes
//!
//! Every message on the wire is a single JSON object. Requests and pushed
//! notifications carry a `command` field; replies carry a `status` field.
//!
//! ```text
//! {"command": "get_transform", "id": 2, "object": "|pCube1"}
//! {"status": "ok", "id": 2, "transform": {...}}
//! ```

use crate::error::{LinkError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Client-assigned correlation id
pub type CommandId = u64;

/// Outbound action with optional correlation id and command-specific fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CommandId>,
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

impl CommandEnvelope {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            id: None,
            params: Map::new(),
        }
    }

    pub fn with_id(mut self, id: CommandId) -> Self {
        self.id = Some(id);
        self
    }

    /// Merge fields from a serializable value into the envelope.
    ///
    /// `null` adds nothing. Anything other than an object is rejected. The
    /// `command` and `id` keys are owned by the envelope and are never
    /// overwritten by params.
    pub fn with_params<P: Serialize>(mut self, params: P) -> Result<Self> {
        match serde_json::to_value(params)? {
            Value::Null => {}
            Value::Object(fields) => {
                for (key, value) in fields {
                    if key == "command" || key == "id" {
                        continue;
                    }
                    self.params.insert(key, value);
                }
            }
            other => {
                return Err(LinkError::Protocol(format!(
                    "Command params must be a JSON object, got {}",
                    other
                )));
            }
        }
        Ok(self)
    }

    /// Decode the command-specific fields into a typed payload
    pub fn parse_params<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::Object(self.params.clone())).map_err(Into::into)
    }
}

/// Response status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Error,
}

/// Reply to a command, echoing its id when one was given
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CommandId>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl ResponseEnvelope {
    pub fn ok(id: Option<CommandId>) -> Self {
        Self {
            status: Status::Ok,
            message: None,
            id,
            fields: Map::new(),
        }
    }

    pub fn error(id: Option<CommandId>, message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: Some(message.into()),
            id,
            fields: Map::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach a result field. Serialization failures become error responses.
    pub fn with_field<T: Serialize>(mut self, key: &str, value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => {
                self.fields.insert(key.to_string(), value);
                self
            }
            Err(e) => Self::error(self.id, format!("Failed to encode '{}': {}", key, e)),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// A decoded inbound message, classified by its discriminating field
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Command(CommandEnvelope),
    Response(ResponseEnvelope),
}

impl Inbound {
    /// Parse one JSON document.
    ///
    /// A `command` field wins over a `status` field. Objects carrying neither
    /// are protocol errors.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        let (has_command, has_status) = match &value {
            Value::Object(object) => (object.contains_key("command"), object.contains_key("status")),
            other => {
                return Err(LinkError::Protocol(format!(
                    "Expected a JSON object, got {}",
                    other
                )));
            }
        };

        if has_command {
            Ok(Inbound::Command(serde_json::from_value(value)?))
        } else if has_status {
            Ok(Inbound::Response(serde_json::from_value(value)?))
        } else {
            Err(LinkError::Protocol(
                "Message has neither a 'command' nor a 'status' field".into(),
            ))
        }
    }
}
