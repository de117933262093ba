//! Command catalog and payload schemas

use crate::envelope::CommandEnvelope;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Liveness check, answered with `pong`
pub const PING: &str = "ping";
/// Long names of the current scene selection
pub const GET_SELECTION: &str = "get_selection";
/// World-space transform of one object
pub const GET_TRANSFORM: &str = "get_transform";
/// Pushed by the server after a geometry-cache export completes
pub const IMPORT_ALEMBIC: &str = "import_alembic";

/// How the editor should resolve materials referenced by the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaterialImportMethod {
    /// Bind to materials that already exist in the project
    #[default]
    Find,
    /// Create new material assets during import
    Create,
}

impl MaterialImportMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            MaterialImportMethod::Find => "find",
            MaterialImportMethod::Create => "create",
        }
    }
}

/// World-space transform triple
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: [f64; 3],
    pub rotation: [f64; 3],
    pub scale: [f64; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translation: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
        }
    }
}

/// Parameters for `get_transform`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetTransformParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
}

/// Payload of the `import_alembic` push
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportAlembic {
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub objects: Vec<String>,
    #[serde(default)]
    pub material_import_method: MaterialImportMethod,
}

impl ImportAlembic {
    /// Build the push notification (no correlation id)
    pub fn to_envelope(&self) -> Result<CommandEnvelope> {
        CommandEnvelope::new(IMPORT_ALEMBIC).with_params(self)
    }

    pub fn from_envelope(envelope: &CommandEnvelope) -> Result<Self> {
        envelope.parse_params()
    }
}
