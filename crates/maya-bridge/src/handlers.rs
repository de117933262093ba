//! Command handlers for the live link server

use crate::host::SceneHost;
use dcc_bridge::MainThread;
use dcc_link_core::commands::{self, GetTransformParams};
use dcc_link_core::{CommandEnvelope, CommandId, ResponseEnvelope, Result, Transform};
use serde_json::Value;
use tracing::{debug, error, warn};

/// Decode one frame, run its handler and build the reply.
///
/// Never fails: malformed input, unknown commands, handler errors and
/// handler panics all come back as `status: error` responses.
pub async fn handle_frame<H: SceneHost>(frame: &[u8], main_thread: &MainThread<H>) -> ResponseEnvelope {
    let value: Value = match serde_json::from_slice(frame) {
        Ok(value) => value,
        Err(e) => {
            warn!("Received invalid JSON: {}", e);
            return ResponseEnvelope::error(None, "Invalid JSON format");
        }
    };

    // Salvage the id before strict decoding so envelope errors still correlate
    let salvaged_id = value.get("id").and_then(Value::as_u64);
    let envelope: CommandEnvelope = match serde_json::from_value(value) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!("Rejected command envelope: {}", e);
            return ResponseEnvelope::error(salvaged_id, format!("Invalid command envelope: {}", e));
        }
    };

    let id = envelope.id;
    let command = envelope.command.clone();
    let main_thread = main_thread.clone();

    // Own task so a panicking handler cannot take the connection down with it
    let outcome = tokio::spawn(async move { dispatch(envelope, &main_thread).await }).await;

    match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            error!("Error processing '{}': {:?}", command, e);
            ResponseEnvelope::error(id, e.to_string())
        }
        Err(join_error) => {
            let reason = match join_error.try_into_panic() {
                Ok(panic) => panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".into()),
                Err(join_error) => join_error.to_string(),
            };
            error!("Handler for '{}' panicked: {}", command, reason);
            ResponseEnvelope::error(
                id,
                format!("Internal error while handling '{}': {}", command, reason),
            )
        }
    }
}

async fn dispatch<H: SceneHost>(envelope: CommandEnvelope, main_thread: &MainThread<H>) -> Result<ResponseEnvelope> {
    let id = envelope.id;
    debug!("Dispatching '{}' (ID: {:?})", envelope.command, id);

    match envelope.command.as_str() {
        commands::PING => Ok(ResponseEnvelope::ok(id).with_message("pong")),
        commands::GET_SELECTION => get_selection(id, main_thread).await,
        commands::GET_TRANSFORM => {
            let params: GetTransformParams = envelope.parse_params()?;
            get_transform(id, params, main_thread).await
        }
        other => Ok(ResponseEnvelope::error(id, format!("Unknown command: {}", other))),
    }
}

async fn get_selection<H: SceneHost>(id: Option<CommandId>, main_thread: &MainThread<H>) -> Result<ResponseEnvelope> {
    let selection = main_thread
        .call(|host: &mut H| -> Result<Vec<String>> {
            let selected = host.selection()?;
            Ok(selected
                .into_iter()
                .map(|name| match host.long_name(&name) {
                    Ok(Some(long_name)) => long_name,
                    Ok(None) => name,
                    Err(e) => {
                        debug!("Falling back to short name for '{}': {}", name, e);
                        name
                    }
                })
                .collect())
        })
        .await?;

    match selection {
        Ok(selection) => {
            debug!("Selected objects: {:?}", selection);
            Ok(ResponseEnvelope::ok(id).with_field("selection", selection))
        }
        Err(e) => {
            warn!("Error getting selection: {}", e);
            Ok(ResponseEnvelope::error(id, format!("Could not get selection: {}", e)))
        }
    }
}

async fn get_transform<H: SceneHost>(
    id: Option<CommandId>,
    params: GetTransformParams,
    main_thread: &MainThread<H>,
) -> Result<ResponseEnvelope> {
    let Some(object) = params.object.filter(|name| !name.is_empty()) else {
        return Ok(ResponseEnvelope::error(id, "Missing 'object' parameter"));
    };

    let name = object.clone();
    let lookup = main_thread
        .call(move |host: &mut H| -> Result<Option<Transform>> {
            if !host.object_exists(&name) {
                return Ok(None);
            }
            host.world_transform(&name).map(Some)
        })
        .await?;

    match lookup {
        Ok(Some(transform)) => Ok(ResponseEnvelope::ok(id).with_field("transform", transform)),
        Ok(None) => Ok(ResponseEnvelope::error(id, format!("Object '{}' not found", object))),
        Err(e) => {
            warn!("Error querying transform of '{}': {}", object, e);
            Ok(ResponseEnvelope::error(
                id,
                format!("Could not get transform of '{}': {}", object, e),
            ))
        }
    }
}
