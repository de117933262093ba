//! DCC live link diagnostic client
//!
//! Connects to a running animation-tool server the way the editor plugin
//! does and either issues one command or stays connected to watch for
//! import requests:
//!
//! ```text
//! dcc-link [--host H] [--port P] [--framing F] ping
//! dcc-link selection
//! dcc-link transform <object>
//! dcc-link watch [--dest /Game/Folder]
//! ```

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use dcc_link_core::commands;
use dcc_link_core::config::{DEFAULT_HOST, DEFAULT_PORT};
use dcc_link_core::{Framing, LinkConfig, ResponseEnvelope};
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use unreal_bridge::{AssetData, AssetImportTask, BridgeClient, EditorHost};

/// Stand-in for the editor's per-frame callback
const TICK_INTERVAL: Duration = Duration::from_millis(16);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_DESTINATION: &str = "/Game/LiveLink";

#[derive(Parser, Debug)]
#[command(name = "dcc-link")]
#[command(about = "Diagnostic client for the Maya to Unreal live link")]
struct Cli {
    /// Host the Maya server listens on
    #[arg(long, default_value = DEFAULT_HOST)]
    host: String,

    /// Port the Maya server listens on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Wire framing: length_prefixed, newline or unframed
    #[arg(long, default_value_t = Framing::LengthPrefixed)]
    framing: Framing,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn link_config(&self) -> LinkConfig {
        LinkConfig::new(self.host.clone(), self.port).with_framing(self.framing)
    }
}

#[derive(Subcommand, Debug, PartialEq)]
enum Command {
    /// Check that the server answers
    Ping,
    /// Print the current selection
    Selection,
    /// Print the world transform of an object
    Transform { object: String },
    /// Stay connected and dry-run incoming import requests
    Watch {
        /// Content folder imports would land in
        #[arg(long, default_value = DEFAULT_DESTINATION)]
        dest: String,
    },
}

/// Editor host that imports nothing and logs what it would do
struct DryRunEditor {
    destination: String,
}

impl EditorHost for DryRunEditor {
    fn selected_path_view_folders(&mut self) -> Vec<String> {
        vec![self.destination.clone()]
    }

    fn selected_folder_paths(&mut self) -> Vec<String> {
        Vec::new()
    }

    fn find_asset(&mut self, _asset_path: &str) -> Option<AssetData> {
        None
    }

    fn import_asset_tasks(&mut self, tasks: Vec<AssetImportTask>) -> dcc_link_core::Result<()> {
        for task in tasks {
            info!(
                "[dry run] import {} -> {} ({:?})",
                task.filename.display(),
                task.destination_path,
                task.options
            );
        }
        Ok(())
    }
}

/// Send one command and tick until its response arrives
async fn request(
    client: &BridgeClient,
    editor: &mut DryRunEditor,
    command: &str,
    params: Value,
) -> Result<ResponseEnvelope> {
    let (tx, mut rx) = oneshot::channel();
    client
        .send_command(
            command,
            params,
            Some(Box::new(move |response: &ResponseEnvelope| {
                let _ = tx.send(response.clone());
            })),
        )
        .await?;

    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let deadline = tokio::time::Instant::now() + RESPONSE_TIMEOUT;
    loop {
        ticker.tick().await;
        client.tick(editor);
        match rx.try_recv() {
            Ok(response) => return Ok(response),
            Err(oneshot::error::TryRecvError::Closed) => {
                bail!("connection closed before '{}' was answered", command)
            }
            Err(oneshot::error::TryRecvError::Empty) => {}
        }
        if tokio::time::Instant::now() >= deadline {
            bail!("no response to '{}' within {:?}", command, RESPONSE_TIMEOUT);
        }
    }
}

async fn watch(client: &BridgeClient, editor: &mut DryRunEditor) -> Result<()> {
    info!(
        "Watching for import requests (destination {}); Ctrl-C to stop",
        editor.destination
    );
    let mut ticker = tokio::time::interval(TICK_INTERVAL);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                client.tick(editor);
                if !client.is_connected() {
                    warn!("Connection to Maya lost");
                    return Ok(());
                }
            }
            _ = &mut ctrl_c => {
                client.disconnect();
                client.tick(editor);
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let cli = Cli::parse();
    let destination = match &cli.command {
        Command::Watch { dest } => dest.clone(),
        _ => DEFAULT_DESTINATION.to_string(),
    };
    let mut editor = DryRunEditor { destination };

    let client = BridgeClient::new(cli.link_config());
    client
        .connect()
        .await
        .with_context(|| format!("could not reach Maya at {}", client.config().address()))?;

    let response = match cli.command {
        Command::Watch { .. } => {
            watch(&client, &mut editor).await?;
            client.shutdown();
            return Ok(());
        }
        Command::Ping => request(&client, &mut editor, commands::PING, Value::Null).await?,
        Command::Selection => {
            request(&client, &mut editor, commands::GET_SELECTION, Value::Null).await?
        }
        Command::Transform { object } => {
            request(
                &client,
                &mut editor,
                commands::GET_TRANSFORM,
                json!({ "object": object }),
            )
            .await?
        }
    };

    client.shutdown();
    println!("{}", serde_json::to_string_pretty(&response)?);
    if !response.is_ok() {
        bail!(
            "{}",
            response.message.as_deref().unwrap_or("command failed")
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        let cli = Cli::try_parse_from(["dcc-link", "ping"]).unwrap();
        assert_eq!(cli.command, Command::Ping);
        assert_eq!(cli.link_config().address(), "127.0.0.1:12112");
        assert_eq!(cli.framing, Framing::LengthPrefixed);
    }

    #[test]
    fn test_parse_flags_and_transform() {
        let cli = Cli::try_parse_from([
            "dcc-link", "--host", "10.0.0.2", "--port", "9000", "--framing", "unframed",
            "transform", "pCube1",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::Transform {
                object: "pCube1".into()
            }
        );
        let config = cli.link_config();
        assert_eq!(config.address(), "10.0.0.2:9000");
        assert_eq!(config.framing, Framing::Unframed);
    }

    #[test]
    fn test_parse_watch_destination() {
        let cli = Cli::try_parse_from(["dcc-link", "watch", "--dest", "/Game/Shots"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Watch {
                dest: "/Game/Shots".into()
            }
        );

        let cli = Cli::try_parse_from(["dcc-link", "watch"]).unwrap();
        assert_eq!(
            cli.command,
            Command::Watch {
                dest: DEFAULT_DESTINATION.into()
            }
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(Cli::try_parse_from(["dcc-link"]).is_err());
        assert!(Cli::try_parse_from(["dcc-link", "transform"]).is_err());
        assert!(Cli::try_parse_from(["dcc-link", "--port", "many", "ping"]).is_err());
        assert!(Cli::try_parse_from(["dcc-link", "--framing", "smoke-signals", "ping"]).is_err());
        assert!(Cli::try_parse_from(["dcc-link", "--verbose", "ping"]).is_err());
        assert!(Cli::try_parse_from(["dcc-link", "ping", "extra"]).is_err());
    }
}
