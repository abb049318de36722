//! Overwire CLI - capture API responses and override them locally.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

use overwire_cli::daemon::{self, DaemonConfig};
use overwire_cli::ipc::{socket_path, IpcClient, IpcRequest};
use overwire_proto::{CapturedRequest, Command, CommandResponse, DebugInfo, UrlPattern};

/// Overwire - inspect and mock API responses in place
#[derive(Parser, Debug)]
#[command(name = "overwire")]
#[command(about = "Capture matching API responses and override them locally", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Daemon socket path (defaults to ~/.overwire/daemon.sock)
    #[arg(long)]
    socket: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the capture daemon
    Daemon {
        /// Directory for persisted state (defaults to ~/.overwire/state)
        #[arg(long)]
        state_dir: Option<PathBuf>,
        /// Keep previously captured requests instead of starting fresh
        #[arg(long)]
        keep_requests: bool,
    },
    /// List captured requests
    Requests,
    /// Manage URL patterns
    Patterns {
        #[command(subcommand)]
        command: PatternCommands,
    },
    /// Manage response overrides
    Override {
        #[command(subcommand)]
        command: OverrideCommands,
    },
    /// Check whether an override is active for a URL
    Status {
        /// Request URL
        url: String,
    },
    /// List endpoints with an active override
    Overrides,
    /// Delete one captured request
    Delete {
        /// Request identity (trailing-slash-trimmed URL)
        request_id: String,
    },
    /// Clear all captured requests
    ClearRequests,
    /// Show aggregate counters
    Debug,
    /// Stream daemon notifications
    Watch,
}

#[derive(Subcommand, Debug)]
enum PatternCommands {
    /// List all patterns
    List,
    /// Add a pattern (enabled by default)
    Add {
        /// URL substring to match
        pattern: String,
    },
    /// Remove a pattern
    Remove {
        /// Pattern id
        id: String,
    },
    /// Enable or disable a pattern (flips when --enabled is omitted)
    Toggle {
        /// Pattern id
        id: String,
        #[arg(long)]
        enabled: Option<bool>,
    },
    /// Replace a pattern's substring
    Edit {
        /// Pattern id
        id: String,
        /// New URL substring
        pattern: String,
    },
}

#[derive(Subcommand, Debug)]
enum OverrideCommands {
    /// Store an override payload and install its redirect rule
    Save {
        /// Request identity
        request_id: String,
        /// Replacement payload as JSON
        data: String,
    },
    /// Restore the original response and remove the rule
    Clear {
        /// Request identity
        request_id: String,
    },
    /// Remove every redirect rule and reset the indexes
    ClearAll,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let socket = match &cli.socket {
        Some(path) => path.clone(),
        None => socket_path()?,
    };

    match cli.command {
        Commands::Daemon {
            state_dir,
            keep_requests,
        } => {
            let state_dir = match state_dir {
                Some(dir) => dir,
                None => dirs::home_dir()
                    .context("Failed to get home directory")?
                    .join(".overwire")
                    .join("state"),
            };
            info!("starting overwire daemon");
            daemon::run(DaemonConfig {
                state_dir,
                socket_path: socket,
                keep_requests,
            })
            .await
        }

        Commands::Requests => {
            let response = send_command(&socket, Command::GetRequests).await?;
            let requests: HashMap<String, CapturedRequest> = decode_data(response)?;
            print_requests_table(&requests);
            Ok(())
        }

        Commands::Patterns { command } => match command {
            PatternCommands::List => {
                let response = send_command(&socket, Command::GetUrlPatterns).await?;
                let patterns: Vec<UrlPattern> = decode_data(response)?;
                print_patterns_table(&patterns);
                Ok(())
            }
            PatternCommands::Add { pattern } => {
                let response = send_command(&socket, Command::AddUrlPattern { pattern }).await?;
                let added: UrlPattern = decode_data(response)?;
                println!("Added pattern {} ({})", added.pattern, added.id);
                Ok(())
            }
            PatternCommands::Remove { id } => {
                expect_success(send_command(&socket, Command::DeleteUrlPattern { pattern_id: id }).await?)?;
                println!("Pattern removed");
                Ok(())
            }
            PatternCommands::Toggle { id, enabled } => {
                let response = send_command(
                    &socket,
                    Command::ToggleUrlPattern {
                        pattern_id: id,
                        enabled,
                    },
                )
                .await?;
                let toggled: UrlPattern = decode_data(response)?;
                println!(
                    "Pattern {} is now {}",
                    toggled.pattern,
                    if toggled.enabled { "enabled" } else { "disabled" }
                );
                Ok(())
            }
            PatternCommands::Edit { id, pattern } => {
                let response = send_command(
                    &socket,
                    Command::EditUrlPattern {
                        pattern_id: id,
                        pattern,
                    },
                )
                .await?;
                let edited: UrlPattern = decode_data(response)?;
                println!("Pattern {} updated to {}", edited.id, edited.pattern);
                Ok(())
            }
        },

        Commands::Override { command } => match command {
            OverrideCommands::Save { request_id, data } => {
                let data =
                    serde_json::from_str(&data).context("Override payload must be valid JSON")?;
                expect_success(
                    send_command(&socket, Command::SaveOverride { request_id, data }).await?,
                )?;
                println!("Override saved");
                Ok(())
            }
            OverrideCommands::Clear { request_id } => {
                expect_success(send_command(&socket, Command::ClearOverride { request_id }).await?)?;
                println!("Override cleared");
                Ok(())
            }
            OverrideCommands::ClearAll => {
                expect_success(send_command(&socket, Command::ClearAllOverrides).await?)?;
                println!("All overrides cleared");
                Ok(())
            }
        },

        Commands::Status { url } => {
            let response = send_command(&socket, Command::CheckOverrideStatus { url }).await?;
            let data = expect_success(response)?;
            let active = data
                .as_ref()
                .and_then(|d| d.get("active"))
                .and_then(|a| a.as_bool())
                .unwrap_or(false);
            println!("{}", if active { "override active" } else { "no override" });
            Ok(())
        }

        Commands::Overrides => {
            let response = send_command(&socket, Command::GetOverrides).await?;
            let keys: Vec<String> = decode_data(response)?;
            if keys.is_empty() {
                println!("No active overrides.");
            } else {
                for key in keys {
                    println!("{}", key);
                }
            }
            Ok(())
        }

        Commands::Delete { request_id } => {
            expect_success(send_command(&socket, Command::DeleteRequest { request_id }).await?)?;
            println!("Request deleted");
            Ok(())
        }

        Commands::ClearRequests => {
            expect_success(send_command(&socket, Command::ClearAllRequests).await?)?;
            println!("All captured requests cleared");
            Ok(())
        }

        Commands::Debug => {
            let response = send_command(&socket, Command::DebugInfo).await?;
            let info: DebugInfo = decode_data(response)?;
            println!("Requests:  {} ({} overridden)", info.total_requests, info.overridden_requests);
            println!("Patterns:  {} ({} enabled)", info.url_patterns, info.enabled_patterns);
            if !info.recent_requests.is_empty() {
                println!("Recent:");
                for recent in &info.recent_requests {
                    println!("  {:<24} {}", recent.endpoint, recent.url);
                }
            }
            Ok(())
        }

        Commands::Watch => {
            let client = IpcClient::connect_to(&socket).await?;
            let mut subscription = client.subscribe().await?;
            println!("Watching for notifications (ctrl-c to stop)...");
            while let Some(note) = subscription.next().await? {
                println!("{}", serde_json::to_string(&note)?);
            }
            Ok(())
        }
    }
}

async fn send_command(socket: &std::path::Path, command: Command) -> Result<CommandResponse> {
    let mut client = IpcClient::connect_to(socket).await?;
    client.request(&IpcRequest::Command { command }).await
}

/// Fail with the daemon's error message on an unsuccessful reply.
fn expect_success(response: CommandResponse) -> Result<Option<serde_json::Value>> {
    if !response.success {
        anyhow::bail!(
            "{}",
            response.error.unwrap_or_else(|| "Command failed".to_string())
        );
    }
    Ok(response.data)
}

fn decode_data<T: serde::de::DeserializeOwned>(response: CommandResponse) -> Result<T> {
    let data = expect_success(response)?.context("Reply carried no data")?;
    serde_json::from_value(data).context("Failed to decode reply data")
}

fn print_requests_table(requests: &HashMap<String, CapturedRequest>) {
    if requests.is_empty() {
        println!("No captured requests.");
        return;
    }

    println!(
        "{:<24} {:<8} {:<8} {:<10} ID",
        "ENDPOINT", "METHOD", "STATUS", "OVERRIDE"
    );

    // Newest first for consistent output
    let mut sorted: Vec<_> = requests.values().collect();
    sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    for request in sorted {
        let status = request
            .response_status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<24} {:<8} {:<8} {:<10} {}",
            request.endpoint,
            request.method,
            status,
            if request.is_overridden { "yes" } else { "-" },
            request.id
        );
    }
}

fn print_patterns_table(patterns: &[UrlPattern]) {
    if patterns.is_empty() {
        println!("No URL patterns configured.");
        return;
    }

    println!("{:<28} {:<9} ID", "PATTERN", "ENABLED");
    for pattern in patterns {
        println!(
            "{:<28} {:<9} {}",
            pattern.pattern,
            if pattern.enabled { "yes" } else { "no" },
            pattern.id
        );
    }
}
