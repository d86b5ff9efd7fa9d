//! Key ring command line
//!
//! Runs one lifecycle operation against a KMS instance and prints the result
//! as JSON on stdout. Credentials and endpoints come from `KMS_KEYRING_*`
//! environment variables (or a `.env` file).

use anyhow::Result;
use clap::{Parser, Subcommand};
use kms_config::{KmsConfig, LogFormat};
use kms_keyring::{init_controller, EndpointPreference, KeyRingRequest};
use kms_logging::{init_logging, LogStyle};
use tracing::info;

#[derive(Parser)]
#[command(name = "kms-keyring")]
#[command(about = "Create, read and delete KMS key rings")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a key ring and print its identifier
    Create {
        /// Instance GUID or CRN
        #[arg(long)]
        instance_id: String,
        #[arg(long)]
        key_ring_id: String,
        /// public or private
        #[arg(long)]
        endpoint_type: Option<EndpointPreference>,
    },
    /// Report whether a key ring still exists
    Read {
        /// Identifier printed by `create`
        id: String,
        #[arg(long)]
        endpoint_type: Option<EndpointPreference>,
    },
    /// Read an existing key ring with the endpoint chosen automatically
    Import { id: String },
    /// Delete a key ring
    Delete {
        id: String,
        #[arg(long)]
        endpoint_type: Option<EndpointPreference>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = KmsConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    let style = match config.log_format {
        LogFormat::Json => LogStyle::Json,
        LogFormat::Console => LogStyle::Console,
    };
    init_logging("kms-keyring", config.log_level(), style)?;

    let controller = init_controller(&config)?;

    let output = match cli.command {
        Command::Create {
            instance_id,
            key_ring_id,
            endpoint_type,
        } => {
            let request = KeyRingRequest::new(instance_id, key_ring_id, endpoint_type);
            let id = controller.create(&request).await?;
            serde_json::json!({ "id": id })
        }
        Command::Read { id, endpoint_type } => {
            serde_json::to_value(controller.read(&id, endpoint_type).await?)?
        }
        Command::Import { id } => serde_json::to_value(controller.import(&id).await?)?,
        Command::Delete { id, endpoint_type } => {
            controller.delete(&id, endpoint_type).await?;
            serde_json::json!({ "id": id, "deleted": true })
        }
    };

    info!("Operation completed");
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
