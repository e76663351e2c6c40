//! replikv node and client binary

use clap::{Parser, Subcommand};
use replikv::common::{logging, Config, NodeRole, StorageKind};
use replikv::coordinator::NodeClient;
use replikv::Node;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "replikv")]
#[command(about = "Master/replica key-value node")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a node
    Serve {
        /// Config file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Bind address for HTTP
        #[arg(long)]
        bind: Option<String>,

        /// Node role: master, sync_replica or async_replica
        #[arg(long)]
        role: Option<NodeRole>,

        /// Storage engine: lsm or memory
        #[arg(long)]
        storage: Option<StorageKind>,

        /// Data directory
        #[arg(long)]
        data: Option<PathBuf>,

        /// Shared replication credential
        #[arg(long)]
        credential: Option<String>,
    },

    /// Read a key
    Get {
        key: String,

        /// Node address
        #[arg(long, default_value = "127.0.0.1:7001")]
        node: String,
    },

    /// Write a key (master only)
    Set {
        key: String,
        value: String,

        #[arg(long, default_value = "127.0.0.1:7001")]
        node: String,
    },

    /// Subscribe a replica to a master
    Subscribe {
        /// Address the master should push to
        replica: String,

        /// Deliver through the periodic WAL sync instead of on every write
        #[arg(long = "async")]
        asynchronous: bool,

        #[arg(long, default_value = "1234")]
        credential: String,

        /// Master address
        #[arg(long, default_value = "127.0.0.1:7001")]
        node: String,
    },

    /// Show node status
    Health {
        #[arg(long, default_value = "127.0.0.1:7001")]
        node: String,
    },
}

const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            bind,
            role,
            storage,
            data,
            credential,
        } => {
            // File and environment first, flags win
            let mut config = Config::load(config.as_deref())?;
            if let Some(bind) = bind {
                config.http_addr = bind;
            }
            if let Some(role) = role {
                config.role = role;
            }
            if let Some(storage) = storage {
                config.storage = storage;
            }
            if let Some(data) = data {
                config.data_dir = data;
            }
            if let Some(credential) = credential {
                config.credential = credential;
            }

            logging::init(&config.log_level);

            let node = Node::start(config).await?;
            tokio::signal::ctrl_c().await?;
            node.stop().await?;
        }

        Commands::Get { key, node } => {
            logging::init("warn");
            let value = NodeClient::new(&node, CLIENT_TIMEOUT)?.get(&key).await?;
            println!("{}", value);
        }

        Commands::Set { key, value, node } => {
            logging::init("warn");
            NodeClient::new(&node, CLIENT_TIMEOUT)?
                .set(&key, &value)
                .await?;
            println!("OK");
        }

        Commands::Subscribe {
            replica,
            asynchronous,
            credential,
            node,
        } => {
            logging::init("warn");
            NodeClient::new(&node, CLIENT_TIMEOUT)?
                .subscribe(&replica, asynchronous, &credential)
                .await?;
            println!("Subscribed {} to {}", replica, node);
        }

        Commands::Health { node } => {
            logging::init("warn");
            let health = NodeClient::new(&node, CLIENT_TIMEOUT)?.health().await?;
            println!("Node status:");
            println!("  Status: {}", health.status);
            println!("  Role: {}", health.role);
            println!("  Storage: {}", health.storage);
            println!("  Replicas: {}", health.replicas);
            println!("  Version: {}", health.version);
        }
    }

    Ok(())
}
