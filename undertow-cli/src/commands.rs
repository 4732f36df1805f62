//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use undertow_core::{MediaService, UndertowConfig};
use undertow_sim::{InMemoryContentEngine, scan_library};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
        /// Directory for metadata and derived subtitle files
        #[arg(long)]
        download_dir: Option<PathBuf>,
        /// Evict sessions idle longer than this many seconds; 0 disables
        #[arg(long)]
        cleanup_inactive_after: Option<u64>,
        /// Maximum number of cached sessions
        #[arg(long)]
        capacity: Option<usize>,
        /// Local directory served as content
        #[arg(long)]
        library: Option<PathBuf>,
    },
    /// Print magnet links for the content of a local directory
    Library {
        /// Directory to scan
        dir: PathBuf,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns the first error of the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Serve {
            port,
            download_dir,
            cleanup_inactive_after,
            capacity,
            library,
        } => {
            let mut config = UndertowConfig::from_env();
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(dir) = download_dir {
                config.storage.download_dir = dir;
            }
            if let Some(seconds) = cleanup_inactive_after {
                config.cache.max_idle = Duration::from_secs(seconds);
            }
            if let Some(capacity) = capacity {
                config.cache.capacity = capacity;
            }
            serve(config, library).await
        }
        Commands::Library { dir } => print_library(dir).await,
    }
}

async fn serve(config: UndertowConfig, library: Option<PathBuf>) -> anyhow::Result<()> {
    let engine = Arc::new(InMemoryContentEngine::new());
    if let Some(dir) = library {
        let contents = scan_library(&dir)
            .await
            .with_context(|| format!("failed to scan library {}", dir.display()))?;
        for content in contents {
            let name = content.name.clone();
            let magnet = engine.register(content);
            tracing::info!("Serving {}: {}", name, magnet);
        }
    }

    let service = Arc::new(
        MediaService::open(config, engine)
            .await
            .context("failed to prepare download directory")?,
    );
    service
        .verify_tools()
        .context("subtitle extraction tool is required")?;

    if service.spawn_sweeper().is_none() {
        tracing::info!("Inactivity cleanup disabled");
    }

    undertow_web::run_server(service)
        .await
        .context("server failed")?;
    Ok(())
}

async fn print_library(dir: PathBuf) -> anyhow::Result<()> {
    let contents = scan_library(&dir)
        .await
        .with_context(|| format!("failed to scan library {}", dir.display()))?;

    if contents.is_empty() {
        println!("No content found in {}", dir.display());
        return Ok(());
    }

    for content in contents {
        println!("{} ({} files)", content.name, content.files.len());
        println!("  {}", content.magnet_link());
    }
    Ok(())
}
