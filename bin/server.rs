// CLA Whitelist - Web Server
// Serves the Gerrit verification endpoint

use anyhow::Result;
use clap::Parser;
use cla_whitelist::{
    build_router, AppState, Credentials, DocumentStore, Guidance, MemoryStore, ServiceConfig,
    SqliteStore,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "cla-server", version, about = "CLA whitelist verification endpoint for Gerrit")]
struct Cli {
    /// Socket address to bind, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080", env = "CLA_LISTEN")]
    listen: SocketAddr,

    /// SQLite database file. Without it agreements live in memory only.
    #[arg(long, env = "CLA_DATABASE")]
    database: Option<PathBuf>,

    /// Basic auth user expected from Gerrit
    #[arg(long, env = "CLA_AUTH_USER")]
    auth_user: String,

    /// Basic auth password expected from Gerrit
    #[arg(long, env = "CLA_AUTH_PASSWORD", hide_env_values = true)]
    auth_password: String,

    /// Where contributors sign a CLA
    #[arg(long, default_value = "https://cla.opennetworking.org", env = "CLA_SIGN_URL")]
    sign_url: String,

    /// Help page linked from the failure message
    #[arg(long, default_value = "https://wiki.opennetworking.org/x/BgCUI", env = "CLA_HELP_URL")]
    help_url: String,

    /// Contact shown when verification fails internally
    #[arg(long, default_value = "support@opennetworking.org", env = "CLA_SUPPORT_EMAIL")]
    support_email: String,
}

fn open_store(cli: &Cli) -> Result<Arc<dyn DocumentStore>> {
    match &cli.database {
        Some(path) => {
            let store = SqliteStore::open(path)?;
            info!("Database opened: {}", path.display());
            Ok(Arc::new(store))
        }
        None => {
            warn!("No --database given; using an empty in-memory store");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "cla_whitelist=info,info".to_string()),
        )
        .init();

    let cli = Cli::parse();
    let store = open_store(&cli)?;

    let config = ServiceConfig {
        credentials: Credentials {
            user: cli.auth_user,
            password: cli.auth_password,
        },
        guidance: Guidance {
            sign_url: cli.sign_url,
            help_url: cli.help_url,
            support_email: cli.support_email,
        },
    };

    let app = build_router(AppState::new(store, config)).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(cli.listen).await?;
    info!("cla-server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
