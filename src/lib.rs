use anyhow::Result;
use dotenvy::dotenv;

pub mod api;
pub mod chat;
pub mod config;
pub mod error;
pub mod interface;
pub mod logger;
pub mod models;
pub mod session;
pub mod stats;
pub mod utils;

/// Run the application: load `.env`, load config, set up logging, and start the REPL.
pub async fn run() -> Result<()> {
    // Load environment variables from .env
    dotenv().ok();

    let config = config::AppConfig::load();
    let _log_guard = logger::init(&config);
    tracing::info!(api_base_url = %config.api_base_url, "starting dashboard");

    interface::start_repl(&config).await
}

// Re-exports for library consumers: common useful types
pub use api::{ApiClient, ChatBackend, StatsSource};
pub use chat::ChatController;
pub use config::AppConfig;
pub use error::{ApiError, ErrorKind};
pub use models::{ChatMode, StatsSnapshot, TimeWindow};
pub use session::SessionIdentityStore;
pub use stats::{StatsController, StatsState};
