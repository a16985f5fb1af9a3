//! Handles settings for the application.
//!
//! Configuration is layered: an optional `settings.toml` first, then
//! environment variables, so `EXCLUDED_BALANCE_BOOK_IDS` can be supplied
//! either way.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct App {
    pub level: String,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: String,
    pub port: u16,
    pub database: Database,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub app: App,
    pub server: Server,
    /// Comma-delimited book ids excluded from per-entry balance tracking.
    pub excluded_balance_book_ids: Option<String>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .set_default("app.level", "info")?
            .set_default("server.bind", "127.0.0.1")?
            .set_default("server.port", 8000_i64)?
            .set_default("server.database", "memory")?
            .add_source(File::with_name("settings").required(false))
            .add_source(Environment::default())
            .build()?;

        settings.try_deserialize()
    }
}
