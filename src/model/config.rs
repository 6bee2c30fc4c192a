use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::model::apperror::{ApplicationError, ErrorType};

/**
 * Command-line arguments for the application.
 */
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct ApplicationArguments {
    /**
     * Path to the configuration file.
     */
    #[arg(short, long)]
    pub config_file: String,
}

/**
 * Represents the configuration for the application.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /**
     * Logging configuration for the application.
     */
    pub logging: LoggingConfig,
    /**
     * Server configuration for the application.
     */
    pub server: Server,
    /**
     * Database configuration for the application.
     */
    pub database: Database,
    /**
     * Event bus configuration.
     */
    #[serde(default)]
    pub events: EventsConfig,
    /**
     * Outbound webhook configuration.
     */
    #[serde(default)]
    pub webhooks: WebhooksConfig,
}

impl Config {
    /**
     * Checks the values the file format alone cannot constrain.
     *
     * #Returns
     * An `Initialization` error naming the first invalid setting.
     */
    pub fn validate(&self) -> Result<(), ApplicationError> {
        if self.events.max_concurrent_listeners == Some(0) {
            return Err(ApplicationError::new(ErrorType::Initialization, "events.maxConcurrentListeners must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[allow(clippy::struct_excessive_bools)]
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /**
     * Whether to log the target of the log message.
     */
    pub target: bool,
    /**
     * Whether to log thread IDs .
     */
    pub thread_ids: bool,
    /**
     * Whether to log thread names.
     */
    pub thread_names: bool,
    /**
     * Whether to log line numbers.
     */
    pub line_number: bool,
    /**
     * Whether to log the log level.
     */
    pub level: bool,
    /**
     * Whether to use ANSI colors in logs.
     */
    pub ansi: bool,
    /**
     * Whether to log the source file.
     */
    pub file: bool,
    /**
     * Additional directives for logging configuration, e.g. `weather_api=debug`.
     */
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig { target: true, thread_ids: true, thread_names: true, line_number: true, level: true, ansi: true, file: true, directives: vec![] }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    /**
     * Type of the database (e.g., `PostgreSQL`).
     */
    pub db_type: DatabaseType,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DatabaseType {
    /**
     * `PostgreSQL` database type. Timeouts and lifetimes are in milliseconds.
     */
    #[serde(rename_all = "camelCase")]
    Postgresql { connection_string: String, max_connections: u32, min_connections: u32, acquire_timeout: u64, idle_timeout: u64, max_lifetime: u64, run_migrations: bool },
    /**
     * Process local storage. Data is lost on restart.
     */
    InMemory {},
}

/**
 * Represents the server configuration for the application.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Server {
    /**
     * Address to bind to.
     */
    pub address: String,
    /**
     * Number of worker threads for the server.
     */
    pub workers: usize,
    /**
     * HTTP port for the server.
     */
    pub http_port: u16,
}

/**
 * Represents the event bus configuration.
 */
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsConfig {
    /**
     * Maximum number of listener invocations running at the same time. Unbounded when absent.
     */
    pub max_concurrent_listeners: Option<usize>,
}

/**
 * Represents the configuration of outbound webhook calls.
 */
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhooksConfig {
    /**
     * Timeout for a single callback in milliseconds.
     */
    pub timeout_ms: u64,
    /**
     * User agent sent with callbacks.
     */
    pub user_agent: String,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        WebhooksConfig { timeout_ms: 5000, user_agent: concat!("weather_api/", env!("CARGO_PKG_VERSION")).to_string() }
    }
}
