mod api;
mod dao;
mod events;
mod model;
mod service;

use std::sync::Arc;
use std::time::Duration;

use crate::api::endpoints::configure;
use crate::api::middleware::timing_middleware;
use crate::api::state::AppState;
use crate::dao::weather::WeatherDao;
use crate::events::bus::{EventBus, TEMPERATURE_CREATED};
use crate::events::metrics::EventMetrics;
use crate::events::webhooks::WebhookDispatcher;
use crate::model::config::{ApplicationArguments, Database, DatabaseType, LoggingConfig};
use crate::model::models::Temperature;
use crate::service::handler::WeatherHandler;
use crate::service::memory::InMemoryWeatherService;
use crate::service::weather::{PostgresWeatherService, WeatherService};

use actix_web::middleware::from_fn;
use actix_web::{App, HttpServer, web};
use actix_web_prom::PrometheusMetricsBuilder;
use clap::Parser;
use sqlx::pool;
use tracing::info;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/**
 * Entry point. Wires the store, the event bus and the http server together and runs until the server is stopped.
 */
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let args = ApplicationArguments::parse();

    let config = get_config(&args.config_file)?;

    init_tracing(&config.logging)?;

    info!("Starting the weather api");

    let weather_service = get_weather_service(&config.database).await?;

    let prometheus = PrometheusMetricsBuilder::new("")
        .endpoint("/metrics")
        .mask_unmatched_patterns("UNKNOWN")
        .build()
        .map_err(|err| std::io::Error::other(format!("Failed to create Prometheus metrics: {err}")))?;

    let event_metrics = EventMetrics::new().map_err(|err| std::io::Error::other(format!("Failed to create event metrics: {err}")))?;
    event_metrics.register(&prometheus).map_err(|err| std::io::Error::other(format!("Failed to register event metrics: {err}")))?;

    info!("Registering event listeners");
    let mut event_bus: EventBus<Temperature> = EventBus::new(config.events.max_concurrent_listeners, event_metrics.clone());
    let webhook_dispatcher = WebhookDispatcher::new(weather_service.clone(), Duration::from_millis(config.webhooks.timeout_ms), &config.webhooks.user_agent, event_metrics)
        .map_err(|err| std::io::Error::other(format!("Failed to create webhook dispatcher: {err}")))?;
    event_bus.register(TEMPERATURE_CREATED, Arc::new(webhook_dispatcher));
    let event_bus = Arc::new(event_bus);

    let state = web::Data::new(AppState::new(WeatherHandler::new(weather_service, event_bus.clone())));

    let server = HttpServer::new(move || App::new().wrap(prometheus.clone()).wrap(from_fn(timing_middleware)).app_data(state.clone()).configure(configure))
        .bind((config.server.address.as_str(), config.server.http_port))?
        .workers(config.server.workers)
        .run();

    info!("Listening on {}:{}", config.server.address, config.server.http_port);
    let result = server.await;

    event_bus.shutdown();
    info!("Server exiting");
    result
}

/**
 * Initializes tracing for the application.
 *
 * #Arguments
 * `logging`: Which fields to log and additional filter directives. `RUST_LOG` is used as base filter when set.
 *
 * #Returns
 * A `Result` indicating success or failure.
 */
fn init_tracing(logging: &LoggingConfig) -> Result<(), std::io::Error> {
    let mut env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    for directive in &logging.directives {
        let directive: Directive = directive.parse().map_err(|err| std::io::Error::other(format!("Invalid logging directive {directive}: {err}")))?;
        env_filter = env_filter.add_directive(directive);
    }

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(logging.target)
        .with_thread_ids(logging.thread_ids)
        .with_thread_names(logging.thread_names)
        .with_line_number(logging.line_number)
        .with_level(logging.level)
        .with_ansi(logging.ansi)
        .with_file(logging.file);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|err| std::io::Error::other(format!("Failed to initialize tracing: {err}")))?;

    Ok(())
}

/**
 * Creates the store configured for the application.
 *
 * #Arguments
 * `database`: The database configuration.
 *
 * #Returns
 * The store, or an error if the database could not be reached or migrated.
 */
async fn get_weather_service(database: &Database) -> Result<Arc<dyn WeatherService>, std::io::Error> {
    match &database.db_type {
        DatabaseType::Postgresql { connection_string, max_connections, min_connections, acquire_timeout, idle_timeout, max_lifetime, run_migrations } => {
            info!("Connecting to postgres");
            let connection_pool = pool::PoolOptions::new()
                .max_connections(*max_connections)
                .min_connections(*min_connections)
                .acquire_timeout(Duration::from_millis(*acquire_timeout))
                .idle_timeout(Duration::from_millis(*idle_timeout))
                .max_lifetime(Duration::from_millis(*max_lifetime))
                .connect(connection_string.as_str())
                .await
                .map_err(|err| std::io::Error::other(format!("Failed to create database pool: {err}")))?;
            if *run_migrations {
                info!("Running database migrations");
                sqlx::migrate!("./sqlx-postgresql-migration/migrations")
                    .run(&connection_pool)
                    .await
                    .map_err(|err| std::io::Error::other(format!("Failed to run database migrations: {err}")))?;
            }
            Ok(Arc::new(PostgresWeatherService::new(WeatherDao::new(), connection_pool)))
        }
        DatabaseType::InMemory {} => {
            info!("Using in memory storage");
            Ok(Arc::new(InMemoryWeatherService::new()))
        }
    }
}

/**
 * Reads the configuration from the specified file.
 *
 * #Arguments
 * `config_file`: The path to the configuration file.
 *
 * #Returns
 * A `Result` containing the parsed `Config` or an `std::io::Error` if reading or parsing fails.
*/
fn get_config(config_file: &str) -> Result<model::config::Config, std::io::Error> {
    let config_str: String = std::fs::read_to_string(config_file).map_err(|err| std::io::Error::other(format!("Failed to read config file: {err}")))?;
    let config: model::config::Config = toml::from_str(&config_str).map_err(|err| std::io::Error::other(format!("Failed to parse config file: {err}")))?;
    config.validate().map_err(|err| std::io::Error::other(format!("Invalid config file: {err}")))?;
    Ok(config)
}
