use std::borrow::Cow;

use sqlx::PgConnection;
use tracing::{Instrument, instrument};

use crate::{
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{City, Forecast, NewCity, NewTemperature, NewWebhook, Temperature, Webhook},
    },
    service::forecast::ForecastWindow,
};

/**
 * Database response type for querying cities.
 */
pub type QueryCityDbResp = (i64, String, f64, f64, bool);

/**
 * Database response type for querying webhooks.
 */
pub type QueryWebhookDbResp = (i64, i64, String, bool);

/**
 * Database response type for the forecast aggregation.
 */
pub type QueryForecastDbResp = (f64, f64, i64);

/**
 * SQL query to find a non deleted city by id.
 */
const FIND_CITY_BY_ID: &str = "SELECT id, name, latitude, longitude, is_deleted FROM cities WHERE id = $1 AND is_deleted = false";

/**
 * SQL query to find a non deleted city by name.
 */
const FIND_CITY_BY_NAME: &str = "SELECT id, name, latitude, longitude, is_deleted FROM cities WHERE name = $1 AND is_deleted = false";

/**
 * SQL query to add a new city.
 */
const ADD_CITY: &str = "INSERT INTO cities (name, latitude, longitude, is_deleted) VALUES ($1, $2, $3, false) RETURNING id";

/**
 * SQL query to update a city, including its soft delete flag.
 */
const UPDATE_CITY: &str = "UPDATE cities SET name = $1, latitude = $2, longitude = $3, is_deleted = $4 WHERE id = $5";

/**
 * SQL query to add a temperature reading.
 */
const ADD_TEMPERATURE: &str = "INSERT INTO temperatures (city_id, max, min, timestamp) VALUES ($1, $2, $3, $4) RETURNING id";

/**
 * SQL query averaging the readings of a city in a time window. Without GROUP BY an empty window still yields one row.
 */
const QUERY_FORECAST: &str = "SELECT COALESCE(AVG(max)::float8, 0), COALESCE(AVG(min)::float8, 0), COUNT(*) FROM temperatures WHERE city_id = $1 AND timestamp >= $2 AND timestamp <= $3";

/**
 * SQL query to list the webhooks of a city.
 */
const QUERY_CITY_WEBHOOKS: &str = "SELECT id, city_id, callback_url, is_deleted FROM webhooks WHERE city_id = $1 AND is_deleted = false ORDER BY id";

/**
 * SQL query to find a webhook by id.
 */
const FIND_WEBHOOK_BY_ID: &str = "SELECT id, city_id, callback_url, is_deleted FROM webhooks WHERE id = $1";

/**
 * SQL query to add a webhook.
 */
const ADD_WEBHOOK: &str = "INSERT INTO webhooks (city_id, callback_url, is_deleted) VALUES ($1, $2, false) RETURNING id";

/**
 * SQL query to delete a webhook.
 */
const DELETE_WEBHOOK: &str = "DELETE FROM webhooks WHERE id = $1";

/**
 * DAO for weather related database operations.
 */
pub struct WeatherDao {}

impl WeatherDao {
    /**
     * Creates a new instance of `WeatherDao`.
     */
    pub fn new() -> Self {
        WeatherDao {}
    }

    /**
     * Finds a city that is not soft deleted by its id.
     *
     * # Arguments
     * `connection`: The database connection.
     * `city_id`: Id of the city.
     *
     * # Returns
     * The city or a `NotFound` error.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn find_city_by_id(&self, connection: &mut PgConnection, city_id: i64) -> Result<City, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryCityDbResp> = sqlx::query_as(FIND_CITY_BY_ID)
            .bind(city_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to find city by id: {err}")))?;
        result.map(City::from).ok_or_else(|| ApplicationError::new(ErrorType::NotFound, format!("City {city_id} not found")))
    }

    /**
     * Finds a city that is not soft deleted by its name.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn find_city_by_name(&self, connection: &mut PgConnection, name: &str) -> Result<City, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryCityDbResp> = sqlx::query_as(FIND_CITY_BY_NAME)
            .bind(name)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to find city by name: {err}")))?;
        result.map(City::from).ok_or_else(|| ApplicationError::new(ErrorType::NotFound, format!("City {name} not found")))
    }

    /**
     * Adds a new city.
     *
     * # Arguments
     * `transaction`: The database transaction to execute the query within.
     * `new_city`: The city to add.
     *
     * # Returns
     * The stored city including its generated id.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn add_city(&self, transaction: &mut PgConnection, new_city: NewCity) -> Result<City, ApplicationError> {
        let span = tracing::Span::current();
        let id: (i64,) = sqlx::query_as(ADD_CITY)
            .bind(&new_city.name)
            .bind(new_city.latitude)
            .bind(new_city.longitude)
            .fetch_one(transaction)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error(err.as_database_error()))?;
        Ok(City::new(id.0, new_city.name, new_city.latitude, new_city.longitude, false))
    }

    /**
     * Writes all fields of the city, the soft delete flag included.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn update_city(&self, transaction: &mut PgConnection, city: &City) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(UPDATE_CITY)
            .bind(&city.name)
            .bind(city.latitude)
            .bind(city.longitude)
            .bind(city.is_deleted)
            .bind(city.id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error(err.as_database_error()))?;
        if result.rows_affected() == 0 {
            tracing::debug!("City with id {} not found for update", city.id);
            return Err(ApplicationError::new(ErrorType::NotFound, "City not found".to_string()));
        }
        Ok(())
    }

    /**
     * Adds a temperature reading stamped with `timestamp`.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn add_temperature(&self, transaction: &mut PgConnection, new_temperature: NewTemperature, timestamp: i64) -> Result<Temperature, ApplicationError> {
        let span = tracing::Span::current();
        let id: (i64,) = sqlx::query_as(ADD_TEMPERATURE)
            .bind(new_temperature.city_id)
            .bind(new_temperature.max)
            .bind(new_temperature.min)
            .bind(timestamp)
            .fetch_one(transaction)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error(err.as_database_error()))?;
        Ok(Temperature::new(id.0, new_temperature.city_id, new_temperature.max, new_temperature.min, timestamp))
    }

    /**
     * Averages the readings of a city inside the forecast window.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_city_forecast(&self, connection: &mut PgConnection, city_id: i64, window: ForecastWindow) -> Result<Forecast, ApplicationError> {
        let span = tracing::Span::current();
        let (max, min, sample): QueryForecastDbResp = sqlx::query_as(QUERY_FORECAST)
            .bind(city_id)
            .bind(window.start)
            .bind(window.end)
            .fetch_one(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get forecast: {err}")))?;
        Ok(Forecast::new(city_id, max, min, sample))
    }

    /**
     * Lists the webhooks of a city in id order.
     */
    #[instrument(skip(self, connection), fields(result))]
    pub async fn get_city_webhooks(&self, connection: &mut PgConnection, city_id: i64) -> Result<Vec<Webhook>, ApplicationError> {
        let span = tracing::Span::current();
        let results: Vec<QueryWebhookDbResp> = sqlx::query_as(QUERY_CITY_WEBHOOKS)
            .bind(city_id)
            .fetch_all(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to get city webhooks: {err}")))?;
        Ok(results.into_iter().map(Webhook::from).collect())
    }

    #[instrument(skip(self, connection), fields(result))]
    pub async fn find_webhook_by_id(&self, connection: &mut PgConnection, webhook_id: i64) -> Result<Webhook, ApplicationError> {
        let span = tracing::Span::current();
        let result: Option<QueryWebhookDbResp> = sqlx::query_as(FIND_WEBHOOK_BY_ID)
            .bind(webhook_id)
            .fetch_optional(connection)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to find webhook: {err}")))?;
        result.map(Webhook::from).ok_or_else(|| ApplicationError::new(ErrorType::NotFound, format!("Webhook {webhook_id} not found")))
    }

    #[instrument(skip(self, transaction), fields(result))]
    pub async fn add_webhook(&self, transaction: &mut PgConnection, new_webhook: NewWebhook) -> Result<Webhook, ApplicationError> {
        let span = tracing::Span::current();
        let id: (i64,) = sqlx::query_as(ADD_WEBHOOK)
            .bind(new_webhook.city_id)
            .bind(&new_webhook.callback_url)
            .fetch_one(transaction)
            .instrument(span)
            .await
            .map_err(|err| Self::handle_database_error(err.as_database_error()))?;
        Ok(Webhook::new(id.0, new_webhook.city_id, new_webhook.callback_url, false))
    }

    /**
     * Physically removes a webhook.
     */
    #[instrument(skip(self, transaction), fields(result))]
    pub async fn delete_webhook(&self, transaction: &mut PgConnection, webhook_id: i64) -> Result<(), ApplicationError> {
        let span = tracing::Span::current();
        let result = sqlx::query(DELETE_WEBHOOK)
            .bind(webhook_id)
            .execute(transaction)
            .instrument(span)
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to execute query to delete webhook: {err}")))?;
        if result.rows_affected() == 0 {
            tracing::debug!("Webhook with ID {} not found for deletion", webhook_id);
            return Err(ApplicationError::new(ErrorType::NotFound, "Webhook not found".to_string()));
        }
        if result.rows_affected() > 1 {
            tracing::warn!("Multiple webhooks attempted deleted. Rolled back");
            return Err(ApplicationError::new(ErrorType::Application, "Multiple webhooks attempted deleted. Rolled back".to_string()));
        }
        Ok(())
    }

    /**
     * Handles database errors and maps them to application errors.
     *
     * # Arguments
     * `error`: The database error to handle.
     *
     * # Returns
     * An `ApplicationError` corresponding to the database error.
     */
    fn handle_database_error(error: Option<&dyn sqlx::error::DatabaseError>) -> ApplicationError {
        if let Some(db_error) = error {
            tracing::debug!("Database error: {}", db_error);
            tracing::info!("Add/Update error: {:?}", db_error.code());
            if db_error.code() == Some(Cow::Borrowed("23505")) {
                // Unique violation
                return ApplicationError::new(ErrorType::ConstraintViolation, "Already exists".to_string());
            } else if db_error.code() == Some(Cow::Borrowed("23503")) {
                // Foreign key violation
                return ApplicationError::new(ErrorType::ConstraintViolation, "Missing parent value".to_string());
            } else if db_error.code() == Some(Cow::Borrowed("22001")) {
                // Value too long
                return ApplicationError::new(ErrorType::Validation, "Value too long".to_string());
            }
            tracing::error!("Unhandled database error: {}", db_error);
            return ApplicationError::new(ErrorType::DatabaseError, "Unhandled database error".to_string());
        }
        ApplicationError::new(ErrorType::DatabaseError, "Failed to execute database operation".to_string())
    }
}

impl From<QueryCityDbResp> for City {
    fn from((id, name, latitude, longitude, is_deleted): QueryCityDbResp) -> Self {
        City::new(id, name, latitude, longitude, is_deleted)
    }
}

impl From<QueryWebhookDbResp> for Webhook {
    fn from((id, city_id, callback_url, is_deleted): QueryWebhookDbResp) -> Self {
        Webhook::new(id, city_id, callback_url, is_deleted)
    }
}
