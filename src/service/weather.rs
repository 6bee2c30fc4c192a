use async_trait::async_trait;
use sqlx::{Pool, Postgres, Transaction, pool::PoolConnection};

use crate::{
    dao::weather::WeatherDao,
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{City, Forecast, NewCity, NewTemperature, NewWebhook, Temperature, Webhook},
    },
    service::forecast::ForecastWindow,
};

/**
 * Storage capabilities the weather api depends on.
 *
 * Lookups of cities never return soft deleted cities. Errors from the underlying store are passed on
 * with the failing operation as context.
 */
#[async_trait]
pub trait WeatherService: Send + Sync {
    async fn find_city_by_id(&self, city_id: i64) -> Result<City, ApplicationError>;
    async fn find_city_by_name(&self, name: &str) -> Result<City, ApplicationError>;
    async fn create_city(&self, new_city: NewCity) -> Result<City, ApplicationError>;
    /**
     * Writes every field of the city.
     */
    async fn update_city(&self, city: City) -> Result<City, ApplicationError>;
    /**
     * Flags the city as deleted. The record is kept.
     */
    async fn delete_city(&self, city: City) -> Result<City, ApplicationError>;
    async fn get_city_forecast(&self, city_id: i64, window: ForecastWindow) -> Result<Forecast, ApplicationError>;
    async fn get_city_webhooks(&self, city_id: i64) -> Result<Vec<Webhook>, ApplicationError>;
    /**
     * Stores a reading. The timestamp is assigned here, never by the caller.
     */
    async fn create_temperature(&self, new_temperature: NewTemperature) -> Result<Temperature, ApplicationError>;
    async fn find_webhook_by_id(&self, webhook_id: i64) -> Result<Webhook, ApplicationError>;
    async fn create_webhook(&self, new_webhook: NewWebhook) -> Result<Webhook, ApplicationError>;
    /**
     * Physically removes the webhook.
     */
    async fn delete_webhook(&self, webhook: Webhook) -> Result<Webhook, ApplicationError>;
}

/**
 * `WeatherService` backed by `PostgreSQL`.
 */
pub struct PostgresWeatherService {
    /**
     * The DAO for weather operations.
     */
    weather_dao: WeatherDao,
    /**
     * Connection pool for database operations.
     */
    connection_pool: Pool<Postgres>,
}

impl PostgresWeatherService {
    /**
     * Creates a new instance of `PostgresWeatherService`.
     *
     * # Arguments
     * `weather_dao`: The DAO for weather operations.
     * `connection_pool`: Connection pool for database operations.
     */
    pub fn new(weather_dao: WeatherDao, connection_pool: Pool<Postgres>) -> Self {
        PostgresWeatherService { weather_dao, connection_pool }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, ApplicationError> {
        self.connection_pool.begin().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to begin transaction: {err}")))
    }

    async fn connection(&self) -> Result<PoolConnection<Postgres>, ApplicationError> {
        self.connection_pool.acquire().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to acquire connection: {err}")))
    }

    /**
     * Commits the transaction when the operation succeeded, rolls it back otherwise.
     */
    async fn finish<T>(transaction: Transaction<'static, Postgres>, result: Result<T, ApplicationError>) -> Result<T, ApplicationError> {
        match result {
            Ok(value) => {
                transaction.commit().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to commit transaction: {err}")))?;
                Ok(value)
            }
            Err(err) => {
                transaction.rollback().await.map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("Failed to rollback transaction: {err}")))?;
                Err(err)
            }
        }
    }
}

#[async_trait]
impl WeatherService for PostgresWeatherService {
    async fn find_city_by_id(&self, city_id: i64) -> Result<City, ApplicationError> {
        let mut connection = self.connection().await?;
        self.weather_dao.find_city_by_id(&mut connection, city_id).await.map_err(|err| err.context("find city by id"))
    }

    async fn find_city_by_name(&self, name: &str) -> Result<City, ApplicationError> {
        let mut connection = self.connection().await?;
        self.weather_dao.find_city_by_name(&mut connection, name).await.map_err(|err| err.context("find city by name"))
    }

    async fn create_city(&self, new_city: NewCity) -> Result<City, ApplicationError> {
        let mut transaction = self.begin().await?;
        let result = self.weather_dao.add_city(&mut transaction, new_city).await;
        Self::finish(transaction, result).await.map_err(|err| err.context("create city"))
    }

    async fn update_city(&self, city: City) -> Result<City, ApplicationError> {
        let mut transaction = self.begin().await?;
        let result = self.weather_dao.update_city(&mut transaction, &city).await;
        Self::finish(transaction, result).await.map_err(|err| err.context("update city"))?;
        Ok(city)
    }

    async fn delete_city(&self, mut city: City) -> Result<City, ApplicationError> {
        city.is_deleted = true;
        let mut transaction = self.begin().await?;
        let result = self.weather_dao.update_city(&mut transaction, &city).await;
        Self::finish(transaction, result).await.map_err(|err| err.context("delete city"))?;
        Ok(city)
    }

    async fn get_city_forecast(&self, city_id: i64, window: ForecastWindow) -> Result<Forecast, ApplicationError> {
        let mut connection = self.connection().await?;
        self.weather_dao.get_city_forecast(&mut connection, city_id, window).await.map_err(|err| err.context("get city forecast"))
    }

    async fn get_city_webhooks(&self, city_id: i64) -> Result<Vec<Webhook>, ApplicationError> {
        let mut connection = self.connection().await?;
        self.weather_dao.get_city_webhooks(&mut connection, city_id).await.map_err(|err| err.context("get city webhooks"))
    }

    async fn create_temperature(&self, new_temperature: NewTemperature) -> Result<Temperature, ApplicationError> {
        let timestamp = chrono::Utc::now().timestamp();
        let mut transaction = self.begin().await?;
        let result = self.weather_dao.add_temperature(&mut transaction, new_temperature, timestamp).await;
        Self::finish(transaction, result).await.map_err(|err| err.context("create temperature"))
    }

    async fn find_webhook_by_id(&self, webhook_id: i64) -> Result<Webhook, ApplicationError> {
        let mut connection = self.connection().await?;
        self.weather_dao.find_webhook_by_id(&mut connection, webhook_id).await.map_err(|err| err.context("find webhook by id"))
    }

    async fn create_webhook(&self, new_webhook: NewWebhook) -> Result<Webhook, ApplicationError> {
        let mut transaction = self.begin().await?;
        let result = self.weather_dao.add_webhook(&mut transaction, new_webhook).await;
        Self::finish(transaction, result).await.map_err(|err| err.context("create webhook"))
    }

    async fn delete_webhook(&self, webhook: Webhook) -> Result<Webhook, ApplicationError> {
        let mut transaction = self.begin().await?;
        let result = self.weather_dao.delete_webhook(&mut transaction, webhook.id).await;
        Self::finish(transaction, result).await.map_err(|err| err.context("delete webhook"))?;
        Ok(webhook)
    }
}
