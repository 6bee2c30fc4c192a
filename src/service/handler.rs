use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, instrument};

use crate::{
    events::bus::{EventBus, TEMPERATURE_CREATED},
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{City, CityChanges, Forecast, NewCity, NewTemperature, NewWebhook, Temperature, Webhook},
    },
    service::{forecast::ForecastWindow, weather::WeatherService},
};

/**
 * Orchestrates the weather operations on top of the store and the event bus.
 */
pub struct WeatherHandler {
    /**
     * Store for cities, temperatures and webhooks.
     */
    weather_service: Arc<dyn WeatherService>,
    /**
     * Bus temperature events are published on.
     */
    event_bus: Arc<EventBus<Temperature>>,
}

impl WeatherHandler {
    /**
     * Creates a new instance of `WeatherHandler`.
     *
     * # Arguments
     * `weather_service`: Store for cities, temperatures and webhooks.
     * `event_bus`: Bus with its listeners already registered.
     */
    pub fn new(weather_service: Arc<dyn WeatherService>, event_bus: Arc<EventBus<Temperature>>) -> Self {
        WeatherHandler { weather_service, event_bus }
    }

    /**
     * Creates a city, or returns the existing city with the same name without writing anything.
     * A concurrent request may create the same name between lookup and insert; the insert then fails
     * on the unique name and the city stored by the other request is returned.
     */
    #[instrument(skip(self), fields(result))]
    pub async fn create_city(&self, new_city: NewCity) -> Result<City, ApplicationError> {
        match self.weather_service.find_city_by_name(&new_city.name).await {
            Ok(city) => {
                debug!("City {} already exists", city.id);
                return Ok(city);
            }
            Err(err) if err.error_type == ErrorType::NotFound => {}
            Err(err) => return Err(err),
        }
        let name = new_city.name.clone();
        match self.weather_service.create_city(new_city).await {
            Err(err) if err.error_type == ErrorType::ConstraintViolation => {
                debug!("City {name} was created concurrently, reading it back");
                self.weather_service.find_city_by_name(&name).await.map_err(|_| err)
            }
            result => result,
        }
    }

    /**
     * Overwrites the provided fields of an existing city.
     */
    #[instrument(skip(self), fields(result))]
    pub async fn update_city(&self, city_id: i64, changes: CityChanges) -> Result<City, ApplicationError> {
        let city = self.weather_service.find_city_by_id(city_id).await?;
        self.weather_service.update_city(changes.apply(city)).await
    }

    /**
     * Soft deletes a city. Its temperatures and webhooks are kept.
     */
    #[instrument(skip(self), fields(result))]
    pub async fn delete_city(&self, city_id: i64) -> Result<City, ApplicationError> {
        let city = self.weather_service.find_city_by_id(city_id).await?;
        self.weather_service.delete_city(city).await
    }

    /**
     * Averages the readings of the last 24 hours, counted from now.
     */
    #[instrument(skip(self), fields(result))]
    pub async fn get_city_forecast(&self, city_id: i64) -> Result<Forecast, ApplicationError> {
        let window = ForecastWindow::trailing_day(Utc::now());
        self.weather_service.get_city_forecast(city_id, window).await
    }

    /**
     * Stores a reading and publishes it. Returns once stored; webhook delivery happens in the background.
     */
    #[instrument(skip(self), fields(result))]
    pub async fn create_temperature(&self, new_temperature: NewTemperature) -> Result<Temperature, ApplicationError> {
        let temperature = self.weather_service.create_temperature(new_temperature).await?;
        self.event_bus.publish(TEMPERATURE_CREATED, &temperature);
        Ok(temperature)
    }

    #[instrument(skip(self), fields(result))]
    pub async fn create_webhook(&self, new_webhook: NewWebhook) -> Result<Webhook, ApplicationError> {
        self.weather_service.create_webhook(new_webhook).await
    }

    #[instrument(skip(self), fields(result))]
    pub async fn delete_webhook(&self, webhook_id: i64) -> Result<Webhook, ApplicationError> {
        let webhook = self.weather_service.find_webhook_by_id(webhook_id).await?;
        self.weather_service.delete_webhook(webhook).await
    }
}
