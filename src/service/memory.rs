use std::{
    collections::BTreeMap,
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;

use crate::{
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{City, Forecast, NewCity, NewTemperature, NewWebhook, Temperature, Webhook},
    },
    service::{forecast::ForecastWindow, weather::WeatherService},
};

#[derive(Default)]
struct Tables {
    cities: BTreeMap<i64, City>,
    temperatures: Vec<Temperature>,
    webhooks: BTreeMap<i64, Webhook>,
    next_id: i64,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn name_taken(&self, name: &str, except_id: Option<i64>) -> bool {
        self.cities.values().any(|city| !city.is_deleted && city.name == name && Some(city.id) != except_id)
    }
}

/**
 * Process local `WeatherService`. Keeps the same constraints as the database schema:
 * unique names among cities that are not deleted, and temperatures and webhooks must reference an existing city.
 */
#[derive(Default)]
pub struct InMemoryWeatherService {
    tables: Mutex<Tables>,
}

impl InMemoryWeatherService {
    pub fn new() -> Self {
        InMemoryWeatherService::default()
    }

    fn tables(&self) -> Result<MutexGuard<'_, Tables>, ApplicationError> {
        self.tables.lock().map_err(|err| ApplicationError::new(ErrorType::DatabaseError, format!("In memory store poisoned: {err}")))
    }

    /**
     * Stores a reading with an explicit timestamp.
     */
    pub fn insert_temperature_at(&self, new_temperature: NewTemperature, timestamp: i64) -> Result<Temperature, ApplicationError> {
        let mut tables = self.tables()?;
        // Soft deleted cities still satisfy the reference, as with the foreign key in postgres.
        if !tables.cities.contains_key(&new_temperature.city_id) {
            return Err(ApplicationError::new(ErrorType::ConstraintViolation, "Missing parent value".to_string()));
        }
        let id = tables.next_id();
        let temperature = Temperature::new(id, new_temperature.city_id, new_temperature.max, new_temperature.min, timestamp);
        tables.temperatures.push(temperature.clone());
        Ok(temperature)
    }

    /**
     * Number of stored city records, soft deleted ones included.
     */
    #[cfg(test)]
    pub fn city_count(&self) -> usize {
        self.tables().map(|tables| tables.cities.len()).unwrap_or_default()
    }
}

#[async_trait]
impl WeatherService for InMemoryWeatherService {
    async fn find_city_by_id(&self, city_id: i64) -> Result<City, ApplicationError> {
        let tables = self.tables()?;
        tables
            .cities
            .get(&city_id)
            .filter(|city| !city.is_deleted)
            .cloned()
            .ok_or_else(|| ApplicationError::new(ErrorType::NotFound, format!("find city by id: City {city_id} not found")))
    }

    async fn find_city_by_name(&self, name: &str) -> Result<City, ApplicationError> {
        let tables = self.tables()?;
        tables
            .cities
            .values()
            .find(|city| !city.is_deleted && city.name == name)
            .cloned()
            .ok_or_else(|| ApplicationError::new(ErrorType::NotFound, format!("find city by name: City {name} not found")))
    }

    async fn create_city(&self, new_city: NewCity) -> Result<City, ApplicationError> {
        let mut tables = self.tables()?;
        if tables.name_taken(&new_city.name, None) {
            return Err(ApplicationError::new(ErrorType::ConstraintViolation, "create city: Already exists".to_string()));
        }
        let id = tables.next_id();
        let city = City::new(id, new_city.name, new_city.latitude, new_city.longitude, false);
        tables.cities.insert(id, city.clone());
        Ok(city)
    }

    async fn update_city(&self, city: City) -> Result<City, ApplicationError> {
        let mut tables = self.tables()?;
        if !tables.cities.contains_key(&city.id) {
            return Err(ApplicationError::new(ErrorType::NotFound, "update city: City not found".to_string()));
        }
        if !city.is_deleted && tables.name_taken(&city.name, Some(city.id)) {
            return Err(ApplicationError::new(ErrorType::ConstraintViolation, "update city: Already exists".to_string()));
        }
        tables.cities.insert(city.id, city.clone());
        Ok(city)
    }

    async fn delete_city(&self, mut city: City) -> Result<City, ApplicationError> {
        let mut tables = self.tables()?;
        let Some(stored) = tables.cities.get_mut(&city.id) else {
            return Err(ApplicationError::new(ErrorType::NotFound, "delete city: City not found".to_string()));
        };
        stored.is_deleted = true;
        city.is_deleted = true;
        Ok(city)
    }

    async fn get_city_forecast(&self, city_id: i64, window: ForecastWindow) -> Result<Forecast, ApplicationError> {
        let tables = self.tables()?;
        Ok(window.aggregate(city_id, &tables.temperatures))
    }

    async fn get_city_webhooks(&self, city_id: i64) -> Result<Vec<Webhook>, ApplicationError> {
        let tables = self.tables()?;
        Ok(tables.webhooks.values().filter(|webhook| webhook.city_id == city_id && !webhook.is_deleted).cloned().collect())
    }

    async fn create_temperature(&self, new_temperature: NewTemperature) -> Result<Temperature, ApplicationError> {
        self.insert_temperature_at(new_temperature, chrono::Utc::now().timestamp()).map_err(|err| err.context("create temperature"))
    }

    async fn find_webhook_by_id(&self, webhook_id: i64) -> Result<Webhook, ApplicationError> {
        let tables = self.tables()?;
        tables.webhooks.get(&webhook_id).cloned().ok_or_else(|| ApplicationError::new(ErrorType::NotFound, format!("find webhook by id: Webhook {webhook_id} not found")))
    }

    async fn create_webhook(&self, new_webhook: NewWebhook) -> Result<Webhook, ApplicationError> {
        let mut tables = self.tables()?;
        // Same reference rule as temperatures.
        if !tables.cities.contains_key(&new_webhook.city_id) {
            return Err(ApplicationError::new(ErrorType::ConstraintViolation, "create webhook: Missing parent value".to_string()));
        }
        let id = tables.next_id();
        let webhook = Webhook::new(id, new_webhook.city_id, new_webhook.callback_url, false);
        tables.webhooks.insert(id, webhook.clone());
        Ok(webhook)
    }

    async fn delete_webhook(&self, webhook: Webhook) -> Result<Webhook, ApplicationError> {
        let mut tables = self.tables()?;
        tables.webhooks.remove(&webhook.id).ok_or_else(|| ApplicationError::new(ErrorType::NotFound, "delete webhook: Webhook not found".to_string()))
    }
}
