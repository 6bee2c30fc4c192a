use crate::model::apperror::{ApplicationError, ErrorType};

/**
 * A location where temperatures are reported and forecasts are computed.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct City {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_deleted: bool,
}

impl City {
    pub fn new(id: i64, name: String, latitude: f64, longitude: f64, is_deleted: bool) -> Self {
        City { id, name, latitude, longitude, is_deleted }
    }
}

/**
 * A single temperature reading in degrees. Immutable once stored.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Temperature {
    pub id: i64,
    pub city_id: i64,
    pub max: i32,
    pub min: i32,
    /**
     * Seconds since epoch, assigned by the store on creation.
     */
    pub timestamp: i64,
}

impl Temperature {
    pub fn new(id: i64, city_id: i64, max: i32, min: i32, timestamp: i64) -> Self {
        Temperature { id, city_id, max, min, timestamp }
    }
}

/**
 * Averages over the readings of a city in a forecast window. Not persisted.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    pub city_id: i64,
    pub max: f64,
    pub min: f64,
    pub sample: i64,
}

impl Forecast {
    pub fn new(city_id: i64, max: f64, min: f64, sample: i64) -> Self {
        Forecast { city_id, max, min, sample }
    }

    /**
     * Forecast for a window without any readings.
     */
    pub fn empty(city_id: i64) -> Self {
        Forecast { city_id, max: 0.0, min: 0.0, sample: 0 }
    }
}

/**
 * A subscription of a callback url to the temperatures of a city.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Webhook {
    pub id: i64,
    pub city_id: i64,
    pub callback_url: String,
    pub is_deleted: bool,
}

impl Webhook {
    pub fn new(id: i64, city_id: i64, callback_url: String, is_deleted: bool) -> Self {
        Webhook { id, city_id, callback_url, is_deleted }
    }
}

/**
 * Validated values for a city to be created.
 */
#[derive(Debug, Clone, PartialEq)]
pub struct NewCity {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/**
 * Validated partial update of a city. `None` leaves the field unchanged.
 */
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CityChanges {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl CityChanges {
    /**
     * Overwrites the provided fields of the city.
     */
    pub fn apply(self, mut city: City) -> City {
        if let Some(name) = self.name {
            city.name = name;
        }
        if let Some(latitude) = self.latitude {
            city.latitude = latitude;
        }
        if let Some(longitude) = self.longitude {
            city.longitude = longitude;
        }
        city
    }
}

/**
 * Validated values for a temperature reading to be stored.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTemperature {
    pub city_id: i64,
    pub max: i32,
    pub min: i32,
}

/**
 * Validated values for a webhook to be created.
 */
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWebhook {
    pub city_id: i64,
    pub callback_url: String,
}

/**
 * Unvalidated input for adding a city.
 */
#[derive(Debug)]
pub struct CityAddInputType {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl CityAddInputType {
    /**
     * Validates the input.
     *
     * # Returns
     * The `NewCity` to store or a validation error.
     */
    pub fn validate(self) -> Result<NewCity, ApplicationError> {
        let name = validate_name(self.name.ok_or_else(|| validation_error("name is required"))?)?;
        let latitude = validate_latitude(self.latitude.ok_or_else(|| validation_error("latitude is required"))?)?;
        let longitude = validate_longitude(self.longitude.ok_or_else(|| validation_error("longitude is required"))?)?;
        Ok(NewCity { name, latitude, longitude })
    }
}

/**
 * Unvalidated input for updating a city.
 */
#[derive(Debug)]
pub struct CityUpdateInputType {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl CityUpdateInputType {
    pub fn validate(self) -> Result<CityChanges, ApplicationError> {
        Ok(CityChanges {
            name: self.name.map(validate_name).transpose()?,
            latitude: self.latitude.map(validate_latitude).transpose()?,
            longitude: self.longitude.map(validate_longitude).transpose()?,
        })
    }
}

/**
 * Unvalidated input for adding a temperature. The city id is kept in its textual form
 * since clients send it both as a number and as a string.
 */
#[derive(Debug)]
pub struct TemperatureAddInputType {
    pub city_id: Option<String>,
    pub max: Option<i32>,
    pub min: Option<i32>,
}

impl TemperatureAddInputType {
    pub fn validate(self) -> Result<NewTemperature, ApplicationError> {
        let city_id = parse_identifier(self.city_id, "city_id")?;
        let max = self.max.ok_or_else(|| validation_error("max is required"))?;
        let min = self.min.ok_or_else(|| validation_error("min is required"))?;
        Ok(NewTemperature { city_id, max, min })
    }
}

/**
 * Unvalidated input for adding a webhook.
 */
#[derive(Debug)]
pub struct WebhookAddInputType {
    pub city_id: Option<String>,
    pub callback_url: Option<String>,
}

impl WebhookAddInputType {
    pub fn validate(self) -> Result<NewWebhook, ApplicationError> {
        let city_id = parse_identifier(self.city_id, "city_id")?;
        let callback_url = self.callback_url.ok_or_else(|| validation_error("callback_url is required"))?;
        let parsed = reqwest::Url::parse(callback_url.trim()).map_err(|err| validation_error(&format!("callback_url is not a valid url: {err}")))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(validation_error("callback_url must use http or https"));
        }
        Ok(NewWebhook { city_id, callback_url: callback_url.trim().to_string() })
    }
}

fn validate_name(name: String) -> Result<String, ApplicationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(validation_error("name must not be empty"));
    }
    Ok(name.to_string())
}

fn validate_latitude(latitude: f64) -> Result<f64, ApplicationError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(validation_error("latitude must be between -90 and 90"));
    }
    Ok(latitude)
}

fn validate_longitude(longitude: f64) -> Result<f64, ApplicationError> {
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(validation_error("longitude must be between -180 and 180"));
    }
    Ok(longitude)
}

fn parse_identifier(value: Option<String>, field: &str) -> Result<i64, ApplicationError> {
    let value = value.ok_or_else(|| validation_error(&format!("{field} is required")))?;
    value.trim().parse::<i64>().map_err(|err| validation_error(&format!("invalid {field} {value}: {err}")))
}

fn validation_error(message: &str) -> ApplicationError {
    ApplicationError::new(ErrorType::Validation, message.to_string())
}
