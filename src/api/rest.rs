use actix_web::{HttpResponse, ResponseError, http::StatusCode, web};
use serde::{Deserialize, Serialize};

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    models::{City, CityAddInputType, CityUpdateInputType, Forecast, Temperature, TemperatureAddInputType, Webhook, WebhookAddInputType},
};

/***************** Cities models *********************/

/**
 * Request body for adding a city. Fields are optional here so that missing values are reported as validation errors.
 */
#[derive(Debug, Deserialize)]
pub struct CityAddRequest {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<web::Json<CityAddRequest>> for CityAddInputType {
    fn from(request: web::Json<CityAddRequest>) -> Self {
        let request = request.into_inner();
        CityAddInputType { name: request.name, latitude: request.latitude, longitude: request.longitude }
    }
}

/**
 * Request body for a partial city update.
 */
#[derive(Debug, Deserialize)]
pub struct CityUpdateRequest {
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl From<web::Json<CityUpdateRequest>> for CityUpdateInputType {
    fn from(request: web::Json<CityUpdateRequest>) -> Self {
        let request = request.into_inner();
        CityUpdateInputType { name: request.name, latitude: request.latitude, longitude: request.longitude }
    }
}

/**
 * City as returned by the API. The soft delete flag is not exposed.
 */
#[derive(Debug, Serialize)]
pub struct CityResponse {
    pub id: i64,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl From<City> for CityResponse {
    fn from(city: City) -> Self {
        CityResponse { id: city.id, name: city.name, latitude: city.latitude, longitude: city.longitude }
    }
}

/***************** Temperature models *********************/

/**
 * Identifier sent either as a JSON number or as a string.
 */
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum IdentifierField {
    Number(i64),
    Text(String),
}

impl From<IdentifierField> for String {
    fn from(field: IdentifierField) -> Self {
        match field {
            IdentifierField::Number(number) => number.to_string(),
            IdentifierField::Text(text) => text,
        }
    }
}

/**
 * Request body for adding a temperature reading.
 */
#[derive(Debug, Deserialize)]
pub struct TemperatureAddRequest {
    pub city_id: Option<IdentifierField>,
    pub max: Option<i32>,
    pub min: Option<i32>,
}

impl From<web::Json<TemperatureAddRequest>> for TemperatureAddInputType {
    fn from(request: web::Json<TemperatureAddRequest>) -> Self {
        let request = request.into_inner();
        TemperatureAddInputType { city_id: request.city_id.map(String::from), max: request.max, min: request.min }
    }
}

#[derive(Debug, Serialize)]
pub struct TemperatureResponse {
    pub id: i64,
    pub city_id: i64,
    pub max: i32,
    pub min: i32,
    pub timestamp: i64,
}

impl From<Temperature> for TemperatureResponse {
    fn from(temperature: Temperature) -> Self {
        TemperatureResponse { id: temperature.id, city_id: temperature.city_id, max: temperature.max, min: temperature.min, timestamp: temperature.timestamp }
    }
}

/***************** Forecast models *********************/

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub city_id: i64,
    pub max: f64,
    pub min: f64,
    pub sample: i64,
}

impl From<Forecast> for ForecastResponse {
    fn from(forecast: Forecast) -> Self {
        ForecastResponse { city_id: forecast.city_id, max: forecast.max, min: forecast.min, sample: forecast.sample }
    }
}

/***************** Webhook models *********************/

/**
 * Request body for adding a webhook.
 */
#[derive(Debug, Deserialize)]
pub struct WebhookAddRequest {
    pub city_id: Option<IdentifierField>,
    pub callback_url: Option<String>,
}

impl From<web::Json<WebhookAddRequest>> for WebhookAddInputType {
    fn from(request: web::Json<WebhookAddRequest>) -> Self {
        let request = request.into_inner();
        WebhookAddInputType { city_id: request.city_id.map(String::from), callback_url: request.callback_url }
    }
}

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub id: i64,
    pub city_id: i64,
    pub callback_url: String,
}

impl From<Webhook> for WebhookResponse {
    fn from(webhook: Webhook) -> Self {
        WebhookResponse { id: webhook.id, city_id: webhook.city_id, callback_url: webhook.callback_url }
    }
}

/***************** Error models *********************/

/**
 * Message returned for every failed request. Details are only logged.
 */
const REQUEST_FAILURE: &str = "request failure";

/**
 * Error envelope returned to the caller.
 */
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /**
     * Always false.
     */
    pub status: bool,
    /**
     * Generic failure message.
     */
    pub message: String,
}

impl ResponseError for ApplicationError {
    fn status_code(&self) -> StatusCode {
        get_statuscode(&self.error_type)
    }

    /**
     * Logs the error and generates the fixed error envelope.
     */
    fn error_response(&self) -> HttpResponse {
        tracing::error!(error_type = ?self.error_type, "Error processing request: {}", self.message);
        let error_response = ErrorResponse { status: false, message: REQUEST_FAILURE.to_string() };
        HttpResponse::build(self.status_code()).json(&error_response)
    }
}

/**
* Maps application errors to HTTP status codes.
*
* # Arguments
* `error_type`: The type of error that occurred.
*
* # Returns
* The corresponding HTTP status code.
*/
fn get_statuscode(error_type: &ErrorType) -> StatusCode {
    match error_type {
        ErrorType::NotFound => StatusCode::NOT_FOUND,
        ErrorType::Validation | ErrorType::ConstraintViolation | ErrorType::DatabaseError | ErrorType::DeliveryFailure | ErrorType::Initialization | ErrorType::Application => StatusCode::BAD_REQUEST,
    }
}

#[cfg(test)]
mod test {
    use actix_web::body::to_bytes;

    use super::*;

    #[test]
    fn test_identifier_field_accepts_number_and_string() {
        let request: TemperatureAddRequest = serde_json::from_str(r#"{"city_id": 12, "max": 3, "min": 1}"#).unwrap();
        assert_eq!(request.city_id.map(String::from), Some("12".to_string()));
        let request: TemperatureAddRequest = serde_json::from_str(r#"{"city_id": "12", "max": 3, "min": 1}"#).unwrap();
        assert_eq!(request.city_id.map(String::from), Some("12".to_string()));
    }

    #[test]
    fn test_city_response_hides_deleted_flag() {
        let value = serde_json::to_value(CityResponse::from(City::new(1, "Oslo".to_string(), 59.91, 10.75, true))).unwrap();
        assert_eq!(value, serde_json::json!({"id": 1, "name": "Oslo", "latitude": 59.91, "longitude": 10.75}));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(get_statuscode(&ErrorType::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(get_statuscode(&ErrorType::Validation), StatusCode::BAD_REQUEST);
        assert_eq!(get_statuscode(&ErrorType::ConstraintViolation), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_error_envelope_hides_details() {
        let error = ApplicationError::new(ErrorType::DatabaseError, "connection refused on 10.0.0.5".to_string());
        let response = error.error_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body()).await.unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value, serde_json::json!({"status": false, "message": "request failure"}));
    }
}
