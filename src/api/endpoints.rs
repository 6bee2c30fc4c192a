use actix_web::{
    HttpRequest, HttpResponse, delete, get, patch, post,
    web::{self, Path},
};
use tracing::{Instrument, instrument};

use crate::{
    api::{
        rest::{CityAddRequest, CityResponse, CityUpdateRequest, ForecastResponse, TemperatureAddRequest, TemperatureResponse, WebhookAddRequest, WebhookResponse},
        state::AppState,
    },
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{CityAddInputType, CityUpdateInputType, TemperatureAddInputType, WebhookAddInputType},
    },
};

/**
 * Endpoint to add a city. Returns the existing city when the name is taken.
 */
#[instrument(level = "info", skip(http_request, app_state), fields(service = "addCity", trace_id = get_trace_id(&http_request), result))]
#[post("/cities")]
pub async fn city_add(http_request: HttpRequest, request_body: web::Json<CityAddRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let new_city = CityAddInputType::from(request_body).validate()?;
    let city = app_state.weather_handler.create_city(new_city).instrument(span).await?;
    Ok(HttpResponse::Ok().json(CityResponse::from(city)))
}

/**
 * Endpoint to partially update a city.
 */
#[instrument(skip(http_request, app_state), fields(service = "updateCity", trace_id = get_trace_id(&http_request), result))]
#[patch("/cities/{id}")]
pub async fn city_update(path: Path<i64>, http_request: HttpRequest, request_body: web::Json<CityUpdateRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let city_id = path.into_inner();
    let changes = CityUpdateInputType::from(request_body).validate()?;
    let city = app_state.weather_handler.update_city(city_id, changes).instrument(span).await?;
    Ok(HttpResponse::Ok().json(CityResponse::from(city)))
}

/**
 * Endpoint to soft delete a city.
 */
#[instrument(skip(http_request, app_state), fields(service = "deleteCity", trace_id = get_trace_id(&http_request), result))]
#[delete("/cities/{id}")]
pub async fn city_delete(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let city_id = path.into_inner();
    let city = app_state.weather_handler.delete_city(city_id).instrument(span).await?;
    Ok(HttpResponse::Ok().json(CityResponse::from(city)))
}

/**
 * Endpoint to get the forecast of the last 24 hours for a city.
 */
#[instrument(skip(http_request, app_state), fields(service = "getForecast", trace_id = get_trace_id(&http_request), result))]
#[get("/forecasts/{city_id}")]
pub async fn forecast_get(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let city_id = path.into_inner();
    let forecast = app_state.weather_handler.get_city_forecast(city_id).instrument(span).await?;
    Ok(HttpResponse::Ok().json(ForecastResponse::from(forecast)))
}

/**
 * Endpoint to add a temperature reading. Subscribed webhooks are notified in the background.
 */
#[instrument(skip(http_request, app_state), fields(service = "addTemperature", trace_id = get_trace_id(&http_request), result))]
#[post("/temperatures")]
pub async fn temperature_add(http_request: HttpRequest, request_body: web::Json<TemperatureAddRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let new_temperature = TemperatureAddInputType::from(request_body).validate()?;
    let temperature = app_state.weather_handler.create_temperature(new_temperature).instrument(span).await?;
    Ok(HttpResponse::Ok().json(TemperatureResponse::from(temperature)))
}

/**
 * Endpoint to add a webhook.
 */
#[instrument(skip(http_request, app_state), fields(service = "addWebhook", trace_id = get_trace_id(&http_request), result))]
#[post("/webhooks")]
pub async fn webhook_add(http_request: HttpRequest, request_body: web::Json<WebhookAddRequest>, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let new_webhook = WebhookAddInputType::from(request_body).validate()?;
    let webhook = app_state.weather_handler.create_webhook(new_webhook).instrument(span).await?;
    Ok(HttpResponse::Ok().json(WebhookResponse::from(webhook)))
}

/**
 * Endpoint to delete a webhook.
 */
#[instrument(skip(http_request, app_state), fields(service = "deleteWebhook", trace_id = get_trace_id(&http_request), result))]
#[delete("/webhooks/{id}")]
pub async fn webhook_delete(path: Path<i64>, http_request: HttpRequest, app_state: web::Data<AppState>) -> Result<HttpResponse, ApplicationError> {
    let span = tracing::Span::current();
    let webhook_id = path.into_inner();
    let webhook = app_state.weather_handler.delete_webhook(webhook_id).instrument(span).await?;
    Ok(HttpResponse::Ok().json(WebhookResponse::from(webhook)))
}

/**
 * Registers all endpoints together with extractor configs answering malformed input with the error envelope.
 */
pub fn configure(config: &mut web::ServiceConfig) {
    config
        .app_data(web::JsonConfig::default().error_handler(|err, _request| ApplicationError::new(ErrorType::Validation, format!("Invalid request body: {err}")).into()))
        .app_data(web::PathConfig::default().error_handler(|err, _request| ApplicationError::new(ErrorType::Validation, format!("Invalid path parameter: {err}")).into()))
        .service(city_add)
        .service(city_update)
        .service(city_delete)
        .service(forecast_get)
        .service(temperature_add)
        .service(webhook_add)
        .service(webhook_delete);
}

/**
 * Retrieves the trace ID from the HTTP request headers.
 * If the trace ID is not present, a new UUID is generated.
 */
fn get_trace_id(http_request: &HttpRequest) -> String {
    http_request.headers().get("X-Trace-ID").and_then(|v| v.to_str().ok().map(std::string::ToString::to_string)).unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod test {
    use std::{sync::Arc, time::Duration};

    use actix_web::{
        App,
        http::StatusCode,
        test::{self, TestRequest},
    };
    use serde_json::{Value, json};
    use wiremock::{Mock, MockServer, ResponseTemplate, matchers::method};

    use super::*;
    use crate::{
        events::{
            bus::{EventBus, TEMPERATURE_CREATED},
            metrics::EventMetrics,
            webhooks::WebhookDispatcher,
        },
        model::models::Temperature,
        service::{handler::WeatherHandler, memory::InMemoryWeatherService},
    };

    fn app_state() -> web::Data<AppState> {
        let store = Arc::new(InMemoryWeatherService::new());
        let metrics = EventMetrics::new().unwrap();
        let mut event_bus: EventBus<Temperature> = EventBus::new(None, metrics.clone());
        let dispatcher = WebhookDispatcher::new(store.clone(), Duration::from_secs(2), "weather_api-test", metrics).unwrap();
        event_bus.register(TEMPERATURE_CREATED, Arc::new(dispatcher));
        web::Data::new(AppState::new(WeatherHandler::new(store, Arc::new(event_bus))))
    }

    fn city_request(body: Value) -> TestRequest {
        TestRequest::post().uri("/cities").set_json(body)
    }

    #[actix_web::test]
    async fn test_get_trace_id_exists() {
        let request = TestRequest::default().insert_header(("X-Trace-ID", "test")).to_http_request();
        let trace_id = get_trace_id(&request);
        assert_eq!(trace_id, "test");
    }

    #[actix_web::test]
    async fn test_get_trace_id_not_exists() {
        let request = TestRequest::default().to_http_request();
        let trace_id = get_trace_id(&request);
        assert!(!trace_id.is_empty());
    }

    #[actix_web::test]
    async fn test_city_lifecycle() {
        let app = test::init_service(App::new().app_data(app_state()).configure(configure)).await;
        let created: Value = test::call_and_read_body_json(&app, city_request(json!({"name": "Oslo", "latitude": 59.91, "longitude": 10.75})).to_request()).await;
        let city_id = created["id"].as_i64().unwrap();
        let again: Value = test::call_and_read_body_json(&app, city_request(json!({"name": "Oslo", "latitude": 1.0, "longitude": 1.0})).to_request()).await;
        assert_eq!(again, created);

        let request = TestRequest::patch().uri(&format!("/cities/{city_id}")).set_json(json!({"latitude": 60.0})).to_request();
        let updated: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(updated, json!({"id": city_id, "name": "Oslo", "latitude": 60.0, "longitude": 10.75}));

        let request = TestRequest::delete().uri(&format!("/cities/{city_id}")).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::OK);

        let request = TestRequest::patch().uri(&format!("/cities/{city_id}")).set_json(json!({"name": "Bergen"})).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body, json!({"status": false, "message": "request failure"}));
    }

    #[actix_web::test]
    async fn test_invalid_input_uses_error_envelope() {
        let app = test::init_service(App::new().app_data(app_state()).configure(configure)).await;
        let request = city_request(json!({"latitude": 1.0, "longitude": 1.0})).to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body, json!({"status": false, "message": "request failure"}));

        let request = TestRequest::delete().uri("/webhooks/abc").to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let request = TestRequest::post().uri("/temperatures").insert_header(("content-type", "application/json")).set_payload("{not json").to_request();
        let response = test::call_service(&app, request).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = test::read_body_json(response).await;
        assert_eq!(body["status"], json!(false));
    }

    #[actix_web::test]
    async fn test_temperature_notifies_webhooks_and_updates_forecast() {
        let server = MockServer::start().await;
        Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(1).mount(&server).await;
        let app = test::init_service(App::new().app_data(app_state()).configure(configure)).await;
        let city: Value = test::call_and_read_body_json(&app, city_request(json!({"name": "Oslo", "latitude": 59.91, "longitude": 10.75})).to_request()).await;
        let city_id = city["id"].as_i64().unwrap();

        let request = TestRequest::post().uri("/webhooks").set_json(json!({"city_id": city_id.to_string(), "callback_url": format!("{}/hook", server.uri())})).to_request();
        let webhook: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(webhook["city_id"], json!(city_id));

        let request = TestRequest::post().uri("/temperatures").set_json(json!({"city_id": city_id, "max": 18, "min": 9})).to_request();
        let temperature: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(temperature["max"], json!(18));
        assert!(temperature["timestamp"].as_i64().unwrap() > 0);

        let mut delivered = Vec::new();
        for _ in 0..200 {
            delivered = server.received_requests().await.unwrap();
            if !delivered.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(delivered.len(), 1);
        let body: Value = delivered[0].body_json().unwrap();
        assert_eq!(body, json!({"city_id": city_id, "max": 18, "min": 9, "timestamp": temperature["timestamp"]}));

        let request = TestRequest::get().uri(&format!("/forecasts/{city_id}")).to_request();
        let forecast: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(forecast, json!({"city_id": city_id, "max": 18.0, "min": 9.0, "sample": 1}));

        let webhook_id = webhook["id"].as_i64().unwrap();
        let request = TestRequest::delete().uri(&format!("/webhooks/{webhook_id}")).to_request();
        let deleted: Value = test::call_and_read_body_json(&app, request).await;
        assert_eq!(deleted, webhook);
    }
}
