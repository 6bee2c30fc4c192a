use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    events::{bus::EventListener, metrics::EventMetrics},
    model::{
        apperror::{ApplicationError, ErrorType},
        models::{Temperature, Webhook},
    },
    service::weather::WeatherService,
};

/**
 * Body posted to every webhook of the city a temperature was recorded for.
 */
#[derive(Debug, Serialize)]
pub struct WebhookPayload {
    pub city_id: i64,
    pub max: i32,
    pub min: i32,
    pub timestamp: i64,
}

impl From<&Temperature> for WebhookPayload {
    fn from(temperature: &Temperature) -> Self {
        WebhookPayload { city_id: temperature.city_id, max: temperature.max, min: temperature.min, timestamp: temperature.timestamp }
    }
}

/**
 * Listener delivering new temperatures to the webhooks of their city.
 *
 * Deliveries are best effort: each webhook is called once, in fetch order, and a failed call is only logged.
 */
pub struct WebhookDispatcher {
    weather_service: Arc<dyn WeatherService>,
    http_client: reqwest::Client,
    metrics: EventMetrics,
}

impl WebhookDispatcher {
    /**
     * Creates a new instance of `WebhookDispatcher`.
     *
     * # Arguments
     * `weather_service`: Store to read the webhooks of a city from.
     * `timeout`: Timeout of a single callback.
     * `user_agent`: User agent header sent with callbacks.
     * `metrics`: Delivery counters.
     */
    pub fn new(weather_service: Arc<dyn WeatherService>, timeout: Duration, user_agent: &str, metrics: EventMetrics) -> Result<Self, ApplicationError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|err| ApplicationError::new(ErrorType::Initialization, format!("Failed to build webhook http client: {err}")))?;
        Ok(WebhookDispatcher { weather_service, http_client, metrics })
    }

    async fn deliver(&self, webhook: &Webhook, body: Vec<u8>) -> Result<(), ApplicationError> {
        let response = self
            .http_client
            .post(&webhook.callback_url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|err| ApplicationError::new(ErrorType::DeliveryFailure, format!("Failed to call webhook {}: {err}", webhook.id)))?;
        response.error_for_status().map_err(|err| ApplicationError::new(ErrorType::DeliveryFailure, format!("Webhook {} answered with error: {err}", webhook.id)))?;
        Ok(())
    }
}

#[async_trait]
impl EventListener<Temperature> for WebhookDispatcher {
    fn name(&self) -> &'static str {
        "webhook_dispatcher"
    }

    async fn on_event(&self, temperature: Temperature, scope: CancellationToken) -> Result<(), ApplicationError> {
        info!("Making callback requests for temperature {}", temperature.id);
        let webhooks = self.weather_service.get_city_webhooks(temperature.city_id).await.map_err(|err| err.context("temperature listener: unable to fetch webhooks"))?;
        let body = serde_json::to_vec(&WebhookPayload::from(&temperature))
            .map_err(|err| ApplicationError::new(ErrorType::Application, format!("temperature listener: unable to serialize payload: {err}")))?;
        for webhook in &webhooks {
            if scope.is_cancelled() {
                warn!("Stopped delivering temperature {} before webhook {}", temperature.id, webhook.id);
                break;
            }
            match self.deliver(webhook, body.clone()).await {
                Ok(()) => {
                    self.metrics.webhook_deliveries.inc();
                    debug!("Delivered temperature {} to webhook {}", temperature.id, webhook.id);
                }
                Err(err) => {
                    self.metrics.webhook_delivery_failures.inc();
                    error!("Issue posting callback data: {err}");
                }
            }
        }
        Ok(())
    }
}
