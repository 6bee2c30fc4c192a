use actix_web_prom::PrometheusMetrics;
use prometheus::{IntCounter, IntGauge};

use crate::model::apperror::{ApplicationError, ErrorType};

/**
 * Prometheus metrics of the event bus and the webhook dispatcher.
 */
#[derive(Clone)]
pub struct EventMetrics {
    /**
     * Listener invocations currently running.
     */
    pub listeners_in_flight: IntGauge,
    /**
     * Listener invocations that returned an error, panicked or were cancelled.
     */
    pub listener_failures: IntCounter,
    /**
     * Webhook callbacks answered with a success status.
     */
    pub webhook_deliveries: IntCounter,
    /**
     * Webhook callbacks that failed or were answered with an error status.
     */
    pub webhook_delivery_failures: IntCounter,
}

impl EventMetrics {
    /**
     * Creates unregistered metrics.
     */
    pub fn new() -> Result<Self, ApplicationError> {
        Ok(EventMetrics {
            listeners_in_flight: IntGauge::new("event_listeners_in_flight", "Event listener invocations running").map_err(metric_error)?,
            listener_failures: IntCounter::new("event_listener_failures_total", "Failed event listener invocations").map_err(metric_error)?,
            webhook_deliveries: IntCounter::new("webhook_deliveries_total", "Delivered webhook callbacks").map_err(metric_error)?,
            webhook_delivery_failures: IntCounter::new("webhook_delivery_failures_total", "Failed webhook callbacks").map_err(metric_error)?,
        })
    }

    /**
     * Registers the metrics with the registry served on `/metrics`.
     */
    pub fn register(&self, prometheus_metrics: &PrometheusMetrics) -> Result<(), ApplicationError> {
        let registry = &prometheus_metrics.registry;
        registry.register(Box::new(self.listeners_in_flight.clone())).map_err(metric_error)?;
        registry.register(Box::new(self.listener_failures.clone())).map_err(metric_error)?;
        registry.register(Box::new(self.webhook_deliveries.clone())).map_err(metric_error)?;
        registry.register(Box::new(self.webhook_delivery_failures.clone())).map_err(metric_error)?;
        Ok(())
    }
}

fn metric_error(err: prometheus::Error) -> ApplicationError {
    ApplicationError::new(ErrorType::Initialization, format!("Failed to create event metric: {err}"))
}
