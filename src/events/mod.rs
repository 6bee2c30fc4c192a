pub mod bus;
pub mod metrics;
pub mod webhooks;
