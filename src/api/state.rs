use crate::service::handler::WeatherHandler;

/**
* Represents the application state shared across the Actix web application.
*/
pub struct AppState {
    /**
     * Handler for the weather operations.
     */
    pub weather_handler: WeatherHandler,
}

/**
 * Creates a new instance of `AppState`.
 *
 * # Arguments
 * `weather_handler`: Handler for the weather operations.
 */
impl AppState {
    pub fn new(weather_handler: WeatherHandler) -> Self {
        AppState { weather_handler }
    }
}
