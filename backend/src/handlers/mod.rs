//! HTTP request handlers

pub mod health;
pub mod risk;
pub mod weather;

pub use health::health_check;
pub use risk::get_risk;
pub use weather::{get_forecast_csv, get_weather_summary};
