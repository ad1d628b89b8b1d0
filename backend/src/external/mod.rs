//! External API integrations

pub mod http;
pub mod imagery;
pub mod npy;
pub mod weather;

pub use http::RetryingFetcher;
pub use imagery::{CaptureHandle, ImageryClient, ImagerySession, ImagerySource};
pub use weather::{ForecastSource, WeatherClient};
