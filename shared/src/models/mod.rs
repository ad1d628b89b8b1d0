//! Domain models for the wildfire risk pipeline

mod capture;
mod color;
mod raster;
mod risk;
mod weather;

pub use capture::*;
pub use color::*;
pub use raster::*;
pub use risk::*;
pub use weather::*;
