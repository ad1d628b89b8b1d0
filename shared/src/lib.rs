//! Shared types and models for the FireWatch wildfire risk platform
//!
//! This crate contains the pure part of the risk-estimation pipeline, shared
//! between the backend and browser clients (via WASM).

pub mod error;
pub mod models;
pub mod types;
pub mod validation;

pub use error::*;
pub use models::*;
pub use types::*;
pub use validation::*;
