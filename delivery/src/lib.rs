//! Adaptive question delivery.
//!
//! Given a user, a difficulty and a session type, pick a bounded,
//! duplicate-free, adaptively weighted set of questions from the catalog.

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod pool;
pub mod sampler;
pub mod selector;
pub mod types;
pub mod validation;

pub use engine::DeliveryService;
pub use error::DeliveryError;
pub use types::{DeliveryMetadata, DeliveryOptions, DeliveryRequest, DeliveryResult, SessionType};
