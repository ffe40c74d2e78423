pub mod api;
pub mod batch_service;
pub mod config;
pub mod errors;
pub mod grading_service;
pub mod llm_providers;
pub mod logging;
pub mod models;
pub mod webhook_service;


pub use batch_service::BatchService;
pub use config::Config;
pub use errors::*;
pub use grading_service::{GradingService, GradingSettings};
pub use llm_providers::{GradingEngine, GradingEngineFactory, JsonResponseParser, LLMProviderType};
pub use models::*;
pub use webhook_service::{DeliveryService, DeliverySettings};
