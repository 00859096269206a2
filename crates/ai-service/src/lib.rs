pub mod client;
pub mod mock;
pub mod models;

pub use client::{validate_model_config, HttpPromptProvider};
pub use mock::MockPromptProvider;
pub use models::{ModelConfig, ModelManager, ModelType};
