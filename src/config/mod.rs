//! Configuration management: models, multi-source loading, validation

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::ConfigLoader;
pub use models::AppConfig;
pub use validation::ValidationResult;
