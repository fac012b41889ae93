pub mod loader;
pub mod models;
pub mod routes;
pub mod validation;

pub use loader::{EnvOverrides, load_config, load_config_with};
pub use models::*;
pub use routes::{RouteCompileError, compile_routes};
pub use validation::{ServerConfigValidator, ValidationError, ValidationResult};
