pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod observability;
pub mod server;

pub use config::{AppConfig, CognitoSettings, LoggingConfig, ProvisioningSettings, ServerConfig};
pub use error::ApiError;
pub use observability::init_tracing;
pub use server::{AppState, PoolgateServer, ServerBuilder, build_app, build_router};
