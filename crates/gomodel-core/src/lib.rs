//! Gateway assembly: configuration, the model router and process state.

pub mod bootstrap;
pub mod config;
pub mod router;
pub mod state;

pub use bootstrap::{Gateway, bootstrap};
pub use config::{Config, ConfigError};
pub use router::ModelRouter;
pub use state::{GatewayState, SharedState};
