pub mod app_config;
pub mod config;
pub mod request;
pub mod shipment;

use thiserror::Error;

pub use app_config::{AppConfig, Environment, PurolatorCredentials, StoreBackend, UpsCredentials};
pub use config::{load_app_config, load_app_config_from_env};
pub use request::{DateRangeError, TrackOptions, TrackRequest};
pub use shipment::{
    Address, CanonicalEvent, CanonicalPackage, CanonicalResponse, CanonicalShipment, Location,
    ResponseStatus,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid response status: {0}")]
    InvalidResponseStatus(String),
}
