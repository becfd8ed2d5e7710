//! UPS: OAuth2 client-credentials + JSON Track API.

mod client;
mod normalize;

pub use client::UpsClient;
pub use normalize::normalize;
