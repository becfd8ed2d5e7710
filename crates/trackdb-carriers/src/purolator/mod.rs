//! Purolator: SOAP tracking service with HTTP basic auth.

mod client;
mod normalize;

pub use client::PurolatorClient;
pub use normalize::normalize;
