//! Carrier adapters and the registry that resolves them by id.
//!
//! Each carrier module pairs a transport client (which implements
//! [`CarrierAdapter`]) with a pure normalizer from that carrier's payload to
//! the canonical model in `trackdb-core`.

pub mod adapter;
pub mod error;
pub mod fields;
pub mod purolator;
pub mod registry;
pub(crate) mod retry;
pub mod ups;
pub mod xml;

pub use adapter::{CarrierAdapter, ClientSettings, RawPayload};
pub use error::CarrierError;
pub use purolator::PurolatorClient;
pub use registry::CarrierRegistry;
pub use ups::UpsClient;

/// Registry id of the Purolator adapter.
pub const PUROLATOR: &str = "purolator";
/// Registry id of the UPS adapter.
pub const UPS: &str = "ups";
