//! Connectors materialise remote edges between pipelines.
//!
//! Each remote edge has a sender on the predecessor's pipeline and a
//! receiver on the successor's. The receiver side is served by the
//! daemon's HTTP handlers; this crate provides the wire types, the
//! sender, the receiver's peer registry, and HTTP mirrors of the
//! metadata/resource contracts.

pub mod errors;
pub mod wire;

mod metadata;
mod registry;
mod resource;
mod sender;

pub use metadata::HttpMetadataClient;
pub use registry::PeerRegistry;
pub use resource::HttpResourceClient;
pub use sender::{ConnectorSender, RetryConfig};
