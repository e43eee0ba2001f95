//! Built-in node strategies.
//!
//! Enough to assemble a useful pipeline out of the box: the metadata
//! store node, a filesystem resource, and a couple of simple actions.

use anacostia_node::base::{NodeDispatcher, RegisterNodeError};

mod filesystem;
mod logmetric;
mod noop;
mod store;

pub use filesystem::FilesystemResource;

/// Register all nodes in this module into the given dispatcher.
pub fn register(dispatcher: &mut NodeDispatcher) -> Result<(), RegisterNodeError> {
	dispatcher.register_node("MetadataStore", Box::new(store::StoreBuilder {}))?;
	dispatcher.register_node("FilesystemResource", Box::new(filesystem::FilesystemBuilder {}))?;
	dispatcher.register_node("Noop", Box::new(noop::NoopBuilder {}))?;
	dispatcher.register_node("LogMetric", Box::new(logmetric::LogMetricBuilder {}))?;

	return Ok(());
}
