//! Tool discovery for chat turns.

use super::{ToolHost, ToolSpec};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::debug;

/// Read-only view of the tools a provider currently offers.
///
/// Nothing is cached: each call re-queries the host.
pub struct ToolDirectory<H> {
    host: Arc<H>,
}

impl<H> Clone for ToolDirectory<H> {
    fn clone(&self) -> Self {
        Self {
            host: Arc::clone(&self.host),
        }
    }
}

impl<H: ToolHost> ToolDirectory<H> {
    pub fn new(host: Arc<H>) -> Self {
        Self { host }
    }

    /// List the provider's tools in the shape the completion call expects.
    ///
    /// Fails with [`Error::ToolProviderUnavailable`] when the provider cannot
    /// be reached or hands back a tool without a name.
    pub async fn list_tools(&self) -> Result<Vec<ToolSpec>> {
        let specs = self
            .host
            .list_tools()
            .await
            .map_err(|e| Error::ToolProviderUnavailable(e.to_string()))?;

        if let Some(position) = specs.iter().position(|spec| spec.name.trim().is_empty()) {
            return Err(Error::ToolProviderUnavailable(format!(
                "tool at position {position} has no name"
            )));
        }

        debug!(count = specs.len(), "tool directory refreshed");
        Ok(specs)
    }

    /// Names of the provider's current tools, in provider order.
    pub async fn tool_names(&self) -> Result<Vec<String>> {
        Ok(self
            .list_tools()
            .await?
            .into_iter()
            .map(|spec| spec.name)
            .collect())
    }
}
