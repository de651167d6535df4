//! Registration and tool discovery run once per transport open.

use std::time::Duration;

use serde_json::{Map, Value, json};
use toolrelay_transport::Transport;
use tracing::{debug, info};

use super::core::ClientInner;
use crate::error::{ClientError, ClientResult};
use crate::events::ClientEvent;
use crate::tools::{ToolDescriptor, parse_tool_listing};

impl<T: Transport + 'static> ClientInner<T> {
    pub(crate) async fn handshake(&self) -> ClientResult<()> {
        let handshake = &self.config.handshake;
        let deadline = Some(handshake.timeout());

        let mut registration = Map::new();
        registration.insert("client_id".to_string(), json!(self.config.identity.agent));
        registration.insert(
            "capabilities".to_string(),
            json!(self.config.identity.capabilities),
        );
        self.request(&handshake.register_tool, registration, deadline, false)
            .await
            .map_err(|error| ClientError::Handshake(format!("registration failed: {error}")))?;
        debug!(tool = %handshake.register_tool, "registered");

        self.fetch_tools(deadline)
            .await
            .map_err(|error| ClientError::Handshake(format!("tool listing failed: {error}")))?;
        Ok(())
    }

    /// List tools and replace the available-tools view.
    pub(crate) async fn fetch_tools(&self, deadline: Option<Duration>) -> ClientResult<Vec<ToolDescriptor>> {
        let listing: Value = self
            .request(&self.config.handshake.list_tools_tool, Map::new(), deadline, false)
            .await?;
        let tools = parse_tool_listing(&listing).map_err(ClientError::Handshake)?;

        info!(count = tools.len(), "available tools updated");
        *self.tools.write() = tools.clone();
        self.events.emit(&ClientEvent::ToolsUpdated(tools.clone()));
        Ok(tools)
    }
}
