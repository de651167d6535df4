//! Token-streamed invocations

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use toolrelay_transport::Transport;
use tracing::trace;

use super::core::ClientInner;
use super::correlator::{PendingGuard, TokenCallback, await_completion, object_parameters};
use crate::error::ClientResult;

/// Outcome of a completed stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSummary {
    /// Identifier the stream was correlated under
    pub request_id: String,
    /// Tokens delivered to the callback
    pub tokens: usize,
}

impl<T: Transport + 'static> ClientInner<T> {
    pub(crate) async fn invoke_stream(
        self: &Arc<Self>,
        tool: &str,
        parameters: Value,
        on_token: TokenCallback,
        deadline: Option<Duration>,
    ) -> ClientResult<StreamSummary> {
        let parameters = object_parameters(parameters)?;
        self.ensure_connected().await?;

        let (request_id, done) = self
            .pending
            .register_stream(tool, parameters.clone(), on_token);
        let _guard = PendingGuard::new(&self.pending, &request_id);

        let frame = self.frame_for(&request_id, tool, parameters, true);
        self.send_frame(&frame).await?;
        trace!(request_id = %request_id, tool, "stream requested");

        await_completion(done, &request_id, deadline).await
    }
}
