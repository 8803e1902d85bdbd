//! Control over the local broadcasting application (OBS Studio via obs-websocket).

use crate::error::Result;

pub mod client;
pub mod protocol;

pub use client::ObsClient;

/// Whether the controller is currently sending a stream.
///
/// Always fetched fresh; never hold on to one across steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastStatus {
    pub active: bool,
}

/// The local broadcast controller, as the go-live flow sees it.
///
/// `start` and `stop` only promise that the request was accepted. Callers must check
/// [`BroadcastController::query_status`] first: starting an active stream (or stopping an
/// inactive one) is the caller's mistake, not something implementations smooth over.
#[allow(async_fn_in_trait)]
pub trait BroadcastController {
    async fn query_status(&self) -> Result<BroadcastStatus>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;
}

/// Stops the stream if, and only if, it is currently live. Returns whether a stop was requested.
pub async fn stop_if_live(controller: &impl BroadcastController) -> Result<bool> {
    if !controller.query_status().await?.active {
        tracing::debug!("stream not active, nothing to stop");
        return Ok(false);
    }
    controller.stop().await?;
    Ok(true)
}
