use std::sync::Arc;

use crate::decode::domain::image_buffer::ImageBuffer;
use crate::decode::domain::pts_tag::PtsTag;
use crate::shared::decoder_config::DecoderConfig;
use crate::shared::hardware_status::HardwareStatus;

/// Receives decode completions from an engine.
///
/// Called on engine-owned threads, possibly concurrently and in any order.
/// `tag` is the dictionary given to [`DecodeHandle::submit`], echoed back.
pub trait CompletionSink: Send + Sync {
    fn on_complete(
        &self,
        tag: Option<Arc<PtsTag>>,
        status: HardwareStatus,
        image: Option<Arc<dyn ImageBuffer>>,
    );
}

/// Factory for decode sessions on a particular decoder (hardware or not).
pub trait DecodeEngine: Send + Sync {
    /// Installs the engine's process-wide lock-manager hook.
    ///
    /// Called at most once per process by the session layer. Engines that
    /// need no such hook keep the default.
    fn install_lock_manager(&self) -> Result<(), HardwareStatus> {
        Ok(())
    }

    /// Opens a decode session. Completions for it go to `sink` until the
    /// returned handle is closed.
    fn open(
        &self,
        config: &DecoderConfig,
        sink: Arc<dyn CompletionSink>,
    ) -> Result<Box<dyn DecodeHandle>, HardwareStatus>;
}

/// An open decode session owned by exactly one `DecoderSession`.
///
/// `Sync` so that a session can be shared by threads that only pop.
pub trait DecodeHandle: Send + Sync {
    /// Queues `bitstream` for asynchronous decode. Success means accepted,
    /// not decoded.
    fn submit(&mut self, bitstream: &[u8], tag: Arc<PtsTag>) -> Result<(), HardwareStatus>;

    /// Blocks until every accepted submission has reached the sink, including
    /// frames the engine is holding back for reordering.
    fn flush(&mut self) -> Result<(), HardwareStatus> {
        Ok(())
    }

    /// Stops the session. No completion may reach the sink once this returns.
    fn close(&mut self) -> Result<(), HardwareStatus>;
}
