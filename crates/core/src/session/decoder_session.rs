use std::sync::Arc;

use crate::decode::domain::decode_engine::{DecodeEngine, DecodeHandle};
use crate::decode::domain::decoded_frame::DecodedFrame;
use crate::decode::domain::frame_queue::FrameQueue;
use crate::decode::domain::pts_tag::PtsTag;
use crate::session::callback_bridge::CallbackBridge;
use crate::session::lock_registration::LockRegistration;
use crate::session::session_error::SessionError;
use crate::session::session_observer::{NullSessionObserver, SessionObserver};
use crate::shared::decoder_config::DecoderConfig;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Open,
    Closed,
}

/// One decode session: an engine handle plus the queue its completions
/// land in.
///
/// Lifecycle is `Uninitialized -> Open -> Closed`; a closed session cannot
/// be reopened. Frames come out of [`pop`](Self::pop) in non-decreasing PTS
/// order regardless of the order the engine completes them in.
///
/// `pop` takes `&self` and may be called from several threads at once;
/// `submit`, `flush` and `destroy` need exclusive access. A producer thread
/// that submits while other threads pop therefore needs the session behind
/// a lock of its own (e.g. `RwLock`, write for submit, read for pop).
pub struct DecoderSession {
    config: DecoderConfig,
    state: SessionState,
    handle: Option<Box<dyn DecodeHandle>>,
    queue: Option<Arc<FrameQueue>>,
    observer: Arc<dyn SessionObserver>,
}

impl DecoderSession {
    pub fn new(config: DecoderConfig) -> Self {
        Self {
            config,
            state: SessionState::Uninitialized,
            handle: None,
            queue: None,
            observer: Arc::new(NullSessionObserver),
        }
    }

    /// Replaces the observer that hears about queued and dropped frames.
    /// Takes effect at the next `open`.
    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Creates and opens a session in one step.
    pub fn create(config: DecoderConfig, engine: &dyn DecodeEngine) -> Result<Self, SessionError> {
        let mut session = Self::new(config);
        session.open(engine)?;
        Ok(session)
    }

    /// Opens the engine session, installing the process-wide lock manager
    /// first if no earlier session has.
    pub fn open(&mut self, engine: &dyn DecodeEngine) -> Result<(), SessionError> {
        self.open_with(LockRegistration::process(), engine)
    }

    /// Like [`open`](Self::open) but against an explicit registration scope.
    pub fn open_with(
        &mut self,
        registration: &LockRegistration,
        engine: &dyn DecodeEngine,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Uninitialized {
            return Err(SessionError::InvalidState {
                operation: "open",
                state: self.state,
            });
        }

        registration
            .ensure(|| engine.install_lock_manager())
            .map_err(SessionError::LockRegistration)?;

        let queue = Arc::new(FrameQueue::new());
        let bridge = CallbackBridge::new(
            Arc::clone(&queue),
            self.config.output_format,
            Arc::clone(&self.observer),
        );

        let handle = engine
            .open(&self.config, Arc::new(bridge))
            .map_err(SessionError::Configuration)?;

        log::info!(
            "Opened {}x{} {} decode session (output {})",
            self.config.width,
            self.config.height,
            self.config.source_format,
            self.config.output_format
        );

        self.handle = Some(handle);
        self.queue = Some(queue);
        self.state = SessionState::Open;
        Ok(())
    }

    /// Hands `bitstream` to the engine for asynchronous decode.
    ///
    /// Returning `Ok` means the engine accepted the unit. The decoded frame
    /// may still never appear (see [`SessionObserver`]).
    pub fn submit(&mut self, bitstream: &[u8], pts: i64) -> Result<(), SessionError> {
        let state = self.state;
        let Some(handle) = self.handle.as_mut().filter(|_| state == SessionState::Open) else {
            return Err(SessionError::InvalidState {
                operation: "submit to",
                state,
            });
        };

        let tag = Arc::new(PtsTag::new(pts));
        handle
            .submit(bitstream, tag)
            .map_err(SessionError::Submission)
    }

    /// Waits until every accepted submission has completed, so that all
    /// decodable frames are in the queue.
    pub fn flush(&mut self) -> Result<(), SessionError> {
        let state = self.state;
        let Some(handle) = self.handle.as_mut().filter(|_| state == SessionState::Open) else {
            return Err(SessionError::InvalidState {
                operation: "flush",
                state,
            });
        };
        handle.flush().map_err(SessionError::Flush)
    }

    /// Removes the decoded frame with the smallest PTS, if any. Never waits.
    pub fn pop(&self) -> Option<DecodedFrame> {
        if self.state != SessionState::Open {
            return None;
        }
        self.queue.as_ref()?.pop()
    }

    /// Closes the engine session and releases every queued frame.
    ///
    /// Cleanup always runs to completion and the session ends up `Closed`.
    /// A failure to close the engine is still reported. Calling this on a
    /// session that never opened, or twice, is a no-op.
    pub fn destroy(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Uninitialized {
            return Ok(());
        }

        let close_result = match self.handle.take() {
            Some(mut handle) => handle.close(),
            None => Ok(()),
        };

        if let Some(queue) = self.queue.take() {
            let released = queue.drain();
            log::debug!("Released {released} undelivered frames");
        }

        self.state = SessionState::Closed;

        close_result.map_err(|status| {
            log::warn!("Decode engine close failed: {status}");
            SessionError::Teardown(status)
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Frames decoded and waiting to be popped.
    pub fn queued_frames(&self) -> usize {
        self.queue.as_ref().map_or(0, |q| q.len())
    }
}

impl Drop for DecoderSession {
    fn drop(&mut self) {
        if self.state == SessionState::Open {
            if let Err(e) = self.destroy() {
                log::warn!("Decoder session dropped with failed teardown: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::domain::decode_engine::CompletionSink;
    use crate::decode::domain::image_buffer::ImageBuffer;
    use crate::decode::infrastructure::pixel_buffer::PixelBuffer;
    use crate::shared::hardware_status::HardwareStatus;
    use crate::shared::pixel_format::PixelLayout;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    type Submitted = Arc<Mutex<Vec<(Vec<u8>, Arc<PtsTag>)>>>;

    /// Engine that records submissions and completes nothing on its own.
    /// Tests fire completions through the captured sink.
    #[derive(Default)]
    struct FakeEngine {
        fail_install: Option<HardwareStatus>,
        fail_open: Option<HardwareStatus>,
        fail_submit: Option<HardwareStatus>,
        fail_close: Option<HardwareStatus>,
        sink: Mutex<Option<Arc<dyn CompletionSink>>>,
        submitted: Submitted,
        closes: Arc<AtomicUsize>,
        installs: AtomicUsize,
    }

    struct FakeHandle {
        fail_submit: Option<HardwareStatus>,
        fail_close: Option<HardwareStatus>,
        submitted: Submitted,
        closes: Arc<AtomicUsize>,
    }

    impl DecodeEngine for FakeEngine {
        fn install_lock_manager(&self) -> Result<(), HardwareStatus> {
            self.installs.fetch_add(1, Ordering::SeqCst);
            self.fail_install.map_or(Ok(()), Err)
        }

        fn open(
            &self,
            _config: &DecoderConfig,
            sink: Arc<dyn CompletionSink>,
        ) -> Result<Box<dyn DecodeHandle>, HardwareStatus> {
            if let Some(status) = self.fail_open {
                return Err(status);
            }
            *self.sink.lock().unwrap() = Some(sink);
            Ok(Box::new(FakeHandle {
                fail_submit: self.fail_submit,
                fail_close: self.fail_close,
                submitted: Arc::clone(&self.submitted),
                closes: Arc::clone(&self.closes),
            }))
        }
    }

    impl DecodeHandle for FakeHandle {
        fn submit(&mut self, bitstream: &[u8], tag: Arc<PtsTag>) -> Result<(), HardwareStatus> {
            if let Some(status) = self.fail_submit {
                return Err(status);
            }
            self.submitted.lock().unwrap().push((bitstream.to_vec(), tag));
            Ok(())
        }

        fn close(&mut self) -> Result<(), HardwareStatus> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.fail_close.map_or(Ok(()), Err)
        }
    }

    impl FakeEngine {
        /// Completes every recorded submission in reverse order.
        fn complete_all_reversed(&self) {
            let sink = self.sink.lock().unwrap().clone().unwrap();
            let submitted: Vec<_> = self.submitted.lock().unwrap().drain(..).collect();
            for (_, tag) in submitted.into_iter().rev() {
                let image: Arc<dyn ImageBuffer> =
                    Arc::new(PixelBuffer::filled(PixelLayout::Uyvy422, 2, 2, 0));
                sink.on_complete(Some(tag), HardwareStatus::OK, Some(image));
            }
        }
    }

    fn config() -> DecoderConfig {
        DecoderConfig::new(2, 2, vec![0x01, 0x64])
    }

    fn open(engine: &FakeEngine) -> DecoderSession {
        let mut session = DecoderSession::new(config());
        session.open_with(&LockRegistration::new(), engine).unwrap();
        session
    }

    #[test]
    fn test_open_transitions_to_open() {
        let engine = FakeEngine::default();
        let session = open(&engine);
        assert_eq!(session.state(), SessionState::Open);
        assert_eq!(session.queued_frames(), 0);
        assert!(session.pop().is_none());
    }

    #[test]
    fn test_create_uses_process_registration() {
        let engine = FakeEngine::default();
        let session = DecoderSession::create(config(), &engine).unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert!(LockRegistration::process().is_installed());
    }

    #[test]
    fn test_lock_manager_installed_once_across_sessions() {
        let registration = LockRegistration::new();
        let engine = FakeEngine::default();
        let mut first = DecoderSession::new(config());
        first.open_with(&registration, &engine).unwrap();
        let mut second = DecoderSession::new(config());
        second.open_with(&registration, &engine).unwrap();
        assert_eq!(engine.installs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_lock_registration_failure_leaves_session_uninitialized() {
        let engine = FakeEngine {
            fail_install: Some(HardwareStatus::new(1)),
            ..Default::default()
        };
        let mut session = DecoderSession::new(config());
        let err = session
            .open_with(&LockRegistration::new(), &engine)
            .unwrap_err();

        assert_eq!(err, SessionError::LockRegistration(HardwareStatus::new(1)));
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert!(engine.sink.lock().unwrap().is_none());
    }

    #[test]
    fn test_open_failure_is_configuration_error() {
        let engine = FakeEngine {
            fail_open: Some(HardwareStatus::new(-12473)),
            ..Default::default()
        };
        let mut session = DecoderSession::new(config());
        let err = session
            .open_with(&LockRegistration::new(), &engine)
            .unwrap_err();

        assert_eq!(err, SessionError::Configuration(HardwareStatus::new(-12473)));
        assert_eq!(err.code(), -12473);
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.queued_frames(), 0);
        assert!(session.destroy().is_ok());
    }

    #[test]
    fn test_double_open_is_rejected() {
        let engine = FakeEngine::default();
        let mut session = open(&engine);
        let err = session
            .open_with(&LockRegistration::new(), &engine)
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidState { state: SessionState::Open, .. }));
    }

    #[test]
    fn test_submit_forwards_bitstream_and_tag() {
        let engine = FakeEngine::default();
        let mut session = open(&engine);
        session.submit(&[0, 0, 0, 1, 0x65], 1001).unwrap();

        let submitted = engine.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].0, vec![0, 0, 0, 1, 0x65]);
        assert_eq!(submitted[0].1.pts(), Some(1001));
        // The session kept no reference of its own.
        assert_eq!(Arc::strong_count(&submitted[0].1), 1);
    }

    #[test]
    fn test_submit_rejection_is_submission_error() {
        let engine = FakeEngine {
            fail_submit: Some(HardwareStatus::new(-12911)),
            ..Default::default()
        };
        let mut session = open(&engine);
        let err = session.submit(&[1, 2, 3], 0).unwrap_err();
        assert_eq!(err, SessionError::Submission(HardwareStatus::new(-12911)));
        assert_eq!(session.state(), SessionState::Open);
    }

    #[test]
    fn test_out_of_order_completions_pop_in_pts_order() {
        let engine = FakeEngine::default();
        let mut session = open(&engine);
        for pts in [30, 10, 20] {
            session.submit(&[0xAB], pts).unwrap();
        }
        engine.complete_all_reversed();

        assert_eq!(session.queued_frames(), 3);
        assert_eq!(session.pop().map(|f| f.pts()), Some(10));
        assert_eq!(session.pop().map(|f| f.pts()), Some(20));
        assert_eq!(session.pop().map(|f| f.pts()), Some(30));
        assert!(session.pop().is_none());
    }

    #[test]
    fn test_flush_uses_engine_default() {
        let engine = FakeEngine::default();
        let mut session = open(&engine);
        assert!(session.flush().is_ok());
        session.destroy().unwrap();
        assert!(matches!(
            session.flush(),
            Err(SessionError::InvalidState { operation: "flush", .. })
        ));
    }

    #[test]
    fn test_destroy_closes_and_drains() {
        let engine = FakeEngine::default();
        let mut session = open(&engine);
        session.submit(&[1], 1).unwrap();
        session.submit(&[2], 2).unwrap();
        engine.complete_all_reversed();
        assert_eq!(session.queued_frames(), 2);

        session.destroy().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.queued_frames(), 0);
        assert_eq!(engine.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_reports_close_failure_but_still_cleans_up() {
        let engine = FakeEngine {
            fail_close: Some(HardwareStatus::new(-50)),
            ..Default::default()
        };
        let mut session = open(&engine);
        session.submit(&[1], 1).unwrap();
        engine.complete_all_reversed();

        let err = session.destroy().unwrap_err();
        assert_eq!(err, SessionError::Teardown(HardwareStatus::new(-50)));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.queued_frames(), 0);
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let engine = FakeEngine::default();
        let mut session = open(&engine);
        session.destroy().unwrap();
        session.destroy().unwrap();
        assert_eq!(engine.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_destroy_before_open_is_noop() {
        let mut session = DecoderSession::new(config());
        assert!(session.destroy().is_ok());
        assert_eq!(session.state(), SessionState::Uninitialized);
    }

    #[test]
    fn test_submit_after_destroy_fails_deterministically() {
        let engine = FakeEngine::default();
        let mut session = open(&engine);
        session.destroy().unwrap();

        for _ in 0..2 {
            let err = session.submit(&[1], 1).unwrap_err();
            assert_eq!(
                err,
                SessionError::InvalidState {
                    operation: "submit to",
                    state: SessionState::Closed,
                }
            );
        }
        assert!(engine.submitted.lock().unwrap().is_empty());
        assert!(session.pop().is_none());
    }

    #[test]
    fn test_reopen_after_destroy_is_rejected() {
        let engine = FakeEngine::default();
        let mut session = open(&engine);
        session.destroy().unwrap();
        assert!(session.open_with(&LockRegistration::new(), &engine).is_err());
    }

    #[test]
    fn test_late_completion_after_destroy_is_released() {
        let engine = FakeEngine::default();
        let mut session = open(&engine);
        session.destroy().unwrap();

        let sink = engine.sink.lock().unwrap().clone().unwrap();
        let image: Arc<dyn ImageBuffer> =
            Arc::new(PixelBuffer::filled(PixelLayout::Uyvy422, 2, 2, 0));
        sink.on_complete(
            Some(Arc::new(PtsTag::new(5))),
            HardwareStatus::OK,
            Some(Arc::clone(&image)),
        );
        assert_eq!(Arc::strong_count(&image), 1);
    }

    #[test]
    fn test_drop_closes_open_session() {
        let engine = FakeEngine::default();
        let session = open(&engine);
        drop(session);
        assert_eq!(engine.closes.load(Ordering::SeqCst), 1);
    }
}
