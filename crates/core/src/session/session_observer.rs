use std::sync::atomic::{AtomicU64, Ordering};

use crate::shared::pixel_format::FourCc;

/// Why a completion never made it into the frame queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// The engine completed without an image (decode error, skipped frame).
    MissingImage,
    /// The image is not in the session's output format.
    FormatMismatch { expected: FourCc, actual: FourCc },
    /// The completion arrived after the session was torn down.
    SessionClosed,
}

/// Observability hook for the completion path.
///
/// Dropped completions are otherwise silent; an observer is how a caller
/// learns that a given PTS will never be popped. Called from engine threads,
/// never while the queue lock is held.
pub trait SessionObserver: Send + Sync {
    /// A decoded frame was queued; `depth` is the queue length after insert.
    fn frame_queued(&self, pts: i64, depth: usize);

    /// A completion was discarded. `pts` is the recovered PTS (0 if the tag
    /// was missing).
    fn frame_dropped(&self, pts: i64, reason: DropReason);
}

/// Observer that discards all events. The default for new sessions.
pub struct NullSessionObserver;

impl SessionObserver for NullSessionObserver {
    fn frame_queued(&self, _pts: i64, _depth: usize) {}
    fn frame_dropped(&self, _pts: i64, _reason: DropReason) {}
}

/// Reports drops through the `log` facade and keeps running counts.
#[derive(Default)]
pub struct LoggingSessionObserver {
    queued: AtomicU64,
    missing_image: AtomicU64,
    format_mismatch: AtomicU64,
    after_close: AtomicU64,
}

impl LoggingSessionObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.missing_image.load(Ordering::Relaxed)
            + self.format_mismatch.load(Ordering::Relaxed)
            + self.after_close.load(Ordering::Relaxed)
    }

    /// One-line summary for end-of-run reporting.
    pub fn summary_string(&self) -> String {
        format!(
            "queued {}, dropped {} (missing image {}, format mismatch {}, after close {})",
            self.queued(),
            self.dropped(),
            self.missing_image.load(Ordering::Relaxed),
            self.format_mismatch.load(Ordering::Relaxed),
            self.after_close.load(Ordering::Relaxed),
        )
    }
}

impl SessionObserver for LoggingSessionObserver {
    fn frame_queued(&self, pts: i64, depth: usize) {
        self.queued.fetch_add(1, Ordering::Relaxed);
        log::trace!("Queued frame pts={pts} (depth {depth})");
    }

    fn frame_dropped(&self, pts: i64, reason: DropReason) {
        match reason {
            DropReason::MissingImage => {
                self.missing_image.fetch_add(1, Ordering::Relaxed);
                log::debug!("Dropped frame pts={pts}: engine returned no image");
            }
            DropReason::FormatMismatch { expected, actual } => {
                self.format_mismatch.fetch_add(1, Ordering::Relaxed);
                log::warn!("Dropped frame pts={pts}: pixel format {actual}, expected {expected}");
            }
            DropReason::SessionClosed => {
                self.after_close.fetch_add(1, Ordering::Relaxed);
                log::debug!("Dropped frame pts={pts}: session already closed");
            }
        }
    }
}
