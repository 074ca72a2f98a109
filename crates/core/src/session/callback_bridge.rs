use std::sync::Arc;

use crate::decode::domain::decode_engine::CompletionSink;
use crate::decode::domain::decoded_frame::DecodedFrame;
use crate::decode::domain::frame_queue::{FrameQueue, QueueClosed};
use crate::decode::domain::image_buffer::ImageBuffer;
use crate::decode::domain::pts_tag::{recover_pts, PtsTag};
use crate::session::session_observer::{DropReason, SessionObserver};
use crate::shared::hardware_status::HardwareStatus;
use crate::shared::pixel_format::FourCc;

/// Completion handler registered with the engine when a session opens.
///
/// Accepts only images in the session's output format and files them into
/// the frame queue by PTS. Anything else is dropped without touching the
/// queue and reported to the observer.
pub struct CallbackBridge {
    queue: Arc<FrameQueue>,
    output_format: FourCc,
    observer: Arc<dyn SessionObserver>,
}

impl CallbackBridge {
    pub fn new(
        queue: Arc<FrameQueue>,
        output_format: FourCc,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            queue,
            output_format,
            observer,
        }
    }
}

impl CompletionSink for CallbackBridge {
    fn on_complete(
        &self,
        tag: Option<Arc<PtsTag>>,
        status: HardwareStatus,
        image: Option<Arc<dyn ImageBuffer>>,
    ) {
        let pts = recover_pts(tag.as_deref());
        drop(tag);

        if !status.is_ok() {
            log::debug!("Completion for pts={pts} reported {status}");
        }

        let Some(image) = image else {
            self.observer.frame_dropped(pts, DropReason::MissingImage);
            return;
        };

        let actual = image.pixel_format();
        if actual != self.output_format {
            self.observer.frame_dropped(
                pts,
                DropReason::FormatMismatch {
                    expected: self.output_format,
                    actual,
                },
            );
            return;
        }

        match self.queue.push(DecodedFrame::new(image, pts)) {
            Ok(()) => self.observer.frame_queued(pts, self.queue.len()),
            Err(QueueClosed(frame)) => {
                drop(frame);
                self.observer.frame_dropped(pts, DropReason::SessionClosed);
            }
        }
    }
}
