use std::fmt;
use std::sync::Arc;

use crate::decode::domain::image_buffer::ImageBuffer;

/// A decoded image tagged with the PTS of the submission that produced it.
///
/// Holds one retained reference to the image buffer. Dropping the frame
/// releases that reference.
pub struct DecodedFrame {
    buffer: Arc<dyn ImageBuffer>,
    pts: i64,
}

impl DecodedFrame {
    pub fn new(buffer: Arc<dyn ImageBuffer>, pts: i64) -> Self {
        Self { buffer, pts }
    }

    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn buffer(&self) -> &Arc<dyn ImageBuffer> {
        &self.buffer
    }

    /// Hands the buffer reference over to the caller.
    pub fn into_buffer(self) -> Arc<dyn ImageBuffer> {
        self.buffer
    }
}

impl fmt::Debug for DecodedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedFrame")
            .field("pts", &self.pts)
            .field("format", &self.buffer.pixel_format())
            .field("width", &self.buffer.width())
            .field("height", &self.buffer.height())
            .finish()
    }
}
