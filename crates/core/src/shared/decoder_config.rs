use crate::shared::constants::{DEFAULT_OUTPUT_FORMAT, DEFAULT_SOURCE_FORMAT};
use crate::shared::pixel_format::FourCc;

/// Parameters a decode engine is opened with.
///
/// `extradata` is the codec configuration record (avcC for H.264) and is
/// forwarded to the engine untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DecoderConfig {
    pub width: u32,
    pub height: u32,
    pub source_format: FourCc,
    pub output_format: FourCc,
    pub extradata: Vec<u8>,
}

impl DecoderConfig {
    pub fn new(width: u32, height: u32, extradata: Vec<u8>) -> Self {
        Self {
            width,
            height,
            source_format: DEFAULT_SOURCE_FORMAT,
            output_format: DEFAULT_OUTPUT_FORMAT,
            extradata,
        }
    }

    pub fn with_source_format(mut self, source_format: FourCc) -> Self {
        self.source_format = source_format;
        self
    }

    pub fn with_output_format(mut self, output_format: FourCc) -> Self {
        self.output_format = output_format;
        self
    }
}
