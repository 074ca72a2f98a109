use crate::shared::pixel_format::FourCc;

/// Dictionary key under which a submission's PTS travels to the engine and back.
pub const PTS_TAG_KEY: &str = "FF_VDA_DECODER_PTS_KEY";

/// Status reported when a failure has no native engine code behind it.
pub const GENERIC_FAILURE_STATUS: i32 = -1;

/// 8-bit 4:2:2 YpCbCr, the output format decoded buffers must carry by default.
pub const DEFAULT_OUTPUT_FORMAT: FourCc = FourCc::from_bytes(*b"2vuy");

/// H.264 with avcC extradata.
pub const DEFAULT_SOURCE_FORMAT: FourCc = FourCc::from_bytes(*b"avc1");

/// Worker threads the simulated engine uses when none are requested.
pub const DEFAULT_SIMULATED_WORKERS: usize = 2;

/// Pending submissions an engine accepts before `submit` blocks.
pub const DEFAULT_SUBMIT_CAPACITY: usize = 16;
