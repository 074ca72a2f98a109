#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_engine;
#[cfg(feature = "ffmpeg")]
pub mod ffmpeg_packet_source;
pub mod pixel_buffer;
pub mod simulated_engine;
