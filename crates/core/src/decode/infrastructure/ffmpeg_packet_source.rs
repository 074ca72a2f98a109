use std::path::Path;

use crate::decode::infrastructure::ffmpeg_engine::fourcc_for;
use crate::shared::decoder_config::DecoderConfig;

/// One compressed access unit as stored in the container.
#[derive(Debug, Clone)]
pub struct EncodedPacket {
    pub data: Vec<u8>,
    /// Presentation timestamp in stream time-base units. Packets without one
    /// fall back to their decode timestamp, then to 0.
    pub pts: i64,
}

/// Demuxes the best video stream of a container file into packets and the
/// decoder configuration needed to decode them.
pub struct FfmpegPacketSource {
    input_ctx: ffmpeg_next::format::context::Input,
    stream_index: usize,
    config: DecoderConfig,
}

// Safety: FfmpegPacketSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegPacketSource {}

impl FfmpegPacketSource {
    pub fn open(path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;

        let input_ctx = ffmpeg_next::format::input(path)?;
        let stream = input_ctx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;

        let stream_index = stream.index();
        let parameters = stream.parameters();
        let source_format = fourcc_for(parameters.id())
            .ok_or_else(|| format!("Unsupported codec: {:?}", parameters.id()))?;
        let extradata = read_extradata(&parameters);

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(parameters)?;
        let decoder = codec_ctx.decoder().video()?;

        let config = DecoderConfig::new(decoder.width(), decoder.height(), extradata)
            .with_source_format(source_format);

        log::info!(
            "Opened {}: {}x{} {}, {} bytes of codec extradata",
            path.display(),
            config.width,
            config.height,
            config.source_format,
            config.extradata.len()
        );

        Ok(Self {
            input_ctx,
            stream_index,
            config,
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Packets of the selected stream in decode order.
    pub fn packets(&mut self) -> impl Iterator<Item = EncodedPacket> + '_ {
        let stream_index = self.stream_index;
        self.input_ctx
            .packets()
            .filter(move |(stream, _)| stream.index() == stream_index)
            .filter_map(|(_, packet)| {
                let data = packet.data()?.to_vec();
                let pts = packet.pts().or(packet.dts()).unwrap_or(0);
                Some(EncodedPacket { data, pts })
            })
    }
}

fn read_extradata(parameters: &ffmpeg_next::codec::Parameters) -> Vec<u8> {
    // SAFETY: the parameters belong to a stream of an open input context;
    // extradata is either null or valid for extradata_size bytes.
    unsafe {
        let raw = parameters.as_ptr();
        let size = (*raw).extradata_size;
        if (*raw).extradata.is_null() || size <= 0 {
            return Vec::new();
        }
        std::slice::from_raw_parts((*raw).extradata, size as usize).to_vec()
    }
}
