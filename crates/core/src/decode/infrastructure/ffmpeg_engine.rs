use std::collections::HashMap;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::decode::domain::decode_engine::{CompletionSink, DecodeEngine, DecodeHandle};
use crate::decode::domain::image_buffer::ImageBuffer;
use crate::decode::domain::pts_tag::PtsTag;
use crate::decode::infrastructure::pixel_buffer::PixelBuffer;
use crate::shared::constants::DEFAULT_SUBMIT_CAPACITY;
use crate::shared::decoder_config::DecoderConfig;
use crate::shared::hardware_status::HardwareStatus;
use crate::shared::pixel_format::{FourCc, PixelLayout};

/// Returned by `open` when the codec or output format has no libavcodec
/// counterpart.
pub const UNSUPPORTED_FORMAT: HardwareStatus = HardwareStatus::new(-12471);
/// Completion status for a submitted unit that produced no picture.
pub const NO_PICTURE: HardwareStatus = HardwareStatus::new(-12473);

/// Decode engine backed by libavcodec via ffmpeg-next.
///
/// Each session owns one decode thread. The libavcodec context is created
/// on that thread and never leaves it; `submit` only moves bytes and tags
/// across a channel. Completions are delivered from the decode thread.
pub struct FfmpegDecodeEngine {
    submit_capacity: usize,
}

impl FfmpegDecodeEngine {
    pub fn new() -> Self {
        Self {
            submit_capacity: DEFAULT_SUBMIT_CAPACITY,
        }
    }
}

impl Default for FfmpegDecodeEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DecodeEngine for FfmpegDecodeEngine {
    /// libavformat/libavcodec global initialisation.
    fn install_lock_manager(&self) -> Result<(), HardwareStatus> {
        ffmpeg_next::init().map_err(to_status)
    }

    fn open(
        &self,
        config: &DecoderConfig,
        sink: Arc<dyn CompletionSink>,
    ) -> Result<Box<dyn DecodeHandle>, HardwareStatus> {
        let codec_id = codec_id_for(config.source_format).ok_or(UNSUPPORTED_FORMAT)?;
        let layout = PixelLayout::from_fourcc(config.output_format).ok_or(UNSUPPORTED_FORMAT)?;

        let (command_tx, command_rx) =
            crossbeam_channel::bounded::<Command>(self.submit_capacity);
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), HardwareStatus>>(1);

        let config = config.clone();
        let thread = std::thread::spawn(move || {
            let decoder = match open_decoder(codec_id, &config) {
                Ok(decoder) => {
                    let _ = ready_tx.send(Ok(()));
                    decoder
                }
                Err(status) => {
                    let _ = ready_tx.send(Err(status));
                    return;
                }
            };
            DecodeLoop::new(decoder, layout, sink).run(command_rx);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Box::new(FfmpegHandle {
                commands: Some(command_tx),
                thread: Some(thread),
            })),
            Ok(Err(status)) => {
                let _ = thread.join();
                Err(status)
            }
            Err(_) => {
                let _ = thread.join();
                Err(HardwareStatus::GENERIC_FAILURE)
            }
        }
    }
}

enum Command {
    Decode { bitstream: Vec<u8>, tag: Arc<PtsTag> },
    Flush(crossbeam_channel::Sender<Result<(), HardwareStatus>>),
}

struct FfmpegHandle {
    commands: Option<crossbeam_channel::Sender<Command>>,
    thread: Option<JoinHandle<()>>,
}

impl DecodeHandle for FfmpegHandle {
    fn submit(&mut self, bitstream: &[u8], tag: Arc<PtsTag>) -> Result<(), HardwareStatus> {
        let commands = self.commands.as_ref().ok_or(HardwareStatus::GENERIC_FAILURE)?;
        commands
            .send(Command::Decode {
                bitstream: bitstream.to_vec(),
                tag,
            })
            .map_err(|_| HardwareStatus::GENERIC_FAILURE)
    }

    fn flush(&mut self) -> Result<(), HardwareStatus> {
        let commands = self.commands.as_ref().ok_or(HardwareStatus::GENERIC_FAILURE)?;
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        commands
            .send(Command::Flush(reply_tx))
            .map_err(|_| HardwareStatus::GENERIC_FAILURE)?;
        reply_rx.recv().unwrap_or(Err(HardwareStatus::GENERIC_FAILURE))
    }

    fn close(&mut self) -> Result<(), HardwareStatus> {
        drop(self.commands.take());
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| HardwareStatus::GENERIC_FAILURE),
            None => Ok(()),
        }
    }
}

impl Drop for FfmpegHandle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// State owned by the decode thread.
struct DecodeLoop {
    decoder: ffmpeg_next::decoder::Video,
    layout: PixelLayout,
    sink: Arc<dyn CompletionSink>,
    scaler: Option<ScalerState>,
    /// Tags of submitted packets, keyed by the sequence number written into
    /// the packet's pts and echoed on the decoded frame.
    pending: HashMap<i64, Arc<PtsTag>>,
    next_sequence: i64,
}

struct ScalerState {
    context: ffmpeg_next::software::scaling::Context,
    input: (ffmpeg_next::format::Pixel, u32, u32),
}

impl DecodeLoop {
    fn new(
        decoder: ffmpeg_next::decoder::Video,
        layout: PixelLayout,
        sink: Arc<dyn CompletionSink>,
    ) -> Self {
        Self {
            decoder,
            layout,
            sink,
            scaler: None,
            pending: HashMap::new(),
            next_sequence: 0,
        }
    }

    fn run(mut self, commands: crossbeam_channel::Receiver<Command>) {
        for command in commands {
            match command {
                Command::Decode { bitstream, tag } => self.decode(&bitstream, tag),
                Command::Flush(reply) => {
                    let _ = reply.send(self.drain());
                }
            }
        }
        if let Err(status) = self.drain() {
            log::warn!("Final decoder drain failed: {status}");
        }
    }

    fn decode(&mut self, bitstream: &[u8], tag: Arc<PtsTag>) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let mut packet = ffmpeg_next::Packet::copy(bitstream);
        packet.set_pts(Some(sequence));
        packet.set_dts(Some(sequence));

        if let Err(e) = self.decoder.send_packet(&packet) {
            self.sink.on_complete(Some(tag), to_status(e), None);
            return;
        }
        self.pending.insert(sequence, tag);
        self.receive_frames();
    }

    /// Signals end of stream, delivers every remaining picture, fails the
    /// submissions that never produced one, and readies the decoder for more.
    ///
    /// Orphans are failed and the decoder is reset even when end of stream
    /// could not be signalled; that error is returned afterwards.
    fn drain(&mut self) -> Result<(), HardwareStatus> {
        let eof = self.decoder.send_eof().map_err(to_status);
        if eof.is_ok() {
            self.receive_frames();
        }
        self.fail_orphans();
        self.decoder.flush();
        eof
    }

    fn fail_orphans(&mut self) {
        let mut orphaned: Vec<(i64, Arc<PtsTag>)> = self.pending.drain().collect();
        orphaned.sort_by_key(|(sequence, _)| *sequence);
        for (_, tag) in orphaned {
            self.sink.on_complete(Some(tag), NO_PICTURE, None);
        }
    }

    fn receive_frames(&mut self) {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            // Only the frame's own pts is the sequence of the packet it came
            // from. The best-effort timestamp may fall back to the dts of a
            // later packet once reordering makes pts go backwards.
            let tag = decoded
                .pts()
                .and_then(|sequence| self.pending.remove(&sequence));

            match self.convert(&decoded) {
                Ok(image) => self.sink.on_complete(tag, HardwareStatus::OK, Some(image)),
                Err(status) => self.sink.on_complete(tag, status, None),
            }
        }
    }

    fn convert(
        &mut self,
        decoded: &ffmpeg_next::util::frame::video::Video,
    ) -> Result<Arc<dyn ImageBuffer>, HardwareStatus> {
        let input = (decoded.format(), decoded.width(), decoded.height());
        let stale = self.scaler.as_ref().map_or(true, |s| s.input != input);
        if stale {
            let context = ffmpeg_next::software::scaling::Context::get(
                input.0,
                input.1,
                input.2,
                target_pixel(self.layout),
                input.1,
                input.2,
                ffmpeg_next::software::scaling::Flags::BILINEAR,
            )
            .map_err(to_status)?;
            self.scaler = Some(ScalerState { context, input });
        }

        let mut converted = ffmpeg_next::util::frame::video::Video::empty();
        if let Some(scaler) = self.scaler.as_mut() {
            scaler
                .context
                .run(decoded, &mut converted)
                .map_err(to_status)?;
        }

        let planes = (0..converted.planes())
            .map(|i| (converted.data(i).to_vec(), converted.stride(i)))
            .collect();
        Ok(Arc::new(PixelBuffer::from_planes(
            self.layout.fourcc(),
            converted.width(),
            converted.height(),
            planes,
        )))
    }
}

fn open_decoder(
    codec_id: ffmpeg_next::codec::Id,
    config: &DecoderConfig,
) -> Result<ffmpeg_next::decoder::Video, HardwareStatus> {
    let codec = ffmpeg_next::decoder::find(codec_id).ok_or(UNSUPPORTED_FORMAT)?;
    let mut context = ffmpeg_next::codec::context::Context::new_with_codec(codec);

    // SAFETY: the context was just allocated and is exclusively owned here.
    // Extradata is allocated with av_mallocz (padded, as libavcodec requires)
    // and freed by the context when it is dropped.
    unsafe {
        let ctx = context.as_mut_ptr();
        (*ctx).width = config.width as i32;
        (*ctx).height = config.height as i32;
        if !config.extradata.is_empty() {
            let size = config.extradata.len();
            let padding = ffmpeg_next::ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize;
            let buf = ffmpeg_next::ffi::av_mallocz(size + padding) as *mut u8;
            if buf.is_null() {
                return Err(HardwareStatus::GENERIC_FAILURE);
            }
            std::ptr::copy_nonoverlapping(config.extradata.as_ptr(), buf, size);
            (*ctx).extradata = buf;
            (*ctx).extradata_size = size as i32;
        }
    }

    context.decoder().video().map_err(to_status)
}

/// Maps a codec FourCC (as stored in MP4 sample entries) to libavcodec.
pub fn codec_id_for(source_format: FourCc) -> Option<ffmpeg_next::codec::Id> {
    use ffmpeg_next::codec::Id;
    match &source_format.to_bytes() {
        b"avc1" | b"avc3" => Some(Id::H264),
        b"hvc1" | b"hev1" => Some(Id::HEVC),
        b"mp4v" => Some(Id::MPEG4),
        b"vp09" => Some(Id::VP9),
        b"av01" => Some(Id::AV1),
        _ => None,
    }
}

/// Inverse of [`codec_id_for`], used when building a config from a stream.
pub fn fourcc_for(codec_id: ffmpeg_next::codec::Id) -> Option<FourCc> {
    use ffmpeg_next::codec::Id;
    let bytes = match codec_id {
        Id::H264 => b"avc1",
        Id::HEVC => b"hvc1",
        Id::MPEG4 => b"mp4v",
        Id::VP9 => b"vp09",
        Id::AV1 => b"av01",
        _ => return None,
    };
    Some(FourCc::from_bytes(*bytes))
}

fn target_pixel(layout: PixelLayout) -> ffmpeg_next::format::Pixel {
    match layout {
        PixelLayout::Uyvy422 => ffmpeg_next::format::Pixel::UYVY422,
        PixelLayout::Nv12 => ffmpeg_next::format::Pixel::NV12,
        PixelLayout::Bgra => ffmpeg_next::format::Pixel::BGRA,
    }
}

fn to_status(error: ffmpeg_next::Error) -> HardwareStatus {
    HardwareStatus::new(i32::from(error))
}
