use std::process;
use std::sync::Arc;
use std::time::Instant;

use clap::{Parser, Subcommand};

use hwdecode_core::decode::domain::decode_engine::DecodeEngine;
use hwdecode_core::decode::domain::decoded_frame::DecodedFrame;
use hwdecode_core::decode::infrastructure::simulated_engine::{
    SimulatedDecodeEngine, SimulatedEngineOptions,
};
use hwdecode_core::session::decoder_session::DecoderSession;
use hwdecode_core::session::session_observer::{LoggingSessionObserver, SessionObserver};
use hwdecode_core::shared::constants::{
    DEFAULT_OUTPUT_FORMAT, DEFAULT_SIMULATED_WORKERS, DEFAULT_SUBMIT_CAPACITY,
};
use hwdecode_core::shared::decoder_config::DecoderConfig;
use hwdecode_core::shared::pixel_format::{FourCc, PixelLayout};

/// Drives decode sessions and checks that frames come out in presentation order.
#[derive(Parser)]
#[command(name = "hwdecode")]
struct Cli {
    /// Output pixel format FourCC: 2vuy, 420v or BGRA.
    #[arg(long, global = true, default_value_t = DEFAULT_OUTPUT_FORMAT.to_string())]
    output_format: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decode a synthetic stream on the software engine.
    Simulate {
        /// Number of access units to submit.
        #[arg(long, default_value = "300")]
        frames: usize,

        /// Reference frame interval; each group is submitted reference first,
        /// like a stream with B-frames.
        #[arg(long, default_value = "3")]
        gop: usize,

        /// Completion worker threads.
        #[arg(long, default_value_t = DEFAULT_SIMULATED_WORKERS)]
        workers: usize,

        /// Units held back and completed newest-first.
        #[arg(long, default_value = "4")]
        reorder_window: usize,

        /// Units accepted before submit blocks.
        #[arg(long, default_value_t = DEFAULT_SUBMIT_CAPACITY)]
        submit_capacity: usize,

        /// Flush and drain the session every N units (0 = only at the end).
        /// Must be a multiple of --gop so no later unit precedes a popped one.
        #[arg(long, default_value = "0")]
        batch: usize,

        #[arg(long, default_value = "64")]
        width: u32,

        #[arg(long, default_value = "36")]
        height: u32,

        /// Make the engine emit this format instead, to exercise dropping.
        #[arg(long)]
        emit_format: Option<String>,
    },

    /// Decode the best video stream of a container file through libavcodec.
    #[cfg(feature = "ffmpeg")]
    Decode {
        /// Input video file.
        input: std::path::PathBuf,

        /// Stop after this many packets.
        #[arg(long)]
        max_packets: Option<usize>,
    },
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let output_format = parse_layout(&cli.output_format)?.fourcc();

    match cli.command {
        Command::Simulate {
            frames,
            gop,
            workers,
            reorder_window,
            submit_capacity,
            batch,
            width,
            height,
            emit_format,
        } => {
            if gop == 0 {
                return Err("GOP length must be at least 1".into());
            }
            if batch % gop != 0 {
                return Err(format!(
                    "Batch must be a multiple of the GOP length ({gop}), got {batch}"
                )
                .into());
            }
            let emit_layout = emit_format.as_deref().map(parse_layout).transpose()?;
            let engine = SimulatedDecodeEngine::new(SimulatedEngineOptions {
                workers,
                reorder_window,
                submit_capacity,
                emit_layout,
            })?;
            let config =
                DecoderConfig::new(width, height, Vec::new()).with_output_format(output_format);
            let units = synthetic_stream(frames, gop);
            run_session(&engine, config, units, batch)
        }
        #[cfg(feature = "ffmpeg")]
        Command::Decode { input, max_packets } => {
            use hwdecode_core::decode::infrastructure::ffmpeg_engine::FfmpegDecodeEngine;
            use hwdecode_core::decode::infrastructure::ffmpeg_packet_source::FfmpegPacketSource;

            if !input.exists() {
                return Err(format!("Input file not found: {}", input.display()).into());
            }
            let mut source = FfmpegPacketSource::open(&input)?;
            let config = source.config().clone().with_output_format(output_format);
            let units: Vec<(Vec<u8>, i64)> = source
                .packets()
                .take(max_packets.unwrap_or(usize::MAX))
                .map(|p| (p.data, p.pts))
                .collect();
            run_session(&FfmpegDecodeEngine::new(), config, units, 0)
        }
    }
}

/// Submits every unit, pops everything decoded, and fails if any popped
/// frame precedes the one before it.
fn run_session(
    engine: &dyn DecodeEngine,
    config: DecoderConfig,
    units: Vec<(Vec<u8>, i64)>,
    batch: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let observer = Arc::new(LoggingSessionObserver::new());
    let mut session = DecoderSession::new(config)
        .with_observer(Arc::clone(&observer) as Arc<dyn SessionObserver>);
    session.open(engine)?;

    let start = Instant::now();
    let submitted = units.len();
    let mut check = OrderCheck::default();

    for (i, (bitstream, pts)) in units.iter().enumerate() {
        session.submit(bitstream, *pts)?;
        if batch > 0 && (i + 1) % batch == 0 {
            session.flush()?;
            drain_into(&session, &mut check)?;
        }
    }
    session.flush()?;
    drain_into(&session, &mut check)?;
    session.destroy()?;

    let elapsed = start.elapsed().as_secs_f64();
    log::info!("Session summary: {}", observer.summary_string());
    println!(
        "Submitted {submitted} units, popped {} frames in presentation order ({:.1} frames/s)",
        check.popped,
        if elapsed > 0.0 { check.popped as f64 / elapsed } else { 0.0 }
    );
    Ok(())
}

#[derive(Default)]
struct OrderCheck {
    last_pts: Option<i64>,
    popped: usize,
}

impl OrderCheck {
    fn accept(&mut self, frame: &DecodedFrame) -> Result<(), String> {
        let pts = frame.pts();
        if let Some(last) = self.last_pts {
            if pts < last {
                return Err(format!("Frame pts {pts} popped after pts {last}"));
            }
        }
        self.last_pts = Some(pts);
        self.popped += 1;
        Ok(())
    }
}

fn drain_into(
    session: &DecoderSession,
    check: &mut OrderCheck,
) -> Result<(), Box<dyn std::error::Error>> {
    while let Some(frame) = session.pop() {
        check.accept(&frame)?;
        log::trace!("Popped frame pts={}", frame.pts());
    }
    Ok(())
}

/// Units in decode order: each group of `gop` timestamps is submitted with
/// its last (reference) frame first, then the rest in order.
fn synthetic_stream(frames: usize, gop: usize) -> Vec<(Vec<u8>, i64)> {
    let mut order = Vec::with_capacity(frames);
    for start in (0..frames).step_by(gop) {
        let end = (start + gop).min(frames);
        order.push(end - 1);
        order.extend(start..end - 1);
    }
    order
        .into_iter()
        .map(|pts| {
            // First byte is the fill value; skip the corrupt-unit marker.
            let fill = (pts % 254) as u8 + 1;
            (vec![fill, 0x00, 0x00, 0x01], pts as i64)
        })
        .collect()
}

fn parse_layout(value: &str) -> Result<PixelLayout, Box<dyn std::error::Error>> {
    FourCc::parse(value)
        .and_then(PixelLayout::from_fourcc)
        .ok_or_else(|| {
            format!("Output format must be one of: 2vuy, 420v, BGRA, got '{value}'").into()
        })
}
