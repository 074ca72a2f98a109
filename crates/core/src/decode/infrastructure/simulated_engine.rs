use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use thiserror::Error;

use crate::decode::domain::decode_engine::{CompletionSink, DecodeEngine, DecodeHandle};
use crate::decode::domain::image_buffer::ImageBuffer;
use crate::decode::domain::pts_tag::PtsTag;
use crate::decode::infrastructure::pixel_buffer::PixelBuffer;
use crate::shared::constants::{DEFAULT_SIMULATED_WORKERS, DEFAULT_SUBMIT_CAPACITY};
use crate::shared::decoder_config::DecoderConfig;
use crate::shared::hardware_status::HardwareStatus;
use crate::shared::pixel_format::PixelLayout;

/// Returned by `open` for an unsupported output format or empty dimensions.
pub const CONFIGURATION_ERROR: HardwareStatus = HardwareStatus::new(-12472);
/// Completion status for a unit that failed to decode.
pub const DECODE_FAILED: HardwareStatus = HardwareStatus::new(-12473);
/// Returned by `submit` for an empty bitstream.
pub const INVALID_BITSTREAM: HardwareStatus = HardwareStatus::new(-50);

/// Units whose first byte is this value fail to decode: they complete with
/// [`DECODE_FAILED`] and no image.
pub const CORRUPT_UNIT_MARKER: u8 = 0xFF;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum EngineOptionsError {
    #[error("workers must be >= 1")]
    NoWorkers,
    #[error("reorder_window must be >= 1")]
    NoReorderWindow,
    #[error("submit_capacity must be >= 1")]
    NoSubmitCapacity,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SimulatedEngineOptions {
    /// Threads that deliver completions to the sink.
    pub workers: usize,
    /// Submissions held back and then completed newest-first, the way a
    /// decoder with B-frame reordering emits out of submission order.
    pub reorder_window: usize,
    /// Submissions accepted before `submit` blocks.
    pub submit_capacity: usize,
    /// Emit images in this layout instead of the configured output format.
    pub emit_layout: Option<PixelLayout>,
}

impl Default for SimulatedEngineOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_SIMULATED_WORKERS,
            reorder_window: 1,
            submit_capacity: DEFAULT_SUBMIT_CAPACITY,
            emit_layout: None,
        }
    }
}

/// Software stand-in for a hardware decoder.
///
/// Each session runs one decode thread and a pool of completion workers:
///
/// `submit → decode [reorder window] → workers → sink`
///
/// "Decoding" produces a solid image filled with the unit's first byte.
/// Completions arrive on worker threads, concurrently and out of
/// submission order.
pub struct SimulatedDecodeEngine {
    options: SimulatedEngineOptions,
}

impl SimulatedDecodeEngine {
    pub fn new(options: SimulatedEngineOptions) -> Result<Self, EngineOptionsError> {
        if options.workers < 1 {
            return Err(EngineOptionsError::NoWorkers);
        }
        if options.reorder_window < 1 {
            return Err(EngineOptionsError::NoReorderWindow);
        }
        if options.submit_capacity < 1 {
            return Err(EngineOptionsError::NoSubmitCapacity);
        }
        Ok(Self { options })
    }
}

impl DecodeEngine for SimulatedDecodeEngine {
    fn open(
        &self,
        config: &DecoderConfig,
        sink: Arc<dyn CompletionSink>,
    ) -> Result<Box<dyn DecodeHandle>, HardwareStatus> {
        let layout = PixelLayout::from_fourcc(config.output_format).ok_or(CONFIGURATION_ERROR)?;
        if config.width == 0 || config.height == 0 {
            return Err(CONFIGURATION_ERROR);
        }

        let geometry = Geometry {
            layout: self.options.emit_layout.unwrap_or(layout),
            width: config.width,
            height: config.height,
        };
        let cap = self.options.submit_capacity;

        let (command_tx, command_rx) = crossbeam_channel::bounded::<Command>(cap);
        let (completion_tx, completion_rx) = crossbeam_channel::bounded::<Completion>(cap);
        let in_flight = Arc::new(InFlight::default());

        let mut threads = Vec::with_capacity(self.options.workers + 1);
        threads.push(spawn_decoder(
            command_rx,
            completion_tx,
            self.options.reorder_window,
            geometry,
        ));
        for _ in 0..self.options.workers {
            threads.push(spawn_worker(
                completion_rx.clone(),
                Arc::clone(&sink),
                Arc::clone(&in_flight),
            ));
        }

        log::debug!(
            "Simulated engine opened ({} workers, reorder window {})",
            self.options.workers,
            self.options.reorder_window
        );

        Ok(Box::new(SimulatedHandle {
            commands: Some(command_tx),
            in_flight,
            threads,
        }))
    }
}

#[derive(Clone, Copy)]
struct Geometry {
    layout: PixelLayout,
    width: u32,
    height: u32,
}

struct Job {
    bitstream: Vec<u8>,
    tag: Arc<PtsTag>,
}

enum Command {
    Decode(Job),
    Flush,
}

struct Completion {
    tag: Arc<PtsTag>,
    status: HardwareStatus,
    image: Option<Arc<dyn ImageBuffer>>,
}

/// Count of accepted submissions whose completion has not yet returned,
/// plus whether a worker died delivering one.
#[derive(Default)]
struct InFlight {
    state: Mutex<InFlightState>,
    idle: Condvar,
}

#[derive(Default)]
struct InFlightState {
    count: usize,
    worker_died: bool,
}

impl InFlight {
    fn begin(&self) {
        self.lock().count += 1;
    }

    fn finish(&self, worker_died: bool) {
        let mut state = self.lock();
        state.count = state.count.saturating_sub(1);
        state.worker_died |= worker_died;
        if state.count == 0 || state.worker_died {
            self.idle.notify_all();
        }
    }

    /// Waits until nothing is in flight. Returns false, without waiting for
    /// the rest, once a worker has died.
    fn wait_idle(&self) -> bool {
        let state = self.lock();
        let state = self
            .idle
            .wait_while(state, |s| s.count > 0 && !s.worker_died)
            .unwrap_or_else(PoisonError::into_inner);
        !state.worker_died
    }

    fn lock(&self) -> MutexGuard<'_, InFlightState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Marks one completion finished when dropped, including by a panic
/// unwinding out of the sink.
struct FinishOnDrop<'a>(&'a InFlight);

impl Drop for FinishOnDrop<'_> {
    fn drop(&mut self) {
        self.0.finish(std::thread::panicking());
    }
}

struct SimulatedHandle {
    commands: Option<crossbeam_channel::Sender<Command>>,
    in_flight: Arc<InFlight>,
    threads: Vec<JoinHandle<()>>,
}

impl DecodeHandle for SimulatedHandle {
    fn submit(&mut self, bitstream: &[u8], tag: Arc<PtsTag>) -> Result<(), HardwareStatus> {
        if bitstream.is_empty() {
            return Err(INVALID_BITSTREAM);
        }
        let commands = self.commands.as_ref().ok_or(HardwareStatus::GENERIC_FAILURE)?;

        self.in_flight.begin();
        let job = Job {
            bitstream: bitstream.to_vec(),
            tag,
        };
        if commands.send(Command::Decode(job)).is_err() {
            self.in_flight.finish(false);
            return Err(HardwareStatus::GENERIC_FAILURE);
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), HardwareStatus> {
        let commands = self.commands.as_ref().ok_or(HardwareStatus::GENERIC_FAILURE)?;
        commands
            .send(Command::Flush)
            .map_err(|_| HardwareStatus::GENERIC_FAILURE)?;
        if !self.in_flight.wait_idle() {
            return Err(HardwareStatus::GENERIC_FAILURE);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), HardwareStatus> {
        // Disconnecting the command channel makes the decoder emit what it
        // holds and exit, which in turn stops the workers.
        drop(self.commands.take());

        let mut panicked = false;
        for handle in self.threads.drain(..) {
            panicked |= handle.join().is_err();
        }
        if panicked {
            return Err(HardwareStatus::GENERIC_FAILURE);
        }
        Ok(())
    }
}

impl Drop for SimulatedHandle {
    fn drop(&mut self) {
        if self.commands.is_some() {
            let _ = self.close();
        }
    }
}

fn spawn_decoder(
    command_rx: crossbeam_channel::Receiver<Command>,
    completion_tx: crossbeam_channel::Sender<Completion>,
    reorder_window: usize,
    geometry: Geometry,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        let mut held: Vec<Job> = Vec::with_capacity(reorder_window);
        for command in command_rx {
            let emit = match command {
                Command::Decode(job) => {
                    held.push(job);
                    held.len() >= reorder_window
                }
                Command::Flush => true,
            };
            if emit && !emit_newest_first(&mut held, &completion_tx, geometry) {
                return;
            }
        }
        emit_newest_first(&mut held, &completion_tx, geometry);
    })
}

fn spawn_worker(
    completion_rx: crossbeam_channel::Receiver<Completion>,
    sink: Arc<dyn CompletionSink>,
    in_flight: Arc<InFlight>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for completion in completion_rx {
            let _finish = FinishOnDrop(&in_flight);
            sink.on_complete(Some(completion.tag), completion.status, completion.image);
        }
    })
}

/// Decodes and forwards every held job, last submitted first. Returns false
/// if the workers are gone.
fn emit_newest_first(
    held: &mut Vec<Job>,
    completion_tx: &crossbeam_channel::Sender<Completion>,
    geometry: Geometry,
) -> bool {
    while let Some(job) = held.pop() {
        if completion_tx.send(decode(job, geometry)).is_err() {
            return false;
        }
    }
    true
}

fn decode(job: Job, geometry: Geometry) -> Completion {
    match job.bitstream.first() {
        Some(&CORRUPT_UNIT_MARKER) => Completion {
            tag: job.tag,
            status: DECODE_FAILED,
            image: None,
        },
        first => {
            let fill = first.copied().unwrap_or(0);
            let image = PixelBuffer::filled(geometry.layout, geometry.width, geometry.height, fill);
            Completion {
                tag: job.tag,
                status: HardwareStatus::OK,
                image: Some(Arc::new(image)),
            }
        }
    }
}
