// Modem - the public opaque handle. Replaces the original's global
// `struct callback_data data` / `sofi_init`/`sofi_send`/`sofi_recv`/
// `sofi_destroy` free functions with an owned value: there is no process-wide
// state, and `destroy` consuming `self` makes "never call it twice" a
// compile-time guarantee instead of the original's cancel-then-join dance
// being the caller's responsibility to get right.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use log::info;

use crate::audio::AudioEngine;
use crate::codec::{self, RawMessage};
use crate::config::Config;
use crate::demodulator::Demodulator;
use crate::error::SofiError;
use crate::modulator::SenderModulator;
use crate::packet::Packet;
use crate::queue::RecvQueue;
use crate::ring::{self, Producer};

/// Send ring capacity, in frames: two outstanding packets may be queued for
/// transmission before `send` starts blocking, matching the original's
/// `SENDER_BUFFER_SIZE` of two `struct raw_message` slots.
const SEND_RING_CAPACITY: usize = 2;

/// Capture ring capacity, in samples: about 23 seconds at 44.1 kHz, enough
/// headroom for the demodulator thread to fall behind the audio callback
/// without losing data under normal scheduling.
const CAPTURE_RING_CAPACITY: usize = 1 << 20;

/// An initialized So-Fi modem: owns whatever audio streams, background
/// threads, and ring buffers the given `Config` calls for.
///
/// `send`/`recv` both take `&self` (spec.md §4.6) so a single `Modem` can be
/// shared between a sender thread and a receiver thread, e.g. behind an
/// `Arc`, the way a CLI front end drives full-duplex traffic. The send ring
/// is the only field that needs interior mutability for that to type-check;
/// everything else (`RecvQueue`, `AtomicBool`) already synchronizes itself.
pub struct Modem {
    config: Config,
    send_producer: Option<Mutex<Producer<RawMessage>>>,
    recv_queue: Option<Arc<RecvQueue>>,
    demod_cancel: Option<Arc<AtomicBool>>,
    demod_thread: Option<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    _audio: AudioEngine,
}

// SAFETY: every field that requires interior mutability from multiple
// threads (`send_producer`) is already behind a `Mutex`; `recv_queue` and
// `demod_cancel` are already `Sync` (`Arc<RecvQueue>`, `Arc<AtomicBool>`).
// `_audio` holds `cpal::Stream`s that are never touched again after
// `AudioEngine::open` beyond being dropped in `destroy`/`Drop`, so sharing a
// `&Modem` across threads never produces concurrent access to them.
unsafe impl Sync for Modem {}

impl Modem {
    /// Validate `config`, open the required audio streams, and start the
    /// demodulator thread if `config.receiver` is set.
    pub fn init(config: Config) -> Result<Self, SofiError> {
        config.validate()?;

        info!(
            "sample_rate={} baud={} window={} samples ({:.3}s)",
            config.sample_rate,
            config.baud,
            config.recv_window_samples(),
            config.recv_window_samples() as f32 / config.sample_rate as f32
        );

        let (send_producer, sender_modulator) = if config.sender {
            let (producer, consumer) = ring::channel::<RawMessage>(SEND_RING_CAPACITY.next_power_of_two());
            (Some(Mutex::new(producer)), Some(SenderModulator::new(&config, consumer)))
        } else {
            (None, None)
        };

        let (recv_queue, demod_cancel, demod_thread, capture_producer) = if config.receiver {
            let (producer, consumer) = ring::channel::<f32>(CAPTURE_RING_CAPACITY);
            let queue = Arc::new(RecvQueue::new(crate::queue::DEFAULT_CAPACITY));
            let demodulator = Demodulator::new(&config, consumer, queue.clone());
            let cancel = demodulator.cancel_handle();
            let handle = demodulator.spawn();
            (Some(queue), Some(cancel), Some(handle), Some(producer))
        } else {
            (None, None, None, None)
        };

        let audio = AudioEngine::open(&config, sender_modulator, capture_producer)?;

        Ok(Self {
            config,
            send_producer,
            recv_queue,
            demod_cancel,
            demod_thread,
            shutdown: Arc::new(AtomicBool::new(false)),
            _audio: audio,
        })
    }

    /// Encode and enqueue `packet` for transmission, blocking until the send
    /// ring has room for it (`spec.md` §4.6, §5's suspension point) rather
    /// than reporting backpressure to the caller. Retries about once per
    /// byte-time, the way the original's sender is paced by its own output
    /// callback, and gives up with `Cancelled` if `request_shutdown` fires
    /// first. Rejects payloads over `config.max_message_length` rather than
    /// truncating (`spec.md` §9).
    pub fn send(&self, packet: &Packet) -> Result<(), SofiError> {
        let producer = self
            .send_producer
            .as_ref()
            .ok_or_else(|| SofiError::ResourceUnavailable("modem has no sender configured".into()))?;

        if packet.payload().len() > self.config.max_message_length {
            return Err(SofiError::ConfigInvalid(format!(
                "payload of {} bytes exceeds max_message_length of {}",
                packet.payload().len(),
                self.config.max_message_length
            )));
        }

        let raw = codec::encode(packet, self.config.symbol_width);
        let byte_time = Duration::from_secs_f32(self.config.symbols_per_byte() as f32 / self.config.baud);

        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(SofiError::Cancelled);
            }
            {
                let mut producer = producer.lock().expect("send ring mutex poisoned");
                if producer.try_push(raw) {
                    return Ok(());
                }
            }
            std::thread::sleep(byte_time);
        }
    }

    /// Block until the next valid packet arrives, decoding and
    /// CRC-validating every candidate, discarding corrupt frames exactly the
    /// way the original's `sofi_recv` loop does.
    pub fn recv(&self) -> Result<Packet, SofiError> {
        let queue = self
            .recv_queue
            .as_ref()
            .ok_or_else(|| SofiError::ResourceUnavailable("modem has no receiver configured".into()))?;

        loop {
            let raw = queue.dequeue()?;
            match codec::decode(&raw, self.config.symbol_width) {
                Ok(packet) => return Ok(packet),
                Err(SofiError::CrcMismatch) => {
                    log::warn!("dropping frame with CRC mismatch");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Total decoded-but-undelivered messages dropped because the receive
    /// queue was full (`SofiError::QueueOverflow`'s counterpart — never
    /// returned from `recv`, only counted here and logged by `RecvQueue`).
    /// Zero when `config.receiver` is unset.
    pub fn overflow_count(&self) -> u64 {
        self.recv_queue.as_ref().map_or(0, |q| q.overflow_count())
    }

    /// Signal the demodulator thread to stop, unblock any in-progress
    /// `recv()` with `SofiError::Cancelled`, and unblock any in-progress
    /// `send()` the same way, without joining or dropping anything yet. Safe
    /// to call from a signal handler or any thread that only holds a shared
    /// reference (e.g. an `Arc<Modem>`); `destroy` is what actually requires
    /// ownership.
    pub fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(cancel) = &self.demod_cancel {
            cancel.store(true, Ordering::Release);
        }
        if let Some(queue) = &self.recv_queue {
            queue.cancel();
        }
    }

    /// Tear down the modem: cancel the demodulator thread, join it, and let
    /// the audio streams drop. Consuming `self` means this can only be
    /// called once.
    pub fn destroy(mut self) {
        self.request_shutdown();
        if let Some(handle) = self.demod_thread.take() {
            let _ = handle.join();
        }
        info!("modem destroyed");
    }
}
