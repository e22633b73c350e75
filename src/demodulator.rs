// Receiver demodulator - runs on its own worker thread (not inside the
// real-time audio input callback), draining the capture ring and framing
// completed messages into the receive queue. Ported from
// `receiver_loop`/`receiver_callback` in the original's libsofi.c.

use std::f32::consts::PI;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use log::{debug, trace};

use crate::codec::RawMessage;
use crate::config::Config;
use crate::queue::RecvQueue;
use crate::ring::Consumer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Listen,
    Demodulate,
}

/// Correlate one window of samples against every symbol frequency, returning
/// the index of the strongest symbol whose energy exceeds `silence_threshold`,
/// or `None` if the window looks like silence.
///
/// This is the Goertzel-equivalent sin/cos energy sum from the original's
/// `receiver_loop`, not an FFT: cheap for the small (4-256) symbol tables this
/// crate supports, and it avoids an FFT crate dependency for a correlator this
/// narrow.
pub fn correlate(window: &[f32], symbol_freqs: &[f32], sample_rate: u32, silence_threshold: f32) -> Option<usize> {
    let sample_rate = sample_rate as f32;
    let mut best: Option<(usize, f32)> = None;

    for (i, &freq) in symbol_freqs.iter().enumerate() {
        let mut sin_i = 0.0f32;
        let mut cos_i = 0.0f32;
        for (j, &sample) in window.iter().enumerate() {
            let theta = 2.0 * PI * freq * j as f32 / sample_rate;
            sin_i += theta.sin() * sample;
            cos_i += theta.cos() * sample;
        }
        let strength = sin_i * sin_i + cos_i * cos_i;
        trace!("symbol {i} strength = {strength}");
        if strength > silence_threshold && best.is_none_or(|(_, best_strength)| strength > best_strength) {
            best = Some((i, strength));
        }
    }

    best.map(|(i, _)| i)
}

/// Owns the capture ring's consumer half and the shared receive queue, and
/// drives the LISTEN/DEMODULATE framer on its own thread until cancelled.
pub struct Demodulator {
    ring: Consumer<f32>,
    queue: Arc<RecvQueue>,
    symbol_freqs: Vec<f32>,
    sample_rate: u32,
    listen_window: usize,
    symbol_window: usize,
    silence_threshold: f32,
    cancelled: Arc<AtomicBool>,
}

impl Demodulator {
    pub fn new(config: &Config, ring: Consumer<f32>, queue: Arc<RecvQueue>) -> Self {
        Self {
            ring,
            queue,
            symbol_freqs: config.symbol_freqs.clone(),
            sample_rate: config.sample_rate,
            listen_window: config.recv_window_samples().max(1),
            symbol_window: config.samples_per_symbol().max(1),
            silence_threshold: config.silence_threshold,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A handle to request cancellation of `run`'s loop, independent of the
    /// `JoinHandle` returned by `spawn`.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// Spawn the demodulator loop on a dedicated thread.
    pub fn spawn(mut self) -> JoinHandle<()> {
        std::thread::Builder::new()
            .name("sofi-demodulator".into())
            .spawn(move || self.run())
            .expect("failed to spawn demodulator thread")
    }

    fn run(&mut self) {
        let mut state = State::Listen;
        let mut msg = RawMessage::empty();
        let mut window_buf: Vec<f32> = vec![0.0; self.listen_window.max(self.symbol_window)];

        loop {
            if self.cancelled.load(Ordering::Acquire) {
                return;
            }

            let window_size = match state {
                State::Listen => self.listen_window,
                State::Demodulate => self.symbol_window,
            };

            if self.ring.read_available() < window_size {
                let wait_secs = window_size as f32 / self.sample_rate as f32;
                std::thread::sleep(Duration::from_secs_f32(wait_secs));
                continue;
            }

            let window = &mut window_buf[..window_size];
            let read = self.ring.read(window);
            debug_assert_eq!(read, window_size);

            let symbol = correlate(window, &self.symbol_freqs, self.sample_rate, self.silence_threshold);

            match state {
                State::Listen => {
                    if symbol.is_some() {
                        msg = RawMessage::empty();
                        state = State::Demodulate;
                        debug!("-> DEMODULATE");
                    }
                }
                State::Demodulate => match symbol {
                    None => {
                        self.queue.enqueue(msg);
                        msg = RawMessage::empty();
                        debug!("-> LISTEN");
                        state = State::Listen;
                    }
                    Some(s) => msg.push(s as u8),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, sample_rate: u32, n: usize) -> Vec<f32> {
        (0..n)
            .map(|j| (2.0 * PI * freq * j as f32 / sample_rate as f32).sin())
            .collect()
    }

    #[test]
    fn correlate_picks_the_matching_tone() {
        let sample_rate = 44_100;
        let freqs = [2200.0, 1200.0];
        let window = tone(1200.0, sample_rate, 441);
        let symbol = correlate(&window, &freqs, sample_rate, 100.0);
        assert_eq!(symbol, Some(1));
    }

    #[test]
    fn correlate_returns_none_for_silence() {
        let freqs = [2200.0, 1200.0];
        let window = vec![0.0f32; 441];
        let symbol = correlate(&window, &freqs, 44_100, 100.0);
        assert_eq!(symbol, None);
    }

    #[test]
    fn correlate_returns_none_for_low_amplitude_noise_floor() {
        let freqs = [2200.0, 1200.0];
        // Tiny-amplitude tone: energy should sit below the silence floor.
        let window: Vec<f32> = tone(1200.0, 44_100, 441).iter().map(|s| s * 0.001).collect();
        let symbol = correlate(&window, &freqs, 44_100, 100.0);
        assert_eq!(symbol, None);
    }

    #[test]
    fn correlate_picks_strongest_of_several_candidate_tones() {
        let sample_rate = 8_000;
        let freqs = [1000.0, 2000.0, 3000.0, 4000.0 - 1.0];
        let mut window = tone(2000.0, sample_rate, 200);
        // Add a weaker interferer at a different symbol frequency.
        for (i, s) in tone(1000.0, sample_rate, 200).iter().enumerate() {
            window[i] += 0.1 * s;
        }
        let symbol = correlate(&window, &freqs, sample_rate, 50.0);
        assert_eq!(symbol, Some(1));
    }
}
