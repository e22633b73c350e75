// Sender modulator - runs inside the real-time audio output callback.
// Never allocates, blocks, or touches the receive queue (spec.md §4.3).

use std::f32::consts::PI;

use crate::codec::RawMessage;
use crate::config::Config;
use crate::ring::Consumer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Transmitting,
    InterpacketGap,
}

/// Owns the send-ring consumer half and synthesizes one sample at a time
/// into the output stream's callback.
pub struct SenderModulator {
    ring: Consumer<RawMessage>,
    symbol_freqs: Vec<f32>,
    samples_per_symbol: usize,
    gap_samples: usize,
    sample_rate: f32,

    state: State,
    phase: f32,
    current: Option<RawMessage>,
    symbol_index: usize,
    sample_in_symbol: usize,
    gap_elapsed: usize,
}

impl SenderModulator {
    pub fn new(config: &Config, ring: Consumer<RawMessage>) -> Self {
        Self {
            ring,
            symbol_freqs: config.symbol_freqs.clone(),
            samples_per_symbol: config.samples_per_symbol(),
            gap_samples: config.interpacket_gap_samples(),
            sample_rate: config.sample_rate as f32,
            state: State::Idle,
            phase: 0.0,
            current: None,
            symbol_index: 0,
            sample_in_symbol: 0,
            gap_elapsed: 0,
        }
    }

    /// Fill `out` with one sample per element, advancing the state machine.
    /// Called once per output-stream callback invocation.
    pub fn fill(&mut self, out: &mut [f32]) {
        for sample in out.iter_mut() {
            *sample = self.step();
        }
    }

    fn step(&mut self) -> f32 {
        loop {
            match self.state {
                State::Idle => {
                    // Zero-copy peek of the ring's head slot; the slot is
                    // only released with `advance_read(1)` once a message is
                    // actually there to transmit, not just glanced at.
                    let peeked = {
                        let (first, second) = self.ring.peek_regions(1);
                        first.first().or_else(|| second.first()).copied()
                    };
                    if let Some(msg) = peeked {
                        self.ring.advance_read(1);
                        self.current = Some(msg);
                        self.symbol_index = 0;
                        self.sample_in_symbol = 0;
                        self.state = State::Transmitting;
                        // Fall through and emit the first symbol's first
                        // sample immediately, with no initial offset.
                        continue;
                    }
                    return 0.0;
                }
                State::Transmitting => {
                    let msg = self.current.as_ref().expect("transmitting without a message");
                    if self.symbol_index >= msg.len() {
                        self.state = State::InterpacketGap;
                        self.gap_elapsed = 0;
                        self.current = None;
                        continue;
                    }
                    let symbol = msg.symbols()[self.symbol_index] as usize;
                    let freq = self.symbol_freqs[symbol];

                    let sample = self.phase.sin();
                    self.phase += 2.0 * PI * freq / self.sample_rate;
                    if self.phase >= 2.0 * PI {
                        self.phase -= 2.0 * PI;
                    }

                    self.sample_in_symbol += 1;
                    if self.sample_in_symbol >= self.samples_per_symbol {
                        self.sample_in_symbol = 0;
                        self.symbol_index += 1;
                    }
                    return sample;
                }
                State::InterpacketGap => {
                    self.gap_elapsed += 1;
                    if self.gap_elapsed >= self.gap_samples {
                        self.state = State::Idle;
                    }
                    return 0.0;
                }
            }
        }
    }

    /// Whether the modulator is between messages (neither transmitting nor
    /// in its interpacket gap) — used by the input callback to decide
    /// whether to also drain the receive ring on a half-duplex device.
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }
}
