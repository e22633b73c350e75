// Configuration - captured at init, immutable until destroy.

use crate::error::SofiError;
use crate::packet::MAX_PAYLOAD;

/// The default frequency table, symbol width, and baud the original
/// `sofi.h` shipped (`DEFAULT_SOFI_INIT_PARAMS`), adapted to a 2-symbol
/// (1 bit) table since that is what the §8 end-to-end scenarios use.
pub const DEFAULT_SYMBOL_FREQS: [f32; 2] = [2200.0, 1200.0];

/// Fixed configuration for one `Modem` instance. Read-only after `init`.
#[derive(Debug, Clone)]
pub struct Config {
    /// Audio clock, in Hz, for both capture and playback.
    pub sample_rate: u32,
    /// Symbols per second.
    pub baud: f32,
    /// Bits per symbol; must be one of `{1, 2, 4, 8}`.
    pub symbol_width: u32,
    /// `2^symbol_width` distinct frequencies, one per symbol value.
    pub symbol_freqs: Vec<f32>,
    /// Carrier-detect window length as a fraction of one symbol period.
    pub recv_window_factor: f32,
    /// Silence gap after each transmitted frame, as a multiple of one
    /// symbol period.
    pub interpacket_gap_factor: f32,
    /// Correlator energy floor above which a window is "carrier", below
    /// which it is "silence". Deliberately left tunable rather than
    /// recalibrated — see `spec.md` §9 "Silence detection".
    pub silence_threshold: f32,
    /// Largest payload `send()` will accept before rejecting the packet.
    pub max_message_length: usize,
    /// Activate the sender half (plays audio).
    pub sender: bool,
    /// Activate the receiver half (captures and demodulates audio).
    pub receiver: bool,
    /// Verbosity of internal `log` output, 0 (quiet) upward.
    pub debug_level: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            baud: 100.0,
            symbol_width: 1,
            symbol_freqs: DEFAULT_SYMBOL_FREQS.to_vec(),
            recv_window_factor: 0.2,
            interpacket_gap_factor: 2.0,
            silence_threshold: 100.0,
            max_message_length: MAX_PAYLOAD,
            sender: true,
            receiver: true,
            debug_level: 0,
        }
    }
}

impl Config {
    pub fn num_symbols(&self) -> usize {
        1 << self.symbol_width
    }

    pub fn symbols_per_byte(&self) -> u32 {
        8 / self.symbol_width
    }

    /// Samples held per symbol: `round(sample_rate / baud)`.
    pub fn samples_per_symbol(&self) -> usize {
        (self.sample_rate as f32 / self.baud).round() as usize
    }

    /// Carrier-detect window length, in samples:
    /// `recv_window_factor / baud * sample_rate`.
    pub fn recv_window_samples(&self) -> usize {
        (self.recv_window_factor / self.baud * self.sample_rate as f32).round() as usize
    }

    /// Interpacket silence, in samples:
    /// `interpacket_gap_factor / baud * sample_rate`.
    pub fn interpacket_gap_samples(&self) -> usize {
        (self.interpacket_gap_factor / self.baud * self.sample_rate as f32).round() as usize
    }

    /// Validate every field, matching `spec.md` §7's `ConfigInvalid` kind.
    pub fn validate(&self) -> Result<(), SofiError> {
        let invalid = |msg: String| SofiError::ConfigInvalid(msg);

        if self.sample_rate == 0 {
            return Err(invalid("sample_rate must be > 0".into()));
        }
        if !(self.baud >= 1.0) {
            return Err(invalid("baud must be >= 1".into()));
        }
        if !matches!(self.symbol_width, 1 | 2 | 4 | 8) {
            return Err(invalid("symbol_width must be one of {1, 2, 4, 8}".into()));
        }
        if self.symbol_freqs.len() != self.num_symbols() {
            return Err(invalid(format!(
                "expected {} symbol frequencies for symbol_width={}, got {}",
                self.num_symbols(),
                self.symbol_width,
                self.symbol_freqs.len()
            )));
        }
        let nyquist = self.sample_rate as f32 / 2.0;
        for &freq in &self.symbol_freqs {
            if !(freq > 0.0) || freq >= nyquist {
                return Err(invalid(format!(
                    "symbol frequency {freq} Hz must be in (0, Nyquist={nyquist})"
                )));
            }
        }
        let mut sorted = self.symbol_freqs.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        sorted.dedup();
        if sorted.len() != self.symbol_freqs.len() {
            return Err(invalid("symbol frequencies must be distinct".into()));
        }
        if !(self.recv_window_factor > 0.0) {
            return Err(invalid("recv_window_factor must be > 0".into()));
        }
        if !(self.interpacket_gap_factor >= 1.0) {
            return Err(invalid("interpacket_gap_factor must be >= 1".into()));
        }
        if self.max_message_length > MAX_PAYLOAD {
            return Err(invalid(format!(
                "max_message_length must be <= {MAX_PAYLOAD}"
            )));
        }
        if !self.sender && !self.receiver {
            return Err(invalid("at least one of sender/receiver must be enabled".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        Config::default().validate().expect("default config should validate");
    }

    #[test]
    fn rejects_zero_sample_rate() {
        let mut config = Config::default();
        config.sample_rate = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_bad_symbol_width() {
        let mut config = Config::default();
        config.symbol_width = 3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_mismatched_frequency_table_len() {
        let mut config = Config::default();
        config.symbol_width = 2;
        // still only 2 frequencies, but width=2 needs 4
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_duplicate_frequencies() {
        let mut config = Config::default();
        config.symbol_freqs = vec![1000.0, 1000.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_frequency_at_or_above_nyquist() {
        let mut config = Config::default();
        config.symbol_freqs = vec![22050.0, 1200.0];
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_neither_sender_nor_receiver() {
        let mut config = Config::default();
        config.sender = false;
        config.receiver = false;
        assert!(config.validate().is_err());
    }

    #[test]
    fn samples_per_symbol_matches_sample_rate_over_baud() {
        let config = Config {
            sample_rate: 44_100,
            baud: 100.0,
            ..Config::default()
        };
        assert_eq!(config.samples_per_symbol(), 441);
    }
}
