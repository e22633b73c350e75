// End-to-end scenarios driving codec::encode -> SenderModulator -> correlate
// -> codec::decode entirely in memory, with no audio device involved.
// Grounded on the six numbered scenarios this spec's acceptance tests name:
// hello / len-0 / len-255 / bit-flip / back-to-back / width-2.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use sofi::codec::{self, RawMessage};
use sofi::demodulator::{Demodulator, correlate};
use sofi::ring::channel;
use sofi::{Config, Packet, RecvQueue, SenderModulator};

fn test_config(symbol_width: u32, symbol_freqs: Vec<f32>) -> Config {
    Config {
        sample_rate: 44_100,
        baud: 300.0,
        symbol_width,
        symbol_freqs,
        ..Config::default()
    }
}

/// Modulate `packet`, then re-frame it back into a `RawMessage` by running
/// the correlator over one window per symbol period - the in-memory
/// equivalent of the demodulator's DEMODULATE state, skipping LISTEN since
/// we already know exactly where the message starts and ends.
fn round_trip(packet: &Packet, config: &Config) -> Packet {
    let encoded = codec::encode(packet, config.symbol_width);
    let (mut tx, rx) = channel::<RawMessage>(2);
    assert!(tx.try_push(encoded));

    let mut modulator = SenderModulator::new(config, rx);
    let samples_per_symbol = config.samples_per_symbol();
    let mut samples = vec![0.0f32; encoded_sample_count(packet, config)];
    modulator.fill(&mut samples);

    let mut reframed = RawMessage::empty();
    for window in samples.chunks(samples_per_symbol) {
        if window.len() < samples_per_symbol {
            break; // trailing partial window belongs to the interpacket gap
        }
        match correlate(window, &config.symbol_freqs, config.sample_rate, config.silence_threshold) {
            Some(symbol) => reframed.push(symbol as u8),
            None => break, // ran into silence - message is complete
        }
    }

    codec::decode(&reframed, config.symbol_width).expect("round trip should decode cleanly")
}

fn encoded_sample_count(packet: &Packet, config: &Config) -> usize {
    let encoded = codec::encode(packet, config.symbol_width);
    encoded.len() * config.samples_per_symbol()
}

#[test]
fn scenario_hello_round_trips() {
    let config = test_config(1, vec![2200.0, 1200.0]);
    let packet = Packet::new(b"hello".to_vec());
    let decoded = round_trip(&packet, &config);
    assert_eq!(decoded.payload(), b"hello");
}

#[test]
fn scenario_len_zero_round_trips() {
    let config = test_config(1, vec![2200.0, 1200.0]);
    let packet = Packet::new(Vec::new());
    let decoded = round_trip(&packet, &config);
    assert!(decoded.is_empty());
}

#[test]
fn scenario_len_255_round_trips() {
    let config = test_config(1, vec![2200.0, 1200.0]);
    let payload = vec![0xA5u8; sofi::MAX_PAYLOAD];
    let packet = Packet::new(payload.clone());
    let decoded = round_trip(&packet, &config);
    assert_eq!(decoded.payload(), payload.as_slice());
}

#[test]
fn scenario_bit_flip_is_detected_as_crc_mismatch() {
    let config = test_config(1, vec![2200.0, 1200.0]);
    let packet = Packet::new(b"hello".to_vec());
    let mut encoded = codec::encode(&packet, config.symbol_width);

    let mut flipped = RawMessage::empty();
    for (i, &s) in encoded.symbols().iter().enumerate() {
        flipped.push(if i == 10 { s ^ 1 } else { s });
    }
    encoded = flipped;

    let result = codec::decode(&encoded, config.symbol_width);
    assert_eq!(result, Err(sofi::SofiError::CrcMismatch));
}

#[test]
fn scenario_back_to_back_packets_stay_separated_by_the_interpacket_gap() {
    let config = test_config(1, vec![2200.0, 1200.0]);
    let (mut tx, rx) = channel::<RawMessage>(4);
    let first = codec::encode(&Packet::new(b"ab".to_vec()), config.symbol_width);
    let second = codec::encode(&Packet::new(b"cd".to_vec()), config.symbol_width);
    tx.try_push(first);
    tx.try_push(second);

    let mut modulator = SenderModulator::new(&config, rx);
    let samples_per_symbol = config.samples_per_symbol();
    let gap_samples = config.interpacket_gap_samples();
    let total = first.len() * samples_per_symbol + gap_samples + second.len() * samples_per_symbol;
    let mut samples = vec![0.0f32; total];
    modulator.fill(&mut samples);

    // The interpacket gap immediately after the first message's symbols is
    // silent: the correlator should find no carrier there.
    let gap_start = first.len() * samples_per_symbol;
    let gap_window = &samples[gap_start..gap_start + samples_per_symbol];
    let symbol = correlate(gap_window, &config.symbol_freqs, config.sample_rate, config.silence_threshold);
    assert_eq!(symbol, None);
}

/// Exercises the actual production framer (`Demodulator::run`, spawned the
/// same way `Modem::init` spawns it) rather than `round_trip`'s hand-rolled
/// aligned-window correlation, over a recording bracketed by silence on both
/// sides the way a real capture ring would be.
#[test]
fn demodulator_run_frames_one_packet_out_of_a_bracketed_recording() {
    let config = test_config(1, vec![2200.0, 1200.0]);
    let packet = Packet::new(b"hi".to_vec());
    let encoded = codec::encode(&packet, config.symbol_width);

    let (mut mod_tx, mod_rx) = channel::<RawMessage>(2);
    assert!(mod_tx.try_push(encoded));
    let mut modulator = SenderModulator::new(&config, mod_rx);
    let mut carrier = vec![0.0f32; encoded.len() * config.samples_per_symbol()];
    modulator.fill(&mut carrier);

    let silence = vec![0.0f32; config.recv_window_samples() * 4];
    let mut recording = silence.clone();
    recording.extend_from_slice(&carrier);
    recording.extend_from_slice(&silence);

    let (mut capture_tx, capture_rx) = channel::<f32>(recording.len().next_power_of_two());
    assert_eq!(capture_tx.write(&recording), recording.len());

    let queue = Arc::new(RecvQueue::new(4));
    let demodulator = Demodulator::new(&config, capture_rx, queue.clone());
    let cancel = demodulator.cancel_handle();
    let handle = demodulator.spawn();

    let raw = queue.dequeue().expect("demodulator should frame exactly one message");
    let decoded = codec::decode(&raw, config.symbol_width).expect("framed message should decode cleanly");
    assert_eq!(decoded.payload(), b"hi");

    cancel.store(true, Ordering::Release);
    queue.cancel();
    handle.join().expect("demodulator thread should exit after cancellation");
}

#[test]
fn scenario_width_two_round_trips() {
    let config = test_config(2, vec![1200.0, 2200.0, 3200.0, 4200.0]);
    let packet = Packet::new(vec![1u8, 2, 3]);
    let decoded = round_trip(&packet, &config);
    assert_eq!(decoded.payload(), &[1, 2, 3]);
}
