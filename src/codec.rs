// Symbol codec - packet bytes <-> on-air symbol sequence.
//
// Frame layout: len (1 byte) | payload (len bytes) | crc32 (4 bytes, LE).
// Each byte expands to `8 / symbol_width` symbols, least-significant-symbol
// first, each masked to `symbol_width` bits.

use crate::crc::crc32;
use crate::error::SofiError;
use crate::packet::{MAX_PAYLOAD, Packet};

/// `1 (len) + MAX_PAYLOAD + 4 (crc)` bytes, expanded at the narrowest symbol
/// width (1 bit/symbol, 8 symbols/byte) — the largest a `RawMessage` can get.
pub const MAX_FRAME_BYTES: usize = 1 + MAX_PAYLOAD + 4;
pub const MAX_SYMBOLS: usize = MAX_FRAME_BYTES * 8;

/// A frame expressed as its symbol sequence — the fixed-capacity, `Copy`
/// element type carried one-per-slot by the send ring and the receive queue.
#[derive(Clone, Copy)]
pub struct RawMessage {
    symbols: [u8; MAX_SYMBOLS],
    len: usize,
}

impl RawMessage {
    pub fn empty() -> Self {
        Self {
            symbols: [0u8; MAX_SYMBOLS],
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn symbols(&self) -> &[u8] {
        &self.symbols[..self.len]
    }

    /// Append one symbol, silently dropping it once `MAX_SYMBOLS` is
    /// reached (`spec.md` §4.4 "Symbol appending").
    pub fn push(&mut self, symbol: u8) {
        if self.len < MAX_SYMBOLS {
            self.symbols[self.len] = symbol;
            self.len += 1;
        }
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for RawMessage {
    fn default() -> Self {
        Self::empty()
    }
}

impl PartialEq for RawMessage {
    fn eq(&self, other: &Self) -> bool {
        self.symbols() == other.symbols()
    }
}

impl std::fmt::Debug for RawMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawMessage")
            .field("len", &self.len)
            .field("symbols", &self.symbols())
            .finish()
    }
}

/// Encode a packet into its on-air symbol sequence for the given
/// `symbol_width` (one of `{1, 2, 4, 8}`).
pub fn encode(packet: &Packet, symbol_width: u32) -> RawMessage {
    debug_assert!(matches!(symbol_width, 1 | 2 | 4 | 8));

    let mut bytes = Vec::with_capacity(1 + packet.payload().len() + 4);
    bytes.push(packet.len());
    bytes.extend_from_slice(packet.payload());
    let crc = crc32(&bytes);
    bytes.extend_from_slice(&crc.to_le_bytes());

    let symbols_per_byte = 8 / symbol_width;
    let mask = (1u32 << symbol_width) - 1;

    let mut msg = RawMessage::empty();
    for byte in bytes {
        for j in 0..symbols_per_byte {
            let symbol = ((byte as u32 >> (symbol_width * j)) & mask) as u8;
            msg.push(symbol);
        }
    }
    msg
}

/// Decode a symbol sequence back into a packet, validating the frame CRC.
pub fn decode(msg: &RawMessage, symbol_width: u32) -> Result<Packet, SofiError> {
    debug_assert!(matches!(symbol_width, 1 | 2 | 4 | 8));

    let symbols_per_byte = (8 / symbol_width) as usize;
    let symbols = msg.symbols();

    let num_bytes = symbols.len() / symbols_per_byte;
    let mut buf = vec![0u8; num_bytes];
    for (i, &symbol) in symbols.iter().enumerate() {
        let byte_idx = i / symbols_per_byte;
        let shift = symbol_width * (i % symbols_per_byte) as u32;
        if byte_idx < buf.len() {
            buf[byte_idx] |= symbol << shift;
        }
    }

    if buf.is_empty() {
        return Err(SofiError::CrcMismatch);
    }
    let len = buf[0] as usize;
    let required_bytes = 1 + len + 4;
    if buf.len() < required_bytes {
        return Err(SofiError::CrcMismatch);
    }

    let crc_rx = u32::from_le_bytes(buf[1 + len..1 + len + 4].try_into().unwrap());
    let crc_calc = crc32(&buf[..1 + len]);
    if crc_rx != crc_calc {
        return Err(SofiError::CrcMismatch);
    }

    Ok(Packet::new(buf[1..1 + len].to_vec()))
}
