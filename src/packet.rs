// Packet - the caller-facing unit of a So-Fi transmission.

/// Largest payload a single packet can carry (`len` is a `u8`).
pub const MAX_PAYLOAD: usize = u8::MAX as usize;

/// A length-prefixed byte packet: `len` followed by exactly `len` payload
/// bytes. Bytes beyond `len` are never transmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    payload: Vec<u8>,
}

impl Packet {
    /// Build a packet from a payload, truncating to `MAX_PAYLOAD` bytes.
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        let mut payload = payload.into();
        payload.truncate(MAX_PAYLOAD);
        Self { payload }
    }

    /// Build a packet, rejecting payloads over `max_len` bytes rather than
    /// truncating. `max_len` is the caller's configured
    /// `max_message_length`; see `spec.md` §9's open question.
    pub fn new_bounded(payload: impl Into<Vec<u8>>, max_len: usize) -> Option<Self> {
        let payload = payload.into();
        if payload.len() > max_len.min(MAX_PAYLOAD) {
            None
        } else {
            Some(Self { payload })
        }
    }

    pub fn len(&self) -> u8 {
        self.payload.len() as u8
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
