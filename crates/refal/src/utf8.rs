//! Strict streaming UTF-8 codec.
//!
//! The decoder consumes one octet at a time and keeps only a two-bit counter
//! of remaining continuation bytes, so callers can feed bytes from any source
//! without buffering. Validation is strict: overlong encodings, surrogate
//! scalars, stray continuation bytes and leads `>= 0xf5` are all rejected.

use thiserror::Error;

/// Decoding failure. The decoder is left in its initial state afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Utf8Error {
    /// A lead byte in `0x80..=0xbf` or `>= 0xf5`, or a non-continuation byte
    /// where a continuation byte was required.
    #[error("invalid UTF-8 sequence")]
    Invalid,
    /// The input ended in the middle of a multi-byte sequence.
    #[error("incomplete UTF-8 sequence")]
    Incomplete,
    /// A sequence decoding to a surrogate or an overlong form.
    #[error("invalid Unicode scalar value")]
    InvalidScalar,
}

/// Streaming decoder: feed octets, collect scalars.
#[derive(Debug, Clone, Copy, Default)]
pub struct Decoder {
    /// Remaining continuation bytes for the scalar under construction.
    pending: u8,
    /// Accumulated bits of the scalar under construction.
    acc: u32,
    /// Total bytes of the current sequence, for overlong detection.
    seq_len: u8,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while the decoder is mid-sequence.
    pub fn is_pending(&self) -> bool {
        self.pending != 0
    }

    /// Feeds one octet. Returns a scalar when a sequence completes.
    pub fn push(&mut self, octet: u8) -> Result<Option<char>, Utf8Error> {
        if self.pending == 0 {
            match octet {
                0x00..=0x7f => return Ok(Some(char::from(octet))),
                0xc0..=0xdf => {
                    self.pending = 1;
                    self.seq_len = 2;
                    self.acc = u32::from(octet & 0x1f);
                }
                0xe0..=0xef => {
                    self.pending = 2;
                    self.seq_len = 3;
                    self.acc = u32::from(octet & 0x0f);
                }
                0xf0..=0xf4 => {
                    self.pending = 3;
                    self.seq_len = 4;
                    self.acc = u32::from(octet & 0x07);
                }
                // Continuation bytes must not come first, and 0xf5..=0xff
                // would encode scalars beyond 0x10FFFF.
                _ => return Err(Utf8Error::Invalid),
            }
            return Ok(None);
        }
        if octet & 0xc0 != 0x80 {
            *self = Self::new();
            return Err(Utf8Error::Invalid);
        }
        self.acc = (self.acc << 6) | u32::from(octet & 0x3f);
        self.pending -= 1;
        if self.pending != 0 {
            return Ok(None);
        }
        let scalar = self.acc;
        let seq_len = self.seq_len;
        *self = Self::new();
        let min = match seq_len {
            2 => 0x80,
            3 => 0x800,
            _ => 0x10000,
        };
        if scalar < min {
            return Err(Utf8Error::InvalidScalar);
        }
        char::from_u32(scalar).map(Some).ok_or(Utf8Error::InvalidScalar)
    }
}

/// Decodes the scalar at the start of `bytes`.
///
/// Returns the scalar and the number of octets it occupied.
pub fn decode(bytes: &[u8]) -> Result<(char, usize), Utf8Error> {
    let mut decoder = Decoder::new();
    for (i, &octet) in bytes.iter().enumerate() {
        if let Some(chr) = decoder.push(octet)? {
            return Ok((chr, i + 1));
        }
    }
    Err(Utf8Error::Incomplete)
}

/// Encodes `chr` into `buf`, returning the number of octets written.
pub fn encode(chr: char, buf: &mut [u8; 4]) -> usize {
    chr.encode_utf8(buf).len()
}
