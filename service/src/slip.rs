//! SLIP framing of the serial stream.
//!
//! Every packet the device sends is terminated by `END`. Occurrences of `END` and `ESC` inside a
//! packet are replaced by the two byte sequences `ESC ESC_END` and `ESC ESC_ESC`. Reads from the
//! serial port don't respect packet boundaries, so a packet (or even an escape sequence) may be
//! split between two reads.

use crate::command::MAX_PACKET_LEN;
use thiserror::Error;

pub const END: u8 = 0xC0;
pub const ESC: u8 = 0xDB;
pub const ESC_END: u8 = 0xDC;
pub const ESC_ESC: u8 = 0xDD;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    /// An escape was followed by something other than `ESC_END` or `ESC_ESC`.
    #[error("SLIP protocol error: unexpected byte 0x{byte:02x} after escape at offset {offset}")]
    InvalidEscape { offset: usize, byte: u8 },
    /// More bytes arrived without an `END` than the longest packet can take up.
    #[error("SLIP protocol error: {len} bytes without a packet end")]
    FrameTooLong { len: usize },
}

/// The outcome of a single [`decode`] call.
#[derive(Debug, PartialEq, Eq)]
pub struct Decoded<'a> {
    /// Complete, unescaped packets in the order they appeared. Never contains empty packets.
    pub packets: Vec<Vec<u8>>,
    /// Everything after the last `END`. This has to be prepended to the next read.
    pub remainder: &'a [u8],
}

/// Splits `data` into packets.
///
/// The escape state is reset at every `END`, so the remainder can always be decoded from scratch
/// once more data is available. On error nothing is consumed.
pub fn decode(data: &[u8]) -> Result<Decoded<'_>, FramingError> {
    let mut packets = Vec::new();
    let mut packet = Vec::new();
    let mut escaped = false;
    let mut rest_start = 0;

    for (offset, &byte) in data.iter().enumerate() {
        let byte = match byte {
            END => {
                rest_start = offset + 1;
                escaped = false;
                if !packet.is_empty() {
                    packets.push(std::mem::take(&mut packet));
                }
                continue;
            }
            ESC => {
                escaped = true;
                continue;
            }
            ESC_END if escaped => END,
            ESC_ESC if escaped => ESC,
            _ if escaped => return Err(FramingError::InvalidEscape { offset, byte }),
            _ => byte,
        };
        escaped = false;
        packet.push(byte);
    }

    Ok(Decoded {
        packets,
        remainder: &data[rest_start..],
    })
}

/// Appends `packet` to `out` escaped and terminated with `END`.
pub fn encode(packet: &[u8], out: &mut Vec<u8>) {
    out.reserve(packet.len() + 1);
    for &byte in packet {
        match byte {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.push(byte),
        }
    }
    out.push(END);
}

/// Decoder state for one logical stream.
///
/// Holds on to the bytes after the last seen `END` and feeds them back in front of the next
/// chunk. Those bytes carry both an incomplete packet and a dangling escape, if any.
#[derive(Debug)]
pub struct Decoder {
    fragment: Vec<u8>,
    max_fragment_len: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder {
    /// A decoder for the packets the M8 sends.
    pub fn new() -> Self {
        Self::with_max_packet_len(MAX_PACKET_LEN)
    }

    /// A decoder that gives up once more than `max_packet_len` unescaped bytes could be pending.
    pub fn with_max_packet_len(max_packet_len: usize) -> Self {
        Self {
            fragment: Vec::new(),
            // Every byte of a packet may have been escaped.
            max_fragment_len: 2 * max_packet_len,
        }
    }

    /// Decodes the packets completed by `chunk`.
    ///
    /// If this fails, the carried bytes and `chunk` stay unconsumed. The stream can't be
    /// resynchronized from that point, the caller is expected to give up on it.
    pub fn decode(&mut self, chunk: &[u8]) -> Result<Vec<Vec<u8>>, FramingError> {
        self.fragment.extend_from_slice(chunk);
        let Decoded { packets, remainder } = decode(&self.fragment)?;
        if remainder.len() > self.max_fragment_len {
            return Err(FramingError::FrameTooLong {
                len: remainder.len(),
            });
        }
        let consumed = self.fragment.len() - remainder.len();
        self.fragment.drain(..consumed);
        Ok(packets)
    }

    /// The bytes that were received but are not part of a complete packet yet.
    pub fn pending(&self) -> &[u8] {
        &self.fragment
    }
}
