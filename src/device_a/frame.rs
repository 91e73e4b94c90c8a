//! Device-A binary framing: checksum, encoder, and the 4-state deframer
//!.

pub const SYNC_COMMAND: u8 = 0x5A;
pub const SYNC_RESPONSE: u8 = 0xA5;

/// Primary checksum entry point: starting accumulator `0xD5`.
pub fn checksum(data: &[u8]) -> u8 {
    checksum_from(data, 0xD5)
}

/// Legacy rechecksum path for out-of-band byte streams, starting from 0
/// instead of `0xD5`. Preserved even though the primary path uses
/// [`checksum`].
pub fn checksum_legacy(data: &[u8]) -> u8 {
    checksum_from(data, 0)
}

fn checksum_from(data: &[u8], start: u8) -> u8 {
    let mut acc = start;
    for &b in data {
        acc = acc.rotate_left(1);
        acc = acc.wrapping_add(b);
    }
    acc
}

/// Builds a command frame: `[0x5A, len, cmd_id, payload..., crc]`.
///
/// `len` counts sync+length+cmd_id+payload (not the trailing crc); the byte
/// written into the length field is `len + 1`, i.e. the total frame size
/// including the crc.
pub fn encode_command(cmd_id: u8, payload: &[u8]) -> Vec<u8> {
    let header_and_payload_len = 3 + payload.len();
    let total_len = header_and_payload_len + 1;
    let mut buf = Vec::with_capacity(total_len);
    buf.push(SYNC_COMMAND);
    buf.push(total_len as u8);
    buf.push(cmd_id);
    buf.extend_from_slice(payload);
    let crc = checksum(&buf);
    buf.push(crc);
    buf
}

/// A fully deframed response: `cmd_id` plus payload. The trailing crc byte
/// is stripped and not validated — the receiver makes no CRC check on
/// responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub cmd_id: u8,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitSync,
    WaitLen,
    WaitId,
    WaitData,
}

/// The 4-state response deframer. Feed it one byte at a time via
/// [`Deframer::push_byte`]; it returns `Some(frame)` whenever a complete
/// frame is assembled.
pub struct Deframer {
    state: State,
    declared_len: u8,
    cmd_id: u8,
    buf: Vec<u8>,
}

impl Deframer {
    pub fn new() -> Self {
        Self {
            state: State::WaitSync,
            declared_len: 0,
            cmd_id: 0,
            buf: Vec::new(),
        }
    }

    pub fn push_byte(&mut self, byte: u8) -> Option<DecodedFrame> {
        match self.state {
            State::WaitSync => {
                if byte == SYNC_RESPONSE {
                    self.buf.clear();
                    self.buf.push(byte);
                    self.state = State::WaitLen;
                }
                None
            }
            State::WaitLen => {
                if byte < 3 {
                    // Malformed: a frame can't be shorter than its own header.
                    self.state = State::WaitSync;
                    return None;
                }
                self.declared_len = byte;
                self.buf.push(byte);
                self.state = State::WaitId;
                None
            }
            State::WaitId => {
                self.cmd_id = byte;
                self.buf.push(byte);
                self.state = State::WaitData;
                None
            }
            State::WaitData => {
                self.buf.push(byte);
                if self.buf.len() >= self.declared_len as usize {
                    let declared = self.declared_len as usize;
                    // payload excludes the 3-byte header and the trailing crc byte.
                    let payload = if declared > 4 {
                        self.buf[3..declared - 1].to_vec()
                    } else {
                        Vec::new()
                    };
                    let frame = DecodedFrame {
                        cmd_id: self.cmd_id,
                        payload,
                    };
                    self.state = State::WaitSync;
                    self.buf.clear();
                    Some(frame)
                } else {
                    None
                }
            }
        }
    }
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}
