use crate::CloseCode;

/// RFC 6455 frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// continuation of a fragmented text or binary message
    Continuation = 0x0,
    /// a text frame
    Text = 0x1,
    /// a binary frame
    Binary = 0x2,
    /// connection close
    Close = 0x8,
    /// ping
    Ping = 0x9,
    /// pong
    Pong = 0xA,
}

impl Opcode {
    /// recognize a wire opcode
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x0 => Some(Self::Continuation),
            0x1 => Some(Self::Text),
            0x2 => Some(Self::Binary),
            0x8 => Some(Self::Close),
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }

    /// is this a control opcode (close, ping, pong)?
    pub fn is_control(&self) -> bool {
        (*self as u8) >= 0x8
    }
}

/// One decoded frame, unmasked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// final fragment of its message?
    pub fin: bool,
    /// the frame's opcode
    pub opcode: Opcode,
    /// the unmasked payload
    pub payload: Vec<u8>,
}

/// A frame-level protocol violation. Carries the RFC 6455 status code the
/// connection should close with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("websocket protocol error ({code:?}): {message}")]
pub struct FrameError {
    /// the close code to report
    pub code: CloseCode,
    /// what went wrong
    pub message: &'static str,
}

impl FrameError {
    fn new(code: CloseCode, message: &'static str) -> Self {
        Self { code, message }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    MiniHeader,
    Len16,
    Len64,
    Mask,
    Payload,
}

/// The incremental frame decoder: a persistent state machine over
/// `MiniHeader → (Len16|Len64) → Mask → Payload`, fed from raw socket
/// reads. Survives cancellation between reads because all partial state
/// lives here rather than in a future.
#[derive(Debug)]
pub struct FrameDecoder {
    state: ReadState,
    header: Vec<u8>,
    fin: bool,
    opcode: Opcode,
    masked: bool,
    mask: [u8; 4],
    remaining: u64,
    payload: Vec<u8>,
    enforce_masking: bool,
    max_payload: u64,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    /// A decoder with no payload cap, tolerating unmasked client frames.
    /// RFC 6455 requires clients to mask; rejection of unmasked frames is
    /// the opt-in strict setting.
    pub fn new() -> Self {
        Self {
            state: ReadState::MiniHeader,
            header: Vec::with_capacity(8),
            fin: false,
            opcode: Opcode::Continuation,
            masked: false,
            mask: [0; 4],
            remaining: 0,
            payload: Vec::new(),
            enforce_masking: false,
            max_payload: u64::MAX,
        }
    }

    /// cap the accepted payload size; larger frames fail with
    /// [`CloseCode::MessageTooBig`]
    pub fn with_max_payload(mut self, max_payload: u64) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// fail unmasked client frames with [`CloseCode::UnacceptableData`]
    pub fn with_masking_enforcement(mut self) -> Self {
        self.enforce_masking = true;
        self
    }

    /// Consume bytes, returning every frame completed by them.
    pub fn feed(&mut self, mut data: &[u8]) -> Result<Vec<Frame>, FrameError> {
        let mut frames = Vec::new();

        while !data.is_empty() {
            match self.state {
                ReadState::MiniHeader => {
                    if !self.buffer_header(&mut data, 2) {
                        break;
                    }
                    let b0 = self.header[0];
                    let b1 = self.header[1];
                    self.header.clear();

                    if b0 & 0x70 != 0 {
                        return Err(FrameError::new(
                            CloseCode::ProtocolError,
                            "nonzero reserved bits",
                        ));
                    }
                    self.fin = b0 & 0x80 != 0;
                    self.opcode = Opcode::from_u8(b0 & 0x0f).ok_or_else(|| {
                        FrameError::new(CloseCode::ProtocolError, "unknown opcode")
                    })?;
                    self.masked = b1 & 0x80 != 0;
                    if !self.masked && self.enforce_masking {
                        return Err(FrameError::new(
                            CloseCode::UnacceptableData,
                            "client frame not masked",
                        ));
                    }

                    let len7 = u64::from(b1 & 0x7f);
                    if self.opcode.is_control() && (len7 > 125 || !self.fin) {
                        return Err(FrameError::new(
                            CloseCode::ProtocolError,
                            "oversized or fragmented control frame",
                        ));
                    }

                    match len7 {
                        126 => self.state = ReadState::Len16,
                        127 => self.state = ReadState::Len64,
                        _ => {
                            self.remaining = len7;
                            self.check_cap()?;
                            self.state = if self.masked {
                                ReadState::Mask
                            } else {
                                self.start_payload(&mut frames)
                            };
                        }
                    }
                }

                ReadState::Len16 => {
                    if !self.buffer_header(&mut data, 2) {
                        break;
                    }
                    self.remaining = u64::from(u16::from_be_bytes([self.header[0], self.header[1]]));
                    self.header.clear();
                    self.check_cap()?;
                    self.state = if self.masked {
                        ReadState::Mask
                    } else {
                        self.start_payload(&mut frames)
                    };
                }

                ReadState::Len64 => {
                    if !self.buffer_header(&mut data, 8) {
                        break;
                    }
                    let mut bytes = [0u8; 8];
                    bytes.copy_from_slice(&self.header);
                    self.remaining = u64::from_be_bytes(bytes);
                    self.header.clear();
                    self.check_cap()?;
                    self.state = if self.masked {
                        ReadState::Mask
                    } else {
                        self.start_payload(&mut frames)
                    };
                }

                ReadState::Mask => {
                    if !self.buffer_header(&mut data, 4) {
                        break;
                    }
                    self.mask.copy_from_slice(&self.header);
                    self.header.clear();
                    self.state = self.start_payload(&mut frames);
                }

                ReadState::Payload => {
                    let take = usize::try_from(self.remaining)
                        .unwrap_or(usize::MAX)
                        .min(data.len());
                    let offset = self.payload.len();
                    self.payload.extend_from_slice(&data[..take]);
                    if self.masked {
                        for (i, byte) in self.payload[offset..].iter_mut().enumerate() {
                            *byte ^= self.mask[(offset + i) % 4];
                        }
                    }
                    self.remaining -= take as u64;
                    data = &data[take..];
                    if self.remaining == 0 {
                        frames.push(self.complete_frame());
                    }
                }
            }
        }

        Ok(frames)
    }

    fn buffer_header(&mut self, data: &mut &[u8], need: usize) -> bool {
        let take = (need - self.header.len()).min(data.len());
        self.header.extend_from_slice(&data[..take]);
        *data = &data[take..];
        self.header.len() == need
    }

    fn check_cap(&self) -> Result<(), FrameError> {
        if self.remaining > self.max_payload {
            Err(FrameError::new(
                CloseCode::MessageTooBig,
                "payload exceeds maximum",
            ))
        } else {
            Ok(())
        }
    }

    fn start_payload(&mut self, frames: &mut Vec<Frame>) -> ReadState {
        if self.remaining == 0 {
            frames.push(self.complete_frame());
            ReadState::MiniHeader
        } else {
            ReadState::Payload
        }
    }

    fn complete_frame(&mut self) -> Frame {
        self.state = ReadState::MiniHeader;
        Frame {
            fin: self.fin,
            opcode: self.opcode,
            payload: std::mem::take(&mut self.payload),
        }
    }
}

/// Build the two-to-ten byte frame header for a server-sent (unmasked)
/// frame.
pub fn build_header(opcode: Opcode, fin: bool, len: u64) -> Vec<u8> {
    let b0 = (opcode as u8) | if fin { 0x80 } else { 0 };
    if len < 126 {
        vec![b0, len as u8]
    } else if len < 0x1_0000 {
        let mut header = vec![b0, 126];
        header.extend_from_slice(&(len as u16).to_be_bytes());
        header
    } else {
        let mut header = vec![b0, 127];
        header.extend_from_slice(&len.to_be_bytes());
        header
    }
}

/// Encode a complete unmasked frame, as the server sends them.
pub fn encode_frame(opcode: Opcode, fin: bool, payload: &[u8]) -> Vec<u8> {
    let mut out = build_header(opcode, fin, payload.len() as u64);
    out.extend_from_slice(payload);
    out
}

/// Encode a masked frame, as clients send them. Exists for tests and
/// tooling; the server never masks.
pub fn encode_masked_frame(opcode: Opcode, fin: bool, payload: &[u8], mask: [u8; 4]) -> Vec<u8> {
    let b0 = (opcode as u8) | if fin { 0x80 } else { 0 };
    let len = payload.len() as u64;
    let mut out = if len < 126 {
        vec![b0, 0x80 | len as u8]
    } else if len < 0x1_0000 {
        let mut header = vec![b0, 0x80 | 126];
        header.extend_from_slice(&(len as u16).to_be_bytes());
        header
    } else {
        let mut header = vec![b0, 0x80 | 127];
        header.extend_from_slice(&len.to_be_bytes());
        header
    };
    out.extend_from_slice(&mask);
    out.extend(
        payload
            .iter()
            .enumerate()
            .map(|(i, byte)| byte ^ mask[i % 4]),
    );
    out
}

#[cfg(test)]
mod test {
    use super::*;

    fn decode_one(decoder: &mut FrameDecoder, bytes: &[u8]) -> Frame {
        let mut frames = decoder.feed(bytes).unwrap();
        assert_eq!(frames.len(), 1);
        frames.pop().unwrap()
    }

    #[test]
    fn round_trip_boundary_lengths() {
        for len in [0usize, 1, 125, 126, 127, 65535, 65536] {
            let payload = vec![0xABu8; len];
            // control frames are only valid up to 125 bytes
            let mut opcodes = vec![Opcode::Text, Opcode::Binary];
            if len <= 125 {
                opcodes.push(Opcode::Pong);
            }
            for opcode in opcodes {
                let encoded = encode_frame(opcode, true, &payload);
                let mut decoder = FrameDecoder::new();
                let frame = decode_one(&mut decoder, &encoded);
                assert_eq!(frame.opcode, opcode);
                assert!(frame.fin);
                assert_eq!(frame.payload, payload, "len {len}");
                assert_eq!(encode_frame(frame.opcode, frame.fin, &frame.payload), encoded);
            }
        }
    }

    #[test]
    fn masked_round_trip() {
        let payload = b"masked payload".to_vec();
        let encoded = encode_masked_frame(Opcode::Text, true, &payload, [1, 2, 3, 4]);
        let mut decoder = FrameDecoder::new();
        let frame = decode_one(&mut decoder, &encoded);
        assert_eq!(frame.payload, payload);
    }

    #[test]
    fn byte_at_a_time() {
        let encoded = encode_masked_frame(Opcode::Binary, true, &[9u8; 300], [7, 7, 7, 7]);
        let mut decoder = FrameDecoder::new();
        let mut frames = Vec::new();
        for byte in &encoded {
            frames.extend(decoder.feed(std::slice::from_ref(byte)).unwrap());
        }
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, vec![9u8; 300]);
    }

    #[test]
    fn empty_ping() {
        // \x89\x00: unmasked ping with empty payload
        let mut decoder = FrameDecoder::new();
        let frame = decode_one(&mut decoder, b"\x89\x00");
        assert_eq!(frame.opcode, Opcode::Ping);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn unmasked_is_rejected_under_enforcement() {
        let mut decoder = FrameDecoder::new().with_masking_enforcement();
        let err = decoder.feed(b"\x81\x02hi").unwrap_err();
        assert_eq!(err.code, CloseCode::UnacceptableData);
    }

    #[test]
    fn reserved_bits_are_rejected() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.feed(&[0xC1, 0x80]).unwrap_err();
        assert_eq!(err.code, CloseCode::ProtocolError);
    }

    #[test]
    fn oversized_payload_is_rejected() {
        let mut decoder = FrameDecoder::new().with_max_payload(8);
        let encoded = encode_masked_frame(Opcode::Binary, true, &[0u8; 16], [0, 0, 0, 0]);
        let err = decoder.feed(&encoded).unwrap_err();
        assert_eq!(err.code, CloseCode::MessageTooBig);
    }

    #[test]
    fn fragmented_control_frame_is_rejected() {
        // ping without fin
        let mut decoder = FrameDecoder::new();
        let err = decoder.feed(&[0x09, 0x80]).unwrap_err();
        assert_eq!(err.code, CloseCode::ProtocolError);
    }

    #[test]
    fn interleaved_frames() {
        let mut bytes = encode_masked_frame(Opcode::Text, false, b"hel", [1, 1, 1, 1]);
        bytes.extend(encode_masked_frame(Opcode::Ping, true, b"", [2, 2, 2, 2]));
        bytes.extend(encode_masked_frame(Opcode::Continuation, true, b"lo", [3, 3, 3, 3]));
        let mut decoder = FrameDecoder::new();
        let frames = decoder.feed(&bytes).unwrap();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].opcode, Opcode::Text);
        assert!(!frames[0].fin);
        assert_eq!(frames[1].opcode, Opcode::Ping);
        assert_eq!(frames[2].opcode, Opcode::Continuation);
        assert_eq!(frames[2].payload, b"lo");
    }
}
