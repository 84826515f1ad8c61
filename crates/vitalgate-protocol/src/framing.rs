//! Frame splitting for device byte streams.
//!
//! Transports deliver arbitrary chunks: half a packet, three packets, or
//! line noise. The framers here accumulate bytes and hand out one complete
//! frame at a time through [`tokio_util::codec::Decoder`], so they work both
//! with `Framed` streams and with a manually fed [`BytesMut`].
//!
//! | Framer | Family | Frame ends at |
//! |--------|--------|---------------|
//! | [`LineFramer`] | Tanita CSV | `\r` or `\n` |
//! | [`MllpFramer`] | InBody HL7 | FS CR |
//!
//! Neither framer caps its buffer: a valid large packet must never be
//! truncated. Memory is bounded by the device, not by the framer.
//!
//! ```
//! use bytes::BytesMut;
//! use tokio_util::codec::Decoder;
//! use vitalgate_protocol::MllpFramer;
//!
//! let mut framer = MllpFramer::new();
//! let mut buf = BytesMut::from(&b"\x0bMSH|^~\\&\rPID|1"[..]);
//! assert!(framer.decode(&mut buf).unwrap().is_none());
//!
//! buf.extend_from_slice(b"\r\x1c\r");
//! let frame = framer.decode(&mut buf).unwrap().unwrap();
//! assert!(frame.ends_with(b"\x1c\r"));
//! ```

use bytes::{BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use vitalgate_core::constants::{HL7_CARRIAGE_RETURN, HL7_END_BLOCK, HL7_START_BLOCK};
use vitalgate_core::{DeviceType, Error, Result};

/// Wrap an HL7 payload in MLLP framing.
#[must_use]
pub fn wrap_mllp(payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(payload.len() + 3);
    out.put_u8(HL7_START_BLOCK);
    out.extend_from_slice(payload);
    out.put_u8(HL7_END_BLOCK);
    out.put_u8(HL7_CARRIAGE_RETURN);
    out.freeze()
}

/// Splits CSV packets on line terminators, skipping blank lines.
///
/// Either `\r` or `\n` ends a frame, so CRLF yields the line plus an empty
/// one that is skipped.
#[derive(Debug, Default)]
pub struct LineFramer {
    /// Bytes of `src` already scanned without finding a terminator.
    scanned: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for LineFramer {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        loop {
            self.scanned = self.scanned.min(src.len());
            let Some(offset) = src[self.scanned..]
                .iter()
                .position(|&b| b == b'\n' || b == b'\r')
            else {
                self.scanned = src.len();
                return Ok(None);
            };
            let end = self.scanned + offset;
            let line = src.split_to(end + 1);
            self.scanned = 0;

            let line = &line[..end];
            if line.iter().all(|b| b.is_ascii_whitespace() || *b == 0) {
                continue;
            }
            return Ok(Some(Bytes::copy_from_slice(line)));
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        // A final line without terminator is still a complete packet.
        self.scanned = 0;
        if src.iter().all(|b| b.is_ascii_whitespace()) {
            src.clear();
            return Ok(None);
        }
        Ok(Some(src.split().freeze()))
    }
}

/// Parser state for [`MllpFramer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MllpState {
    /// Discarding bytes until VT.
    WaitingStart,
    /// Accumulating until FS CR.
    ReadingPayload,
}

/// Splits HL7 messages on the MLLP block trailer.
///
/// Yields the whole frame, VT through CR, so the raw payload is kept verbatim.
#[derive(Debug)]
pub struct MllpFramer {
    state: MllpState,
    scanned: usize,
}

impl MllpFramer {
    pub fn new() -> Self {
        Self {
            state: MllpState::WaitingStart,
            scanned: 0,
        }
    }

    pub fn state(&self) -> MllpState {
        self.state
    }
}

impl Default for MllpFramer {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MllpFramer {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if self.state == MllpState::WaitingStart {
            match src.iter().position(|&b| b == HL7_START_BLOCK) {
                Some(start) => {
                    let _ = src.split_to(start);
                    self.state = MllpState::ReadingPayload;
                    self.scanned = 1;
                }
                None => {
                    src.clear();
                    return Ok(None);
                }
            }
        }

        // The trailer is two bytes, so resume one byte back.
        let from = self.scanned.saturating_sub(1).clamp(1, src.len().max(1));
        let trailer = src[from..]
            .windows(2)
            .position(|w| w == [HL7_END_BLOCK, HL7_CARRIAGE_RETURN]);
        match trailer {
            Some(offset) => {
                let end = from + offset + 2;
                self.state = MllpState::WaitingStart;
                self.scanned = 0;
                Ok(Some(src.split_to(end).freeze()))
            }
            None => {
                self.scanned = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        let pending = src.len();
        src.clear();
        self.state = MllpState::WaitingStart;
        self.scanned = 0;
        if pending > 0 {
            return Err(Error::incomplete(format!(
                "stream closed with {pending} bytes of an unterminated message"
            )));
        }
        Ok(None)
    }
}

impl Encoder<&[u8]> for MllpFramer {
    type Error = Error;

    fn encode(&mut self, payload: &[u8], dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(&wrap_mllp(payload));
        Ok(())
    }
}

/// Framer chosen by device family.
#[derive(Debug)]
pub enum FrameSplitter {
    Line(LineFramer),
    Mllp(MllpFramer),
}

impl FrameSplitter {
    #[must_use]
    pub fn for_device(device_type: DeviceType) -> Self {
        match device_type {
            DeviceType::TanitaCsv => FrameSplitter::Line(LineFramer::new()),
            DeviceType::InbodyHl7 => FrameSplitter::Mllp(MllpFramer::new()),
        }
    }
}

impl Decoder for FrameSplitter {
    type Item = Bytes;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self {
            FrameSplitter::Line(f) => f.decode(src),
            FrameSplitter::Mllp(f) => f.decode(src),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Bytes>> {
        match self {
            FrameSplitter::Line(f) => f.decode_eof(src),
            FrameSplitter::Mllp(f) => f.decode_eof(src),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain<D: Decoder<Item = Bytes, Error = Error>>(d: &mut D, buf: &mut BytesMut) -> Vec<Bytes> {
        let mut out = Vec::new();
        while let Some(frame) = d.decode(buf).unwrap() {
            out.push(frame);
        }
        out
    }

    #[test]
    fn test_line_framer_crlf() {
        let mut f = LineFramer::new();
        let mut buf = BytesMut::from(&b"first\r\nsecond\r\n\r\nthird"[..]);
        let frames = drain(&mut f, &mut buf);
        assert_eq!(frames, vec![Bytes::from("first"), Bytes::from("second")]);
        assert_eq!(&buf[..], b"third");

        buf.extend_from_slice(b"\n");
        assert_eq!(drain(&mut f, &mut buf), vec![Bytes::from("third")]);
    }

    #[test]
    fn test_line_framer_bare_cr_and_lf() {
        // Some firmware ends packets with CR only, some with LF only.
        let mut f = LineFramer::new();
        let mut buf = BytesMut::from(&b"one\rtwo\nthree\r"[..]);
        assert_eq!(
            drain(&mut f, &mut buf),
            vec![Bytes::from("one"), Bytes::from("two"), Bytes::from("three")]
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_line_framer_partial_chunks() {
        let mut f = LineFramer::new();
        let mut buf = BytesMut::new();
        for chunk in [&b"{0,16,"[..], b"~0,1,MO", b",\"MC-780\"", b"\r\n"] {
            buf.extend_from_slice(chunk);
            if let Some(frame) = f.decode(&mut buf).unwrap() {
                assert_eq!(&frame[..], b"{0,16,~0,1,MO,\"MC-780\"");
                return;
            }
        }
        panic!("frame not produced");
    }

    #[test]
    fn test_line_framer_eof_flushes_tail() {
        let mut f = LineFramer::new();
        let mut buf = BytesMut::from(&b"tail"[..]);
        assert_eq!(f.decode_eof(&mut buf).unwrap(), Some(Bytes::from("tail")));
        assert_eq!(f.decode_eof(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_mllp_discards_leading_garbage() {
        let mut f = MllpFramer::new();
        let mut buf = BytesMut::from(&b"noise\x0bPID|1\r\x1c\r"[..]);
        let frames = drain(&mut f, &mut buf);
        assert_eq!(frames, vec![Bytes::from(&b"\x0bPID|1\r\x1c\r"[..])]);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_mllp_trailer_split_across_reads() {
        let mut f = MllpFramer::new();
        let mut buf = BytesMut::from(&b"\x0bOBX|1\r\x1c"[..]);
        assert!(f.decode(&mut buf).unwrap().is_none());
        assert_eq!(f.state(), MllpState::ReadingPayload);
        buf.extend_from_slice(b"\r");
        assert!(f.decode(&mut buf).unwrap().is_some());
        assert_eq!(f.state(), MllpState::WaitingStart);
    }

    #[test]
    fn test_mllp_two_frames_one_read() {
        let mut f = MllpFramer::new();
        let mut buf = BytesMut::from(&b"\x0bA\r\x1c\r\x0bB\r\x1c\r"[..]);
        assert_eq!(drain(&mut f, &mut buf).len(), 2);
    }

    #[test]
    fn test_mllp_no_buffer_cap() {
        let mut f = MllpFramer::new();
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[HL7_START_BLOCK]);
        let big = vec![b'x'; 256 * 1024];
        for chunk in big.chunks(4096) {
            buf.extend_from_slice(chunk);
            assert!(f.decode(&mut buf).unwrap().is_none());
        }
        buf.extend_from_slice(b"\r\x1c\r");
        let frame = f.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.len(), 1 + big.len() + 3);
    }

    #[test]
    fn test_mllp_eof_with_partial_is_incomplete() {
        let mut f = MllpFramer::new();
        let mut buf = BytesMut::from(&b"\x0bPID|1\r"[..]);
        assert!(matches!(
            f.decode_eof(&mut buf),
            Err(Error::IncompleteFrame(_))
        ));
    }

    #[test]
    fn test_encoder_wraps_payload() {
        let mut f = MllpFramer::new();
        let mut dst = BytesMut::new();
        f.encode(&b"MSA|AA|1\r"[..], &mut dst).unwrap();
        assert_eq!(&dst[..], b"\x0bMSA|AA|1\r\x1c\r");
    }
}
