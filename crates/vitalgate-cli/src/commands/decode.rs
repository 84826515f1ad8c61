//! `vitalgate decode`: run a captured byte stream through the same framing
//! and decoding a live connection uses.

use std::path::Path;

use anyhow::{Context, bail};
use bytes::BytesMut;
use chrono::Utc;
use tokio_util::codec::Decoder;
use tracing::warn;
use vitalgate_core::constants::HL7_START_BLOCK;
use vitalgate_core::{DeviceId, DeviceType, Endpoint, Measurement};
use vitalgate_protocol::{ChecksumPolicy, DecodeContext, FrameSplitter, decode, wrap_mllp};

/// Outcome of one frame found in a capture.
#[derive(Debug)]
pub struct DecodedFrame {
    /// 1-based position of the frame in the capture.
    pub index: usize,
    pub result: vitalgate_core::Result<Measurement>,
}

/// Split `raw` into frames and decode each one.
///
/// An HL7 capture without any MLLP start byte is taken to be a single bare
/// message, as saved by most HL7 viewers.
pub fn decode_capture(
    raw: &[u8],
    device_type: DeviceType,
    ctx: &DecodeContext,
) -> Vec<DecodedFrame> {
    let mut buf = if device_type == DeviceType::InbodyHl7 && !raw.contains(&HL7_START_BLOCK) {
        BytesMut::from(&wrap_mllp(raw.trim_ascii())[..])
    } else {
        BytesMut::from(raw)
    };

    let mut splitter = FrameSplitter::for_device(device_type);
    let mut frames = Vec::new();
    loop {
        let index = frames.len() + 1;
        match splitter.decode_eof(&mut buf) {
            Ok(Some(frame)) => frames.push(DecodedFrame {
                index,
                result: decode(&frame, device_type, ctx),
            }),
            Ok(None) => break,
            Err(e) => {
                frames.push(DecodedFrame {
                    index,
                    result: Err(e),
                });
                break;
            }
        }
    }
    frames
}

pub fn execute(path: &Path, device_type: DeviceType, checksum: ChecksumPolicy) -> anyhow::Result<()> {
    let raw = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
    let device_id = DeviceId::derive(
        device_type,
        &Endpoint::Serial {
            path: path.display().to_string(),
        },
    );
    let ctx = DecodeContext::new(device_id)
        .received_at(Utc::now())
        .checksum(checksum);

    let frames = decode_capture(&raw, device_type, &ctx);
    let mut decoded = 0usize;
    for frame in &frames {
        match &frame.result {
            Ok(measurement) => {
                decoded += 1;
                println!("{}", serde_json::to_string_pretty(measurement)?);
            }
            Err(e) => warn!(frame = frame.index, error = %e, "Frame rejected"),
        }
    }

    if decoded == 0 {
        bail!(
            "no measurement decoded from {} ({} frame(s) found)",
            path.display(),
            frames.len()
        );
    }
    eprintln!("{decoded} of {} frame(s) decoded", frames.len());
    Ok(())
}
