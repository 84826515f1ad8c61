//! InBody HL7 v2 result messages and their acknowledgments.
//!
//! Only the pieces the gateway needs: `MSH` for the control id and
//! timestamps, `PID` for the customer, `OBR` for the observation time,
//! `OBX` for the values and `NTE` for free-text notes.
//!
//! # Wire Format
//!
//! ```text
//! <VT>MSH|^~\&|InBody|Clinic|||20240101100000||ORU^R01|MSG0001|P|2.5<CR>
//! PID|1||0965385123^^^^MR<CR>
//! OBX|1|NM|WT^Weight||76.6|kg<CR>
//! <FS><CR>
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::debug;
use vitalgate_core::constants::{
    HL7_ACK_APPLICATION, HL7_ACK_FACILITY, HL7_CARRIAGE_RETURN, HL7_COMPONENT_SEPARATOR,
    HL7_DEFAULT_VERSION, HL7_ENCODING_CHARACTERS, HL7_END_BLOCK, HL7_FIELD_SEPARATOR,
    HL7_START_BLOCK,
};
use vitalgate_core::{
    DeviceType, Error, FieldValue, Measurement, Result, UnmappedField, extract_phone,
};

use crate::codec::DecodeContext;
use crate::fields::hl7_observation;
use crate::framing::wrap_mllp;
use crate::quality;

/// One `|` delimited segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub name: &'a str,
    parts: Vec<&'a str>,
}

impl<'a> Segment<'a> {
    fn parse(line: &'a str) -> Self {
        let parts: Vec<&str> = line.split(HL7_FIELD_SEPARATOR).collect();
        Segment {
            name: parts.first().copied().unwrap_or_default(),
            parts,
        }
    }

    /// Field by its HL7 position (`PID-3` is `field(3)`).
    ///
    /// In `MSH` the separator itself is field 1, so positions shift by one.
    #[must_use]
    pub fn field(&self, position: usize) -> Option<&'a str> {
        let index = if self.name == "MSH" {
            position.checked_sub(1)?
        } else {
            position
        };
        if index == 0 {
            return None;
        }
        self.parts
            .get(index)
            .copied()
            .filter(|f| !f.is_empty())
    }

    /// First component of a field.
    #[must_use]
    pub fn component(&self, position: usize) -> Option<&'a str> {
        self.field(position)?
            .split(HL7_COMPONENT_SEPARATOR)
            .next()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// The parts of `MSH` an acknowledgment has to echo back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub sending_application: String,
    pub sending_facility: String,
    pub timestamp: Option<String>,
    pub message_type: String,
    pub trigger_event: String,
    pub control_id: String,
    pub version: String,
}

impl MessageHeader {
    fn from_segment(msh: &Segment<'_>) -> Self {
        let mut message_type = msh.field(9).unwrap_or_default().split(HL7_COMPONENT_SEPARATOR);
        Self {
            sending_application: msh.field(3).unwrap_or_default().to_string(),
            sending_facility: msh.field(4).unwrap_or_default().to_string(),
            timestamp: msh.field(7).map(str::to_string),
            message_type: message_type.next().unwrap_or_default().to_string(),
            trigger_event: message_type.next().unwrap_or_default().to_string(),
            control_id: msh.field(10).unwrap_or_default().to_string(),
            version: msh.field(12).unwrap_or_default().to_string(),
        }
    }
}

/// Acknowledgment code written to `MSA-1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    /// Application accept.
    Accept,
    /// Application error: the message was understood but could not be processed.
    Error,
    /// Application reject: the message could not be parsed.
    Reject,
}

impl AckCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AckCode::Accept => "AA",
            AckCode::Error => "AE",
            AckCode::Reject => "AR",
        }
    }
}

/// Strip MLLP framing and return the HL7 payload.
///
/// # Errors
/// Returns `Error::IncompleteFrame` if the block trailer (FS CR) is missing.
pub fn unwrap_mllp(raw: &[u8]) -> Result<&[u8]> {
    let start = raw
        .iter()
        .position(|&b| b == HL7_START_BLOCK)
        .map_or(0, |p| p + 1);
    let body = &raw[start..];
    let trimmed_end = body
        .iter()
        .rposition(|b| !b.is_ascii_whitespace() || *b == HL7_CARRIAGE_RETURN)
        .map_or(0, |p| p + 1);
    let body = &body[..trimmed_end];
    match body {
        [payload @ .., HL7_END_BLOCK, HL7_CARRIAGE_RETURN] => Ok(payload),
        _ => Err(Error::incomplete("missing HL7 block trailer")),
    }
}

/// Parse `MSH` out of a frame, even one that will not decode.
#[must_use]
pub fn parse_header(raw: &[u8]) -> Option<MessageHeader> {
    let start = raw.iter().position(|&b| b == HL7_START_BLOCK).map_or(0, |p| p + 1);
    let text = String::from_utf8_lossy(&raw[start..]);
    text.split(['\r', '\n'])
        .map(|l| l.trim_matches(|c: char| c.is_whitespace() || c == '\u{1c}'))
        .find(|l| l.starts_with("MSH"))
        .map(|l| MessageHeader::from_segment(&Segment::parse(l)))
}

/// Decode one MLLP frame.
///
/// # Errors
/// - `Error::IncompleteFrame` without the block trailer
/// - `Error::MalformedPacket` for non UTF-8 payloads or a message without
///   `PID` or `OBX`
pub fn decode(raw: &[u8], ctx: &DecodeContext) -> Result<Measurement> {
    let payload = unwrap_mllp(raw)?;
    let text =
        std::str::from_utf8(payload).map_err(|e| Error::malformed(format!("not UTF-8: {e}")))?;
    let segments: Vec<Segment<'_>> = text
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(Segment::parse)
        .collect();

    let pid = segments
        .iter()
        .find(|s| s.name == "PID")
        .ok_or_else(|| Error::malformed("no PID segment"))?;
    let observations: Vec<&Segment<'_>> = segments.iter().filter(|s| s.name == "OBX").collect();
    if observations.is_empty() {
        return Err(Error::malformed("no OBX segment"));
    }

    let mut m = Measurement::new(
        ctx.device_id.clone(),
        DeviceType::InbodyHl7,
        raw.to_vec(),
        ctx.received_at,
    );

    m.customer_phone = pid
        .component(3)
        .and_then(extract_phone)
        .or_else(|| pid.component(2).and_then(extract_phone));

    for (index, obx) in observations.iter().enumerate() {
        let value = obx.field(5).unwrap_or_default().trim();
        let Some(code) = obx.component(3) else {
            m.raw_unmapped
                .push(UnmappedField::new(format!("OBX-{}", index + 1), value));
            continue;
        };
        match hl7_observation(code) {
            Some(o) if !m.fields.contains_key(o.name) => {
                m.fields.insert(o.name.to_string(), FieldValue::parse(value));
            }
            _ => m.raw_unmapped.push(UnmappedField::new(code, value)),
        }
    }

    for nte in segments.iter().filter(|s| s.name == "NTE") {
        if let Some(comment) = nte.field(3) {
            m.raw_unmapped.push(UnmappedField::new("NTE", comment));
        }
    }

    let obr_time = segments
        .iter()
        .find(|s| s.name == "OBR")
        .and_then(|obr| obr.field(7))
        .and_then(parse_timestamp);
    let msh_time = segments
        .iter()
        .find(|s| s.name == "MSH")
        .and_then(|msh| msh.field(7))
        .and_then(parse_timestamp);
    if let Some(captured) = obr_time.or(msh_time) {
        m.captured_at = captured;
    }
    m.quality = quality::assess(&m);

    debug!(
        device_id = %m.device_id,
        observations = observations.len(),
        unmapped = m.raw_unmapped.len(),
        "decoded hl7 message"
    );
    Ok(m)
}

/// Build an MLLP framed `ACK` for `header`.
///
/// A missing header yields an acknowledgment with an empty control id so the
/// sender still sees a response.
#[must_use]
pub fn build_ack(
    header: Option<&MessageHeader>,
    code: AckCode,
    text: Option<&str>,
    now: DateTime<Utc>,
) -> Vec<u8> {
    let empty = MessageHeader::default();
    let header = header.unwrap_or(&empty);
    let trigger = if header.trigger_event.is_empty() {
        "R01"
    } else {
        header.trigger_event.as_str()
    };
    let version = if header.version.is_empty() {
        HL7_DEFAULT_VERSION
    } else {
        header.version.as_str()
    };
    let timestamp = now.format("%Y%m%d%H%M%S");

    let mut msa = format!("MSA|{}|{}", code.as_str(), escape(&header.control_id));
    if let Some(text) = text {
        msa.push('|');
        msa.push_str(&escape(text));
    }

    let message = format!(
        "MSH|{enc}|{app}|{fac}|{recv_app}|{recv_fac}|{timestamp}||ACK^{trigger}|ACK{millis}|P|{version}\r{msa}\r",
        enc = HL7_ENCODING_CHARACTERS,
        app = HL7_ACK_APPLICATION,
        fac = HL7_ACK_FACILITY,
        recv_app = escape(&header.sending_application),
        recv_fac = escape(&header.sending_facility),
        millis = now.timestamp_millis(),
    );
    wrap_mllp(message.as_bytes()).to_vec()
}

/// Positive acknowledgment for a decoded frame.
#[must_use]
pub fn ack_for(raw: &[u8], now: DateTime<Utc>) -> Vec<u8> {
    build_ack(parse_header(raw).as_ref(), AckCode::Accept, None, now)
}

/// Negative acknowledgment for a frame that failed to decode.
#[must_use]
pub fn nak_for(raw: &[u8], error: &Error, now: DateTime<Utc>) -> Vec<u8> {
    let reason = error.to_string();
    build_ack(
        parse_header(raw).as_ref(),
        AckCode::Error,
        Some(&reason),
        now,
    )
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    // Drop fractional seconds and timezone offsets: YYYYMMDDHHMM[SS][.S][+ZZZZ]
    let digits: String = raw.chars().take_while(char::is_ascii_digit).collect();
    let parsed = match digits.len() {
        14 => NaiveDateTime::parse_from_str(&digits, "%Y%m%d%H%M%S"),
        12 => NaiveDateTime::parse_from_str(&digits, "%Y%m%d%H%M"),
        _ => return None,
    };
    parsed.ok().map(|dt| dt.and_utc())
}

fn escape(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '|' | '^' | '~' | '\\' | '&' | '\r' | '\n' => ' ',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use vitalgate_core::DeviceId;

    fn frame(segments: &[&str]) -> Vec<u8> {
        let mut payload = segments.join("\r");
        payload.push('\r');
        wrap_mllp(payload.as_bytes()).to_vec()
    }

    fn sample() -> Vec<u8> {
        frame(&[
            r"MSH|^~\&|InBody270|Clinic|||20240101100000||ORU^R01|MSG0001|P|2.5",
            "PID|1||0965385123^^^^MR||Nguyen^An",
            "OBR|1|||BCA|||20240101095900",
            "OBX|1|NM|WT^Weight||76.6|kg",
            "OBX|2|NM|HT^Height||170.0|cm",
            "OBX|3|NM|PBF^Percent Body Fat||18.2|%",
            "OBX|4|NM|BMI^BMI||26.5|kg/m2",
            "OBX|5|NM|SMM^Skeletal Muscle||33.1|kg",
            "OBX|6|NM|TBW^Total Body Water||45.0|kg",
            "OBX|7|NM|XYZ^Vendor Extension||1.5|",
            "NTE|1||calibrated",
        ])
    }

    fn ctx() -> DecodeContext {
        DecodeContext::new(DeviceId::new("inbody_0.0.0.0_2575").unwrap())
    }

    #[test]
    fn test_decode_sample() {
        let m = decode(&sample(), &ctx()).unwrap();
        assert_eq!(m.number("weight_kg"), Some(76.6));
        assert_eq!(m.number("body_fat_percent"), Some(18.2));
        assert_eq!(m.number("skeletal_muscle_mass_kg"), Some(33.1));
        assert_eq!(m.customer_phone.as_deref(), Some("0965385123"));
        assert_eq!(m.captured_at.to_rfc3339(), "2024-01-01T09:59:00+00:00");
        assert_eq!(
            m.raw_unmapped,
            vec![
                UnmappedField::new("XYZ", "1.5"),
                UnmappedField::new("NTE", "calibrated"),
            ]
        );
        assert_eq!(m.quality, vitalgate_core::Quality::Excellent);
    }

    #[test]
    fn test_missing_trailer_is_incomplete() {
        let mut raw = sample();
        raw.truncate(raw.len() - 2);
        assert!(matches!(decode(&raw, &ctx()), Err(Error::IncompleteFrame(_))));
    }

    #[test]
    fn test_missing_pid_is_malformed() {
        let raw = frame(&["MSH|^~\\&|A|B|||20240101||ORU^R01|1|P|2.5", "OBX|1|NM|WT||70|kg"]);
        assert!(matches!(decode(&raw, &ctx()), Err(Error::MalformedPacket { .. })));
    }

    #[test]
    fn test_missing_obx_is_malformed() {
        let raw = frame(&["MSH|^~\\&|A|B|||20240101||ORU^R01|1|P|2.5", "PID|1||0965385123"]);
        assert!(matches!(decode(&raw, &ctx()), Err(Error::MalformedPacket { .. })));
    }

    #[test]
    fn test_alias_codes_do_not_overwrite() {
        let raw = frame(&[
            "PID|1||0965385123",
            "OBX|1|NM|PBF||18.2|%",
            "OBX|2|NM|FAT||18.3|%",
        ]);
        let m = decode(&raw, &ctx()).unwrap();
        assert_eq!(m.number("body_fat_percent"), Some(18.2));
        assert_eq!(m.raw_unmapped, vec![UnmappedField::new("FAT", "18.3")]);
    }

    #[test]
    fn test_segmental_lean_mass_codes() {
        let raw = frame(&[
            "PID|1||0965385123",
            "OBX|1|NM|LLRA^Lean Right Arm||3.1|kg",
            "OBX|2|NM|LLLL^Lean Left Leg||9.4|kg",
            "OBX|3|NM|LTR^Lean Trunk||25.0|kg",
        ]);
        let m = decode(&raw, &ctx()).unwrap();
        assert_eq!(m.number("right_arm_muscle_kg"), Some(3.1));
        assert_eq!(m.number("left_leg_muscle_kg"), Some(9.4));
        assert_eq!(m.number("trunk_muscle_kg"), Some(25.0));
        assert!(m.raw_unmapped.is_empty());
    }

    #[test]
    fn test_timestamp_falls_back_to_msh_then_receipt() {
        let received = Utc::now();
        let raw = frame(&[
            "MSH|^~\\&|A|B|||202401011200||ORU^R01|1|P|2.5",
            "PID|1||0965385123",
            "OBX|1|NM|WT||70|kg",
        ]);
        let m = decode(&raw, &ctx().received_at(received)).unwrap();
        assert_eq!(m.captured_at.to_rfc3339(), "2024-01-01T12:00:00+00:00");

        let raw = frame(&["PID|1||0965385123", "OBX|1|NM|WT||70|kg"]);
        let m = decode(&raw, &ctx().received_at(received)).unwrap();
        assert_eq!(m.captured_at, received);
    }

    #[test]
    fn test_segment_field_positions() {
        let msh = Segment::parse(r"MSH|^~\&|App|Fac|||20240101||ORU^R01|CTRL9|P|2.5");
        assert_eq!(msh.field(3), Some("App"));
        assert_eq!(msh.field(10), Some("CTRL9"));
        let pid = Segment::parse("PID|1||0965385123^^^^MR");
        assert_eq!(pid.field(3), Some("0965385123^^^^MR"));
        assert_eq!(pid.component(3), Some("0965385123"));
        assert_eq!(pid.field(2), None);
    }

    #[test]
    fn test_ack_references_control_id() {
        let now = Utc::now();
        let ack = ack_for(&sample(), now);
        assert_eq!(ack.first(), Some(&HL7_START_BLOCK));
        assert!(ack.ends_with(&[HL7_END_BLOCK, HL7_CARRIAGE_RETURN]));
        let text = String::from_utf8_lossy(&ack);
        assert!(text.contains("ACK^R01"));
        assert!(text.contains("MSA|AA|MSG0001"));
        assert!(text.contains("|InBody270|Clinic|"));
    }

    #[test]
    fn test_nak_carries_reason() {
        let raw = frame(&["MSH|^~\\&|A|B|||20240101||ORU^R01|CTRL2|P|2.3", "PID|1||x"]);
        let err = decode(&raw, &ctx()).unwrap_err();
        let nak = nak_for(&raw, &err, Utc::now());
        let text = String::from_utf8_lossy(&nak);
        assert!(text.contains("MSA|AE|CTRL2|Malformed packet: no OBX segment"));
        assert!(text.contains("|P|2.3\r"));
    }

    #[test]
    fn test_nak_without_header() {
        let nak = nak_for(b"garbage", &Error::malformed("x"), Utc::now());
        let text = String::from_utf8_lossy(&nak);
        assert!(text.contains("MSA|AE||"));
    }

    #[test]
    fn test_unwrap_mllp_variants() {
        assert_eq!(unwrap_mllp(b"\x0bPID\r\x1c\r").unwrap(), b"PID\r");
        // Missing start block is tolerated.
        assert_eq!(unwrap_mllp(b"PID\r\x1c\r").unwrap(), b"PID\r");
        assert!(unwrap_mllp(b"\x0bPID\r").is_err());
        assert!(unwrap_mllp(b"\x0bPID\r\x1c").is_err());
    }
}
