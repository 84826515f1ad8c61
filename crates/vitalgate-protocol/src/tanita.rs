//! Tanita MC-series CSV packets.
//!
//! A packet is one line of comma separated tokens. After the control header
//! the tokens alternate key, value:
//!
//! ```text
//! {0,16,~0,1,~1,1,~2,1,MO,"MC-780",ID,"0965385123",Wk,76.6,FW,18.2,...,CS,A5
//! └──── control groups ─┘└ key/value pairs ───────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use tracing::debug;
use vitalgate_core::constants::{
    TANITA_CHECKSUM_KEY, TANITA_CONTROL_HEADER, TANITA_DATE_KEY, TANITA_ID_KEY,
    TANITA_MODEL_KEY, TANITA_MODEL_MARKER, TANITA_TIME_KEY,
};
use vitalgate_core::{
    DeviceType, Error, FieldValue, Measurement, Result, UnmappedField, extract_phone,
};

use crate::codec::{ChecksumPolicy, DecodeContext};
use crate::fields::{FieldKind, tanita_field, tanita_key_for};
use crate::quality;

/// Decode one Tanita packet.
///
/// # Errors
/// Returns `Error::MalformedPacket` if the control header or model marker is
/// missing, the payload is not UTF-8, a key is empty, or the key/value
/// token count is odd. Returns `Error::ChecksumMismatch` under
/// [`ChecksumPolicy::Verify`] when the trailing checksum disagrees.
pub fn decode(raw: &[u8], ctx: &DecodeContext) -> Result<Measurement> {
    let text = std::str::from_utf8(raw).map_err(|e| Error::malformed(format!("not UTF-8: {e}")))?;
    let line = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');

    let body = line
        .strip_prefix(TANITA_CONTROL_HEADER)
        .ok_or_else(|| Error::malformed("missing control header"))?;
    let pairs = split_pairs(body)?;

    if !pairs
        .iter()
        .any(|(k, v)| *k == TANITA_MODEL_KEY && v.starts_with(TANITA_MODEL_MARKER))
    {
        return Err(Error::malformed("missing vendor model marker"));
    }

    if ctx.checksum == ChecksumPolicy::Verify {
        verify_checksum(line, &pairs)?;
    }

    let mut m = Measurement::new(
        ctx.device_id.clone(),
        DeviceType::TanitaCsv,
        raw.to_vec(),
        ctx.received_at,
    );

    for (key, value) in &pairs {
        let Some(spec) = tanita_field(key) else {
            m.raw_unmapped.push(UnmappedField::new(*key, *value));
            continue;
        };
        if m.fields.contains_key(spec.name) {
            // Repeated key: keep the first, park the rest.
            m.raw_unmapped.push(UnmappedField::new(*key, *value));
            continue;
        }
        let parsed = match spec.kind {
            FieldKind::Text => FieldValue::Text((*value).to_string()),
            FieldKind::Number => FieldValue::parse(value),
        };
        m.fields.insert(spec.name.to_string(), parsed);
    }

    m.customer_phone = value_of(&pairs, TANITA_ID_KEY).and_then(extract_phone);
    if let Some(captured) = captured_at(&pairs) {
        m.captured_at = captured;
    }
    m.quality = quality::assess(&m);

    debug!(
        device_id = %m.device_id,
        pairs = pairs.len(),
        unmapped = m.raw_unmapped.len(),
        "decoded tanita packet"
    );
    Ok(m)
}

/// Re-serialize a measurement into key/value pairs: mapped fields first,
/// in table-key form, then unmapped entries in arrival order.
///
/// Every association comes back, but numeric values are rendered in
/// canonical form (`70.0` becomes `70`, `018.20` becomes `18.2`). Unmapped
/// and text values are returned as received. The exact packet text is kept
/// in [`Measurement::raw`].
#[must_use]
pub fn to_pairs(m: &Measurement) -> Vec<(String, String)> {
    let mut out: Vec<(String, String)> = m
        .fields
        .iter()
        .map(|(name, value)| {
            let key = tanita_key_for(name).unwrap_or(name.as_str());
            (key.to_string(), value.to_string())
        })
        .collect();
    out.extend(
        m.raw_unmapped
            .iter()
            .map(|u| (u.key.clone(), u.value.clone())),
    );
    out
}

fn split_pairs(body: &str) -> Result<Vec<(&str, &str)>> {
    let mut tokens: Vec<&str> = body.split(',').map(str::trim).collect();
    // A trailing comma leaves one empty token behind.
    if tokens.last().is_some_and(|t| t.is_empty()) {
        tokens.pop();
    }
    if tokens.len() % 2 != 0 {
        return Err(Error::malformed(format!(
            "odd key/value token count ({})",
            tokens.len()
        )));
    }

    tokens
        .chunks_exact(2)
        .map(|pair| {
            let key = pair[0];
            if key.is_empty() {
                return Err(Error::malformed("empty key"));
            }
            Ok((key, unquote(pair[1])))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn value_of<'a>(pairs: &[(&'a str, &'a str)], key: &str) -> Option<&'a str> {
    pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn captured_at(pairs: &[(&str, &str)]) -> Option<DateTime<Utc>> {
    let date = NaiveDate::parse_from_str(value_of(pairs, TANITA_DATE_KEY)?, "%d/%m/%Y").ok()?;
    let time_raw = value_of(pairs, TANITA_TIME_KEY)?;
    let time = NaiveTime::parse_from_str(time_raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(time_raw, "%H:%M"))
        .ok()?;
    Some(date.and_time(time).and_utc())
}

/// Checksum is the XOR of every byte before `,CS,`, as two uppercase hex digits.
fn verify_checksum(line: &str, pairs: &[(&str, &str)]) -> Result<()> {
    let actual = value_of(pairs, TANITA_CHECKSUM_KEY)
        .ok_or_else(|| Error::malformed("checksum required but CS field missing"))?;
    let marker = format!(",{TANITA_CHECKSUM_KEY},");
    let end = line
        .rfind(&marker)
        .ok_or_else(|| Error::malformed("checksum field not found"))?;
    let expected = format!("{:02X}", checksum(&line.as_bytes()[..end]));
    if !expected.eq_ignore_ascii_case(actual) {
        return Err(Error::ChecksumMismatch {
            expected,
            actual: actual.to_string(),
        });
    }
    Ok(())
}

fn checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}
