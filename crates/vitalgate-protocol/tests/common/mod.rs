//! Shared builders for protocol integration tests.

#![allow(dead_code)]

use vitalgate_core::DeviceId;
use vitalgate_protocol::{DecodeContext, wrap_mllp};

pub const TANITA_HEADER: &str = "{0,16,~0,1,~1,1,~2,1,";

/// Build a Tanita packet from key/value pairs, model marker first.
pub fn tanita_packet(pairs: &[(&str, &str)]) -> String {
    let mut packet = format!("{TANITA_HEADER}MO,\"MC-780\"");
    for (key, value) in pairs {
        packet.push(',');
        packet.push_str(key);
        packet.push(',');
        packet.push_str(value);
    }
    packet
}

/// Build an MLLP framed ORU message carrying one OBX per observation.
pub fn hl7_frame(control_id: &str, phone: &str, observations: &[(&str, &str)]) -> Vec<u8> {
    let mut payload = format!(
        "MSH|^~\\&|InBody270|Clinic|||20240101100000||ORU^R01|{control_id}|P|2.5\rPID|1||{phone}\r"
    );
    for (i, (code, value)) in observations.iter().enumerate() {
        payload.push_str(&format!("OBX|{}|NM|{code}||{value}|\r", i + 1));
    }
    wrap_mllp(payload.as_bytes()).to_vec()
}

pub fn ctx(id: &str) -> DecodeContext {
    DecodeContext::new(DeviceId::new(id).expect("valid test device id"))
}
