//! Wire-level and operational constants shared across the gateway.
//!
//! Two device families are supported:
//!
//! ```text
//! Tanita (serial, CRLF terminated):
//!   {0,16,~0,1,~1,1,~2,1,MO,"MC-780",ID,"0965385123",Wk,76.6,...,CS,A5\r\n
//!
//! InBody (TCP, MLLP wrapped HL7 v2):
//!   <VT>MSH|^~\&|...\rPID|...\rOBX|...\r<FS><CR>
//! ```
//!
//! | Constant | Value | Purpose |
//! |----------|-------|---------|
//! | [`HL7_START_BLOCK`] | `0x0B` | MLLP start of block |
//! | [`HL7_END_BLOCK`] | `0x1C` | MLLP end of block |
//! | [`HL7_CARRIAGE_RETURN`] | `0x0D` | segment terminator and MLLP trailer |
//! | [`TANITA_CONTROL_HEADER`] | `{0,16,~0,1,~1,1,~2,1,` | leading control groups |
//!
//! Timeouts are in milliseconds unless the name says otherwise.

// ============================================================================
// Tanita CSV
// ============================================================================

/// Leading control groups every Tanita packet starts with.
pub const TANITA_CONTROL_HEADER: &str = "{0,16,~0,1,~1,1,~2,1,";

/// Key carrying the model string.
pub const TANITA_MODEL_KEY: &str = "MO";

/// Model marker for the MC series analyzers.
pub const TANITA_MODEL_MARKER: &str = "MC-";

/// Key carrying the trailing checksum.
pub const TANITA_CHECKSUM_KEY: &str = "CS";

/// Key carrying the free-form customer identifier.
pub const TANITA_ID_KEY: &str = "ID";

/// Key carrying the measurement date (`dd/mm/yyyy`).
pub const TANITA_DATE_KEY: &str = "Da";

/// Key carrying the measurement time (`HH:MM`).
pub const TANITA_TIME_KEY: &str = "TI";

/// Default serial baud rate for both analyzers.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

// ============================================================================
// HL7 / MLLP
// ============================================================================

/// MLLP start of block (VT).
pub const HL7_START_BLOCK: u8 = 0x0B;

/// MLLP end of block (FS).
pub const HL7_END_BLOCK: u8 = 0x1C;

/// Segment terminator, also the last byte of the MLLP trailer.
pub const HL7_CARRIAGE_RETURN: u8 = 0x0D;

/// HL7 field separator.
pub const HL7_FIELD_SEPARATOR: char = '|';

/// HL7 component separator.
pub const HL7_COMPONENT_SEPARATOR: char = '^';

/// Encoding characters emitted in generated MSH segments.
pub const HL7_ENCODING_CHARACTERS: &str = "^~\\&";

/// HL7 version written into generated ACK messages when the inbound one has none.
pub const HL7_DEFAULT_VERSION: &str = "2.5";

/// Sending application written into generated ACK messages.
pub const HL7_ACK_APPLICATION: &str = "VITALGATE";

/// Sending facility written into generated ACK messages.
pub const HL7_ACK_FACILITY: &str = "GATEWAY";

/// Default TCP port for the HL7 listener.
pub const DEFAULT_HL7_PORT: u16 = 2575;

// ============================================================================
// Phone numbers
// ============================================================================

/// Country calling code stripped from identifiers.
pub const PHONE_COUNTRY_CODE: &str = "84";

/// Length of a canonical local phone number.
pub const PHONE_LOCAL_LENGTH: usize = 10;

/// Accepted two-digit prefixes of a canonical local number.
pub const PHONE_VALID_PREFIXES: [&str; 6] = ["09", "08", "07", "05", "03", "02"];

// ============================================================================
// Device timing
// ============================================================================

/// Default read timeout (milliseconds). Reads never block longer than this.
pub const DEFAULT_READ_TIMEOUT: u64 = 2000;

/// Default timeout for opening a transport (milliseconds).
pub const DEFAULT_CONNECT_TIMEOUT: u64 = 5000;

/// Fixed delay between a transport failure and the next reconnection attempt (milliseconds).
pub const DEFAULT_RECONNECT_BACKOFF: u64 = 2000;

/// Consecutive errors after which a device is reported as `error`.
pub const DEFAULT_ERROR_CEILING: u32 = 10;

/// Window without a heartbeat after which a device is reported disconnected (milliseconds).
pub const DEFAULT_HEARTBEAT_TIMEOUT: u64 = 120_000;

/// How long a triggered measurement may stay in progress (milliseconds).
pub const DEFAULT_MEASUREMENT_TIMEOUT: u64 = 90_000;

/// Maximum number of state transitions kept per device for diagnostics.
pub const MAX_STATE_HISTORY: usize = 100;

// ============================================================================
// Quality thresholds
// ============================================================================

/// Minimum score for `Quality::Excellent`.
pub const QUALITY_EXCELLENT: f64 = 0.9;

/// Minimum score for `Quality::Good`.
pub const QUALITY_GOOD: f64 = 0.75;

/// Minimum score for `Quality::Fair`.
pub const QUALITY_FAIR: f64 = 0.5;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mllp_bytes_are_distinct() {
        assert_ne!(HL7_START_BLOCK, HL7_END_BLOCK);
        assert_ne!(HL7_END_BLOCK, HL7_CARRIAGE_RETURN);
    }

    #[test]
    fn test_quality_thresholds_ordered() {
        assert!(QUALITY_EXCELLENT > QUALITY_GOOD);
        assert!(QUALITY_GOOD > QUALITY_FAIR);
        assert!(QUALITY_FAIR > 0.0);
    }
}
