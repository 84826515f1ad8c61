//! Device protocol decoding for the vitalgate gateway.
//!
//! - [`tanita`]: key/value CSV packets from serial analyzers
//! - [`hl7`]: MLLP wrapped HL7 result messages from network analyzers,
//!   plus the ACK/NAK replies they expect
//! - [`framing`]: byte stream to frame splitting for both families
//! - [`fields`]: the static key tables both decoders resolve through
//! - [`quality`]: completeness and impedance stability scoring

pub mod codec;
pub mod fields;
pub mod framing;
pub mod hl7;
pub mod quality;
pub mod tanita;

pub use codec::{ChecksumPolicy, DecodeContext, decode};
pub use fields::{FieldGroup, FieldKind, FieldSpec, TANITA_FIELD_TABLE_VERSION};
pub use framing::{FrameSplitter, LineFramer, MllpFramer, MllpState, wrap_mllp};
pub use hl7::{AckCode, MessageHeader};
