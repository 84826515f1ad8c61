//! Static key tables for both device families.
//!
//! Tanita packets carry two-letter keys; InBody HL7 messages carry OBX
//! observation codes. Both resolve to the same semantic field names so a
//! measurement reads the same regardless of which analyzer produced it.
//!
//! The Tanita table is versioned. Bump [`TANITA_FIELD_TABLE_VERSION`] when a
//! key is added or renamed so stored measurements can be re-mapped from
//! their raw payload.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Version of [`TANITA_FIELDS`].
pub const TANITA_FIELD_TABLE_VERSION: u32 = 1;

/// Which part of the report a field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldGroup {
    Metadata,
    Basic,
    Composition,
    Metabolic,
    Segmental,
    Impedance,
    PhaseAngle,
}

/// How a raw value should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Number,
    /// Kept verbatim. Identifiers such as `0965385123` must not lose their leading zero.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub key: &'static str,
    pub name: &'static str,
    pub group: FieldGroup,
    pub kind: FieldKind,
}

const fn field(key: &'static str, name: &'static str, group: FieldGroup, kind: FieldKind) -> FieldSpec {
    FieldSpec {
        key,
        name,
        group,
        kind,
    }
}

/// Tanita MC-series key table.
///
/// Segment letters: `R` right arm, `L` left arm, `r` right leg, `l` left leg,
/// `T` trunk, `W` whole body. Impedance frequency letters: `j`/`J` 1 kHz,
/// `k`/`K` 5 kHz, `n`/`N` 50 kHz, `q`/`Q` 250 kHz, `u`/`U` 500 kHz,
/// `v`/`V` 1000 kHz.
pub static TANITA_FIELDS: &[FieldSpec] = &[
    // Metadata
    field("MO", "model", FieldGroup::Metadata, FieldKind::Text),
    field("ID", "customer_id", FieldGroup::Metadata, FieldKind::Text),
    field("St", "status", FieldGroup::Metadata, FieldKind::Number),
    field("Da", "date", FieldGroup::Metadata, FieldKind::Text),
    field("TI", "time", FieldGroup::Metadata, FieldKind::Text),
    field("Bt", "body_type", FieldGroup::Metadata, FieldKind::Number),
    field("GE", "gender", FieldGroup::Metadata, FieldKind::Number),
    field("AG", "age", FieldGroup::Metadata, FieldKind::Number),
    field("Hm", "height_cm", FieldGroup::Metadata, FieldKind::Number),
    field("Pt", "clothes_weight_kg", FieldGroup::Metadata, FieldKind::Number),
    field("CS", "checksum", FieldGroup::Metadata, FieldKind::Text),
    // Basic measurements
    field("Wk", "weight_kg", FieldGroup::Basic, FieldKind::Number),
    field("MI", "bmi", FieldGroup::Basic, FieldKind::Number),
    field("OV", "obesity_degree_percent", FieldGroup::Basic, FieldKind::Number),
    field("Sw", "standard_weight_kg", FieldGroup::Basic, FieldKind::Number),
    field("Sf", "standard_fat_percent", FieldGroup::Basic, FieldKind::Number),
    field("SM", "standard_muscle_kg", FieldGroup::Basic, FieldKind::Number),
    field("LP", "leg_muscle_score", FieldGroup::Basic, FieldKind::Number),
    field("BA", "athlete_flag", FieldGroup::Basic, FieldKind::Number),
    field("BF", "body_fat_rating", FieldGroup::Basic, FieldKind::Number),
    field("gF", "target_fat_percent", FieldGroup::Basic, FieldKind::Number),
    field("gW", "target_weight_kg", FieldGroup::Basic, FieldKind::Number),
    field("gf", "target_fat_mass_kg", FieldGroup::Basic, FieldKind::Number),
    field("gt", "target_weight_delta_kg", FieldGroup::Basic, FieldKind::Number),
    // Body composition
    field("FW", "body_fat_percent", FieldGroup::Composition, FieldKind::Number),
    field("fW", "fat_mass_kg", FieldGroup::Composition, FieldKind::Number),
    field("MW", "fat_free_mass_kg", FieldGroup::Composition, FieldKind::Number),
    field("mW", "muscle_mass_kg", FieldGroup::Composition, FieldKind::Number),
    field("sW", "muscle_score", FieldGroup::Composition, FieldKind::Number),
    field("bW", "bone_mass_kg", FieldGroup::Composition, FieldKind::Number),
    field("wW", "total_body_water_kg", FieldGroup::Composition, FieldKind::Number),
    field("ww", "total_body_water_percent", FieldGroup::Composition, FieldKind::Number),
    field("wI", "intracellular_water_kg", FieldGroup::Composition, FieldKind::Number),
    field("wO", "extracellular_water_kg", FieldGroup::Composition, FieldKind::Number),
    field("wo", "extracellular_water_percent", FieldGroup::Composition, FieldKind::Number),
    // Metabolic
    field("IF", "visceral_fat_rating", FieldGroup::Metabolic, FieldKind::Number),
    field("rB", "bmr_kj", FieldGroup::Metabolic, FieldKind::Number),
    field("rb", "bmr_kcal", FieldGroup::Metabolic, FieldKind::Number),
    field("rJ", "bmr_score", FieldGroup::Metabolic, FieldKind::Number),
    field("rA", "metabolic_age", FieldGroup::Metabolic, FieldKind::Number),
    // Segments: sub-field letter + segment letter
    field("FR", "right_arm_fat_percent", FieldGroup::Segmental, FieldKind::Number),
    field("fR", "right_arm_fat_mass_kg", FieldGroup::Segmental, FieldKind::Number),
    field("MR", "right_arm_fat_free_mass_kg", FieldGroup::Segmental, FieldKind::Number),
    field("mR", "right_arm_muscle_kg", FieldGroup::Segmental, FieldKind::Number),
    field("sR", "right_arm_muscle_score", FieldGroup::Segmental, FieldKind::Number),
    field("FL", "left_arm_fat_percent", FieldGroup::Segmental, FieldKind::Number),
    field("fL", "left_arm_fat_mass_kg", FieldGroup::Segmental, FieldKind::Number),
    field("ML", "left_arm_fat_free_mass_kg", FieldGroup::Segmental, FieldKind::Number),
    field("mL", "left_arm_muscle_kg", FieldGroup::Segmental, FieldKind::Number),
    field("sL", "left_arm_muscle_score", FieldGroup::Segmental, FieldKind::Number),
    field("Fr", "right_leg_fat_percent", FieldGroup::Segmental, FieldKind::Number),
    field("fr", "right_leg_fat_mass_kg", FieldGroup::Segmental, FieldKind::Number),
    field("Mr", "right_leg_fat_free_mass_kg", FieldGroup::Segmental, FieldKind::Number),
    field("mr", "right_leg_muscle_kg", FieldGroup::Segmental, FieldKind::Number),
    field("sr", "right_leg_muscle_score", FieldGroup::Segmental, FieldKind::Number),
    field("Fl", "left_leg_fat_percent", FieldGroup::Segmental, FieldKind::Number),
    field("fl", "left_leg_fat_mass_kg", FieldGroup::Segmental, FieldKind::Number),
    field("Ml", "left_leg_fat_free_mass_kg", FieldGroup::Segmental, FieldKind::Number),
    field("ml", "left_leg_muscle_kg", FieldGroup::Segmental, FieldKind::Number),
    field("sl", "left_leg_muscle_score", FieldGroup::Segmental, FieldKind::Number),
    field("FT", "trunk_fat_percent", FieldGroup::Segmental, FieldKind::Number),
    field("fT", "trunk_fat_mass_kg", FieldGroup::Segmental, FieldKind::Number),
    field("MT", "trunk_fat_free_mass_kg", FieldGroup::Segmental, FieldKind::Number),
    field("mT", "trunk_muscle_kg", FieldGroup::Segmental, FieldKind::Number),
    field("sT", "trunk_muscle_score", FieldGroup::Segmental, FieldKind::Number),
    // Impedance: lowercase resistance, uppercase reactance, then region letter
    field("jR", "right_arm_impedance_1khz", FieldGroup::Impedance, FieldKind::Number),
    field("JR", "right_arm_reactance_1khz", FieldGroup::Impedance, FieldKind::Number),
    field("jL", "left_arm_impedance_1khz", FieldGroup::Impedance, FieldKind::Number),
    field("JL", "left_arm_reactance_1khz", FieldGroup::Impedance, FieldKind::Number),
    field("jr", "right_leg_impedance_1khz", FieldGroup::Impedance, FieldKind::Number),
    field("Jr", "right_leg_reactance_1khz", FieldGroup::Impedance, FieldKind::Number),
    field("jl", "left_leg_impedance_1khz", FieldGroup::Impedance, FieldKind::Number),
    field("Jl", "left_leg_reactance_1khz", FieldGroup::Impedance, FieldKind::Number),
    field("jT", "trunk_impedance_1khz", FieldGroup::Impedance, FieldKind::Number),
    field("JT", "trunk_reactance_1khz", FieldGroup::Impedance, FieldKind::Number),
    field("jW", "impedance_1khz", FieldGroup::Impedance, FieldKind::Number),
    field("JW", "reactance_1khz", FieldGroup::Impedance, FieldKind::Number),
    field("kR", "right_arm_impedance_5khz", FieldGroup::Impedance, FieldKind::Number),
    field("KR", "right_arm_reactance_5khz", FieldGroup::Impedance, FieldKind::Number),
    field("kL", "left_arm_impedance_5khz", FieldGroup::Impedance, FieldKind::Number),
    field("KL", "left_arm_reactance_5khz", FieldGroup::Impedance, FieldKind::Number),
    field("kr", "right_leg_impedance_5khz", FieldGroup::Impedance, FieldKind::Number),
    field("Kr", "right_leg_reactance_5khz", FieldGroup::Impedance, FieldKind::Number),
    field("kl", "left_leg_impedance_5khz", FieldGroup::Impedance, FieldKind::Number),
    field("Kl", "left_leg_reactance_5khz", FieldGroup::Impedance, FieldKind::Number),
    field("kT", "trunk_impedance_5khz", FieldGroup::Impedance, FieldKind::Number),
    field("KT", "trunk_reactance_5khz", FieldGroup::Impedance, FieldKind::Number),
    field("kW", "impedance_5khz", FieldGroup::Impedance, FieldKind::Number),
    field("KW", "reactance_5khz", FieldGroup::Impedance, FieldKind::Number),
    field("nR", "right_arm_impedance_50khz", FieldGroup::Impedance, FieldKind::Number),
    field("NR", "right_arm_reactance_50khz", FieldGroup::Impedance, FieldKind::Number),
    field("nL", "left_arm_impedance_50khz", FieldGroup::Impedance, FieldKind::Number),
    field("NL", "left_arm_reactance_50khz", FieldGroup::Impedance, FieldKind::Number),
    field("nr", "right_leg_impedance_50khz", FieldGroup::Impedance, FieldKind::Number),
    field("Nr", "right_leg_reactance_50khz", FieldGroup::Impedance, FieldKind::Number),
    field("nl", "left_leg_impedance_50khz", FieldGroup::Impedance, FieldKind::Number),
    field("Nl", "left_leg_reactance_50khz", FieldGroup::Impedance, FieldKind::Number),
    field("nT", "trunk_impedance_50khz", FieldGroup::Impedance, FieldKind::Number),
    field("NT", "trunk_reactance_50khz", FieldGroup::Impedance, FieldKind::Number),
    field("nW", "impedance_50khz", FieldGroup::Impedance, FieldKind::Number),
    field("NW", "reactance_50khz", FieldGroup::Impedance, FieldKind::Number),
    field("qR", "right_arm_impedance_250khz", FieldGroup::Impedance, FieldKind::Number),
    field("QR", "right_arm_reactance_250khz", FieldGroup::Impedance, FieldKind::Number),
    field("qL", "left_arm_impedance_250khz", FieldGroup::Impedance, FieldKind::Number),
    field("QL", "left_arm_reactance_250khz", FieldGroup::Impedance, FieldKind::Number),
    field("qr", "right_leg_impedance_250khz", FieldGroup::Impedance, FieldKind::Number),
    field("Qr", "right_leg_reactance_250khz", FieldGroup::Impedance, FieldKind::Number),
    field("ql", "left_leg_impedance_250khz", FieldGroup::Impedance, FieldKind::Number),
    field("Ql", "left_leg_reactance_250khz", FieldGroup::Impedance, FieldKind::Number),
    field("qT", "trunk_impedance_250khz", FieldGroup::Impedance, FieldKind::Number),
    field("QT", "trunk_reactance_250khz", FieldGroup::Impedance, FieldKind::Number),
    field("qW", "impedance_250khz", FieldGroup::Impedance, FieldKind::Number),
    field("QW", "reactance_250khz", FieldGroup::Impedance, FieldKind::Number),
    field("uR", "right_arm_impedance_500khz", FieldGroup::Impedance, FieldKind::Number),
    field("UR", "right_arm_reactance_500khz", FieldGroup::Impedance, FieldKind::Number),
    field("uL", "left_arm_impedance_500khz", FieldGroup::Impedance, FieldKind::Number),
    field("UL", "left_arm_reactance_500khz", FieldGroup::Impedance, FieldKind::Number),
    field("ur", "right_leg_impedance_500khz", FieldGroup::Impedance, FieldKind::Number),
    field("Ur", "right_leg_reactance_500khz", FieldGroup::Impedance, FieldKind::Number),
    field("ul", "left_leg_impedance_500khz", FieldGroup::Impedance, FieldKind::Number),
    field("Ul", "left_leg_reactance_500khz", FieldGroup::Impedance, FieldKind::Number),
    field("uT", "trunk_impedance_500khz", FieldGroup::Impedance, FieldKind::Number),
    field("UT", "trunk_reactance_500khz", FieldGroup::Impedance, FieldKind::Number),
    field("uW", "impedance_500khz", FieldGroup::Impedance, FieldKind::Number),
    field("UW", "reactance_500khz", FieldGroup::Impedance, FieldKind::Number),
    field("vR", "right_arm_impedance_1000khz", FieldGroup::Impedance, FieldKind::Number),
    field("VR", "right_arm_reactance_1000khz", FieldGroup::Impedance, FieldKind::Number),
    field("vL", "left_arm_impedance_1000khz", FieldGroup::Impedance, FieldKind::Number),
    field("VL", "left_arm_reactance_1000khz", FieldGroup::Impedance, FieldKind::Number),
    field("vr", "right_leg_impedance_1000khz", FieldGroup::Impedance, FieldKind::Number),
    field("Vr", "right_leg_reactance_1000khz", FieldGroup::Impedance, FieldKind::Number),
    field("vl", "left_leg_impedance_1000khz", FieldGroup::Impedance, FieldKind::Number),
    field("Vl", "left_leg_reactance_1000khz", FieldGroup::Impedance, FieldKind::Number),
    field("vT", "trunk_impedance_1000khz", FieldGroup::Impedance, FieldKind::Number),
    field("VT", "trunk_reactance_1000khz", FieldGroup::Impedance, FieldKind::Number),
    field("vW", "impedance_1000khz", FieldGroup::Impedance, FieldKind::Number),
    field("VW", "reactance_1000khz", FieldGroup::Impedance, FieldKind::Number),
    // Phase angle at 50 kHz
    field("pR", "right_arm_phase_angle", FieldGroup::PhaseAngle, FieldKind::Number),
    field("pL", "left_arm_phase_angle", FieldGroup::PhaseAngle, FieldKind::Number),
    field("pr", "right_leg_phase_angle", FieldGroup::PhaseAngle, FieldKind::Number),
    field("pl", "left_leg_phase_angle", FieldGroup::PhaseAngle, FieldKind::Number),
    field("pT", "trunk_phase_angle", FieldGroup::PhaseAngle, FieldKind::Number),
    field("pW", "phase_angle", FieldGroup::PhaseAngle, FieldKind::Number),
];

static TANITA_BY_KEY: LazyLock<HashMap<&'static str, &'static FieldSpec>> =
    LazyLock::new(|| TANITA_FIELDS.iter().map(|f| (f.key, f)).collect());

static TANITA_BY_NAME: LazyLock<HashMap<&'static str, &'static FieldSpec>> =
    LazyLock::new(|| TANITA_FIELDS.iter().map(|f| (f.name, f)).collect());

/// Resolve a Tanita key.
#[must_use]
pub fn tanita_field(key: &str) -> Option<&'static FieldSpec> {
    TANITA_BY_KEY.get(key).copied()
}

/// Reverse lookup used when re-serializing a measurement.
#[must_use]
pub fn tanita_key_for(name: &str) -> Option<&'static str> {
    TANITA_BY_NAME.get(name).map(|f| f.key)
}

/// InBody OBX observation code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObservationCode {
    pub code: &'static str,
    pub name: &'static str,
}

const fn obs(code: &'static str, name: &'static str) -> ObservationCode {
    ObservationCode { code, name }
}

/// InBody observation codes. `PBF`/`FAT` and the short segmental codes are
/// firmware aliases.
pub static HL7_OBSERVATIONS: &[ObservationCode] = &[
    obs("WT", "weight_kg"),
    obs("HT", "height_cm"),
    obs("BMI", "bmi"),
    obs("PBF", "body_fat_percent"),
    obs("FAT", "body_fat_percent"),
    obs("BFM", "fat_mass_kg"),
    obs("FFM", "fat_free_mass_kg"),
    obs("SMM", "skeletal_muscle_mass_kg"),
    obs("SLM", "soft_lean_mass_kg"),
    obs("TBW", "total_body_water_kg"),
    obs("ICW", "intracellular_water_kg"),
    obs("ECW", "extracellular_water_kg"),
    obs("ECWR", "extracellular_water_ratio"),
    obs("PROT", "protein_kg"),
    obs("MIN", "mineral_kg"),
    obs("BMC", "bone_mineral_content_kg"),
    obs("BMR", "bmr_kcal"),
    obs("VFL", "visceral_fat_rating"),
    obs("WHR", "waist_hip_ratio"),
    obs("OB", "obesity_degree_percent"),
    obs("SCORE", "fitness_score"),
    obs("TW", "target_weight_kg"),
    obs("WC", "weight_control_kg"),
    obs("FC", "fat_control_kg"),
    obs("MC", "muscle_control_kg"),
    // Segmental lean mass; the three-letter forms come from older firmware.
    obs("LLRA", "right_arm_muscle_kg"),
    obs("LLLA", "left_arm_muscle_kg"),
    obs("LLTR", "trunk_muscle_kg"),
    obs("LLRL", "right_leg_muscle_kg"),
    obs("LLLL", "left_leg_muscle_kg"),
    obs("LRA", "right_arm_muscle_kg"),
    obs("LLA", "left_arm_muscle_kg"),
    obs("LTR", "trunk_muscle_kg"),
    obs("LRL", "right_leg_muscle_kg"),
    obs("LLL", "left_leg_muscle_kg"),
    // Segmental fat mass
    obs("FRA", "right_arm_fat_mass_kg"),
    obs("FLA", "left_arm_fat_mass_kg"),
    obs("FTR", "trunk_fat_mass_kg"),
    obs("FRL", "right_leg_fat_mass_kg"),
    obs("FLL", "left_leg_fat_mass_kg"),
    // Impedance at 20 and 100 kHz
    obs("Z20RA", "right_arm_impedance_20khz"),
    obs("Z20LA", "left_arm_impedance_20khz"),
    obs("Z20TR", "trunk_impedance_20khz"),
    obs("Z20RL", "right_leg_impedance_20khz"),
    obs("Z20LL", "left_leg_impedance_20khz"),
    obs("Z100RA", "right_arm_impedance_100khz"),
    obs("Z100LA", "left_arm_impedance_100khz"),
    obs("Z100TR", "trunk_impedance_100khz"),
    obs("Z100RL", "right_leg_impedance_100khz"),
    obs("Z100LL", "left_leg_impedance_100khz"),
    obs("PA50", "phase_angle"),
];

/// Resolve an OBX code, ignoring case.
#[must_use]
pub fn hl7_observation(code: &str) -> Option<&'static ObservationCode> {
    HL7_OBSERVATIONS
        .iter()
        .find(|o| o.code.eq_ignore_ascii_case(code))
}
