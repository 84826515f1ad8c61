//! Measurement quality scoring.
//!
//! The score starts from completeness (share of core fields present) and
//! loses 0.1 for every impedance fault, capped at 0.5. A fault is a
//! resistance that rises with frequency within one body region, or one that
//! is zero or negative.

use std::collections::BTreeMap;

use vitalgate_core::constants::{QUALITY_EXCELLENT, QUALITY_FAIR, QUALITY_GOOD};
use vitalgate_core::{Measurement, Quality};

/// Each entry is satisfied by any one of its alternatives.
const CORE_FIELDS: &[&[&str]] = &[
    &["weight_kg"],
    &["body_fat_percent"],
    &["fat_free_mass_kg", "skeletal_muscle_mass_kg"],
    &["total_body_water_kg", "total_body_water_percent"],
    &["bmi"],
];

const INVERSION_PENALTY: f64 = 0.1;
const MAX_PENALTY: f64 = 0.5;

#[must_use]
pub fn assess(m: &Measurement) -> Quality {
    from_score(score(m))
}

#[must_use]
pub fn score(m: &Measurement) -> f64 {
    let present = CORE_FIELDS
        .iter()
        .filter(|alternatives| alternatives.iter().any(|name| m.number(name).is_some()))
        .count()
        + usize::from(m.customer_phone.is_some());
    let total = CORE_FIELDS.len() + 1;
    let completeness = present as f64 / total as f64;

    let penalty = (impedance_inversions(m) as f64 * INVERSION_PENALTY).min(MAX_PENALTY);
    (completeness - penalty).max(0.0)
}

#[must_use]
pub fn from_score(score: f64) -> Quality {
    if score >= QUALITY_EXCELLENT {
        Quality::Excellent
    } else if score >= QUALITY_GOOD {
        Quality::Good
    } else if score >= QUALITY_FAIR {
        Quality::Fair
    } else {
        Quality::Poor
    }
}

/// Count resistance readings that rise with frequency or are not positive.
fn impedance_inversions(m: &Measurement) -> usize {
    let mut regions: BTreeMap<&str, Vec<(u32, f64)>> = BTreeMap::new();
    for (name, value) in &m.fields {
        let (Some((region, khz)), Some(ohms)) = (impedance_key(name), value.as_f64()) else {
            continue;
        };
        regions.entry(region).or_default().push((khz, ohms));
    }

    regions
        .values_mut()
        .map(|readings| {
            readings.sort_by_key(|(khz, _)| *khz);
            let non_positive = readings.iter().filter(|(_, ohms)| *ohms <= 0.0).count();
            let rising = readings.windows(2).filter(|w| w[1].1 > w[0].1).count();
            non_positive + rising
        })
        .sum()
}

/// `right_arm_impedance_50khz` -> `("right_arm", 50)`, `impedance_5khz` -> `("", 5)`.
fn impedance_key(name: &str) -> Option<(&str, u32)> {
    let (region, rest) = match name.split_once("impedance_") {
        Some((region, rest)) => (region.trim_end_matches('_'), rest),
        None => return None,
    };
    let khz = rest.strip_suffix("khz")?.parse().ok()?;
    Some((region, khz))
}
