#![allow(dead_code)]

use chrono::{SubsecRound, Utc};
use vitalgate_core::{DeviceId, DeviceType, FieldValue, Measurement, Quality};

pub fn measurement(weight: f64) -> Measurement {
    let mut m = Measurement::new(
        DeviceId::new("tanita_ttyUSB0").unwrap(),
        DeviceType::TanitaCsv,
        format!("{{0,16,~0,1,~1,1,~2,1,MO,\"MC-780\",Wk,{weight}\r\n").into_bytes(),
        Utc::now().trunc_subsecs(6),
    );
    m.customer_phone = Some("0965385123".into());
    m.fields.insert("weight_kg".into(), FieldValue::Number(weight));
    m.quality = Quality::Good;
    m
}
