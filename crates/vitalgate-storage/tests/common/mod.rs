#![allow(dead_code)]

use chrono::{SubsecRound, Utc};
use vitalgate_core::{DeviceId, DeviceType, FieldValue, Measurement, Quality};
use vitalgate_storage::Database;

pub fn measurement(device: &str, weight: f64) -> Measurement {
    let raw = format!("{{0,16,~0,1,~1,1,~2,1,MO,\"MC-780\",Wk,{weight}\r\n");
    let mut m = Measurement::new(
        DeviceId::new(device).unwrap(),
        DeviceType::TanitaCsv,
        raw.into_bytes(),
        // Stored timestamps keep microseconds.
        Utc::now().trunc_subsecs(6),
    );
    m.customer_phone = Some("0965385123".into());
    m.fields.insert("weight_kg".into(), FieldValue::Number(weight));
    m.quality = Quality::Good;
    m
}

pub async fn count(db: &Database, table: &str) -> i64 {
    let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(db.pool())
        .await
        .unwrap();
    n
}
