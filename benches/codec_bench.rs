//! Decoder and framer throughput.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use bytes::BytesMut;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tokio_util::codec::Decoder;
use vitalgate_core::{DeviceId, DeviceType};
use vitalgate_protocol::fields::TANITA_FIELDS;
use vitalgate_protocol::{DecodeContext, MllpFramer, decode, wrap_mllp};

/// A packet carrying every numeric key of the table.
fn full_tanita_packet() -> Vec<u8> {
    let mut packet = String::from("{0,16,~0,1,~1,1,~2,1,MO,\"MC-780\",ID,\"0965385123\"");
    for (i, f) in TANITA_FIELDS.iter().enumerate() {
        if matches!(f.key, "MO" | "ID" | "Da" | "TI" | "CS") {
            continue;
        }
        packet.push_str(&format!(",{},{}.{}", f.key, 100 + i, i % 10));
    }
    packet.push_str(",CS,A5\r\n");
    packet.into_bytes()
}

fn hl7_message(observations: usize) -> Vec<u8> {
    let mut payload = String::from(
        "MSH|^~\\&|InBody270|Clinic|||20240101100000||ORU^R01|MSG1|P|2.5\rPID|1||0965385123\r",
    );
    for i in 0..observations {
        payload.push_str(&format!("OBX|{i}|NM|WT||{}.5|kg\r", 60 + i));
    }
    wrap_mllp(payload.as_bytes()).to_vec()
}

fn ctx() -> DecodeContext {
    DecodeContext::new(DeviceId::new("bench").unwrap())
}

fn bench_decode_tanita(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_tanita");
    let packet = full_tanita_packet();
    group.throughput(Throughput::Bytes(packet.len() as u64));
    let ctx = ctx();

    group.bench_function("full_report", |b| {
        b.iter(|| {
            let m = decode(black_box(&packet), DeviceType::TanitaCsv, &ctx).unwrap();
            black_box(m);
        });
    });
    group.finish();
}

fn bench_decode_hl7(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_hl7");
    let ctx = ctx();

    for observations in [5usize, 40, 200] {
        let frame = hl7_message(observations);
        group.throughput(Throughput::Elements(observations as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(observations),
            &frame,
            |b, frame| {
                b.iter(|| {
                    let m = decode(black_box(frame), DeviceType::InbodyHl7, &ctx).unwrap();
                    black_box(m);
                });
            },
        );
    }
    group.finish();
}

fn bench_mllp_chunked(c: &mut Criterion) {
    let mut group = c.benchmark_group("mllp_framer");
    let frame = hl7_message(40);

    for chunk_size in [16usize, 256, 4096] {
        group.throughput(Throughput::Bytes(frame.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("chunk", chunk_size),
            &chunk_size,
            |b, &chunk_size| {
                b.iter(|| {
                    let mut framer = MllpFramer::new();
                    let mut buf = BytesMut::new();
                    let mut frames = 0;
                    for chunk in frame.chunks(chunk_size) {
                        buf.extend_from_slice(chunk);
                        while framer.decode(&mut buf).unwrap().is_some() {
                            frames += 1;
                        }
                    }
                    black_box(frames);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_decode_tanita,
    bench_decode_hl7,
    bench_mllp_chunked
);
criterion_main!(benches);
