//! Framers driven through real Tokio streams, the way device transports use them.

mod common;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio_util::codec::{Framed, FramedRead};
use vitalgate_core::{DeviceType, Error};
use vitalgate_protocol::{LineFramer, MllpFramer, decode, hl7};

#[tokio::test]
async fn test_tanita_lines_over_stream() {
    let (mut device, gateway) = tokio::io::duplex(64);
    let mut frames = FramedRead::new(gateway, LineFramer::new());

    let first = common::tanita_packet(&[("ID", "\"0965385123\""), ("Wk", "76.6")]);
    let second = common::tanita_packet(&[("Wk", "80.1"), ("FW", "22.0")]);
    tokio::spawn(async move {
        // Small duplex buffer forces partial writes.
        device.write_all(first.as_bytes()).await.unwrap();
        device.write_all(b"\r\n").await.unwrap();
        device.write_all(second.as_bytes()).await.unwrap();
        device.write_all(b"\r\n").await.unwrap();
    });

    let ctx = common::ctx("tanita_ttyUSB0");
    let a = frames.next().await.unwrap().unwrap();
    let b = frames.next().await.unwrap().unwrap();
    let a = decode(&a, DeviceType::TanitaCsv, &ctx).unwrap();
    let b = decode(&b, DeviceType::TanitaCsv, &ctx).unwrap();
    assert_eq!(a.number("weight_kg"), Some(76.6));
    assert_eq!(a.customer_phone.as_deref(), Some("0965385123"));
    assert_eq!(b.number("body_fat_percent"), Some(22.0));
    assert_ne!(a.id(), b.id());
    assert!(frames.next().await.is_none());
}

#[tokio::test]
async fn test_noise_between_tanita_packets_is_isolated() {
    let (mut device, gateway) = tokio::io::duplex(1024);
    let mut frames = FramedRead::new(gateway, LineFramer::new());
    let good = common::tanita_packet(&[("Wk", "70.0")]);
    let payload = format!("\u{1}\u{2}garbage\r\n{good}\r\n");
    device.write_all(payload.as_bytes()).await.unwrap();
    drop(device);

    let ctx = common::ctx("tanita_ttyUSB0");
    let noise = frames.next().await.unwrap().unwrap();
    assert!(matches!(
        decode(&noise, DeviceType::TanitaCsv, &ctx),
        Err(Error::MalformedPacket { .. })
    ));
    let packet = frames.next().await.unwrap().unwrap();
    assert!(decode(&packet, DeviceType::TanitaCsv, &ctx).is_ok());
}

#[tokio::test]
async fn test_hl7_exchange_with_ack() {
    let (device, gateway) = tokio::io::duplex(256);
    let mut device = Framed::new(device, MllpFramer::new());
    let mut gateway = Framed::new(gateway, MllpFramer::new());

    let message = common::hl7_frame("MSG42", "0965385123", &[("WT", "76.6"), ("PBF", "18.2")]);
    device.get_mut().write_all(&message).await.unwrap();

    let frame: Bytes = gateway.next().await.unwrap().unwrap();
    let m = decode(&frame, DeviceType::InbodyHl7, &common::ctx("inbody_lan")).unwrap();
    assert_eq!(m.number("weight_kg"), Some(76.6));

    let ack = hl7::ack_for(&frame, chrono::Utc::now());
    // The ack is already framed; write the bytes straight through.
    gateway.get_mut().write_all(&ack).await.unwrap();

    let reply = device.next().await.unwrap().unwrap();
    let text = String::from_utf8_lossy(&reply);
    assert!(text.contains("MSA|AA|MSG42"), "{text}");
}

#[tokio::test]
async fn test_hl7_encoder_sink() {
    let (device, gateway) = tokio::io::duplex(256);
    let mut device = Framed::new(device, MllpFramer::new());
    let mut gateway = Framed::new(gateway, MllpFramer::new());

    gateway.send(&b"MSH|^~\\&|X\rMSA|AE|1\r"[..]).await.unwrap();
    let reply = device.next().await.unwrap().unwrap();
    assert!(reply.starts_with(b"\x0bMSH"));
    assert!(reply.ends_with(b"\x1c\r"));
}

#[tokio::test]
async fn test_hl7_stream_closed_mid_message() {
    let (mut device, gateway) = tokio::io::duplex(256);
    let mut frames = FramedRead::new(gateway, MllpFramer::new());
    device.write_all(b"\x0bMSH|^~\\&|X\rPID|1").await.unwrap();
    drop(device);

    let result = frames.next().await.unwrap();
    assert!(matches!(result, Err(Error::IncompleteFrame(_))));
}
