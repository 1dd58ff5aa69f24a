#![allow(dead_code)]

pub use stecagrid_bridge::prelude::*;

use stecagrid_bridge::steca::crc::{self, CRC8_OFFSET};
use stecagrid_bridge::steca::telegram::{TelegramFactory, TELEGRAM_LEN, TERMINATOR};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub fn common_setup() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct Factory;
impl Factory {
    // formula bytes (a, b, c) for a few round numbers
    pub const WATTS_1000: [u8; 3] = [0xF4, 0x00, 0x88];
    pub const WATTS_20000: [u8; 3] = [0x38, 0x80, 0x8D];
    pub const VOLTS_230_5: [u8; 3] = [0xCD, 0x00, 0x86];
    pub const AMPS_4_25: [u8; 3] = [0x10, 0x00, 0x81];
    pub const YIELD_12345: [u8; 3] = [0x81, 0xC8, 0x8C];
    pub const ZERO: [u8; 3] = [0x00, 0x00, 0x00];

    /// Response to a `kind` request exactly as captured from a bridge
    /// (placeholder checksums, marker at offset 22).
    pub fn captured_response() -> Vec<u8> {
        vec![
            0x02, 0x01, 0x00, 0x1E, 0xC9, 0x01, 0xFF, 0xFF, 0x00, 0x00, 0x0F, 0xFF, 0x00, 0x00,
            0x07, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x0B, 0x0B, 0x90, 0x00, 0x85, 0xFF,
            0xFF, 0x03,
        ]
    }

    /// Wraps `payload` (everything from offset 12 up to the trailer) into a
    /// response with valid header and trailer checksums.
    pub fn response(kind: RequestKind, payload: &[u8]) -> Vec<u8> {
        let len = 12 + payload.len() + 3;

        let mut r = vec![0x02, 0x01];
        r.extend_from_slice(&(len as u16).to_be_bytes());
        r.push(0xC9);
        r.push(0x01);
        r.push(crc::crc8(CRC8_OFFSET, &r));
        r.push(0x41); // service code
        r.push(0x00); // response code
        r.extend_from_slice(&[0x00, 0x01]);
        r.push(kind.identifier());
        r.extend_from_slice(payload);

        let checksum = TelegramFactory::trailer_crc(&r);
        r.extend_from_slice(&checksum.to_be_bytes());
        r.push(TERMINATOR);

        r
    }

    /// Measurement response laid out like captured traffic: marker at 22,
    /// value bytes at 23..26.
    pub fn measurement(kind: RequestKind, value: [u8; 3]) -> Vec<u8> {
        let marker = kind.formula_marker().expect("kind carries a measurement");

        let mut payload = vec![0xFF; 10];
        payload.push(marker);
        payload.extend_from_slice(&value);
        payload.push(0xFF);

        Self::response(kind, &payload)
    }

    /// Measurement response with `padding` filler bytes ahead of the marker.
    pub fn measurement_with_padding(kind: RequestKind, value: [u8; 3], padding: usize) -> Vec<u8> {
        let marker = kind.formula_marker().expect("kind carries a measurement");

        let mut payload = vec![0xFF; padding];
        payload.push(marker);
        payload.extend_from_slice(&value);
        payload.push(0xFF);

        Self::response(kind, &payload)
    }

    pub fn no_marker(kind: RequestKind) -> Vec<u8> {
        Self::response(kind, &[0xFF; 15])
    }

    pub fn service_not_supported(kind: RequestKind) -> Vec<u8> {
        let mut r = Self::response(kind, &[0xFF; 15]);
        r[8] = 0x01;
        r
    }

    pub fn date_time(fields: [i16; 6], status: &str) -> Vec<u8> {
        let mut payload = vec![0u8; 39 - 12];
        for (i, value) in fields.iter().enumerate() {
            let offset = 13 + 4 * i - 12;
            payload[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        }
        payload.extend_from_slice(status.as_bytes());
        payload.push(0x00);

        Self::response(RequestKind::DeviceTime, &payload)
    }

    pub fn inverter_config(port: u16, requests: &str) -> config::Inverter {
        let yaml = format!(
            "inverters:\n  - alias: test\n    host: 127.0.0.1\n    port: {}\n    poll_interval: 1\n    read_timeout: 1\n    requests: {}\n",
            port, requests
        );
        Config::from_yaml(&yaml)
            .expect("valid test config")
            .inverters
            .remove(0)
    }
}

pub enum Behaviour {
    Respond(Vec<u8>),
    /// Read the request, then close without answering.
    Hangup,
    /// Read the request, then sit on the connection.
    Stall(Duration),
    /// Answer, then keep the connection open like a serial bridge does.
    RespondAndStall(Vec<u8>, Duration),
}

/// Fake TCP-to-serial bridge serving one connection per scripted behaviour.
pub struct MockDevice;
impl MockDevice {
    /// Returns the port to connect to and a handle resolving to the raw
    /// requests received, in order.
    pub async fn spawn(script: Vec<Behaviour>) -> Result<(u16, JoinHandle<Result<Vec<Vec<u8>>>>)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let handle = tokio::spawn(async move {
            let mut requests = Vec::new();

            for behaviour in script {
                let (mut socket, _) = listener.accept().await?;
                let mut request = vec![0u8; TELEGRAM_LEN];
                socket.read_exact(&mut request).await?;
                requests.push(request);

                match behaviour {
                    Behaviour::Respond(bytes) => socket.write_all(&bytes).await?,
                    Behaviour::Hangup => {}
                    Behaviour::Stall(duration) => tokio::time::sleep(duration).await,
                    Behaviour::RespondAndStall(bytes, duration) => {
                        socket.write_all(&bytes).await?;
                        tokio::time::sleep(duration).await;
                    }
                }
            }

            Ok::<_, anyhow::Error>(requests)
        });

        Ok((port, handle))
    }

    /// A port nothing is listening on.
    pub async fn closed_port() -> Result<u16> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(listener.local_addr()?.port())
    }
}
