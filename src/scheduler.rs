use crate::prelude::*;

use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Default)]
pub struct PollStats {
    pub requests_sent: u64,
    pub readings: u64,
    pub no_data: u64,
    pub not_supported: u64,
    pub malformed: u64,
    pub transport_errors: u64,
    pub unreachable: u64,
}

impl PollStats {
    pub fn record(&mut self, outcome: &Result<DecodedValue, crate::error::TransportError>) {
        self.requests_sent += 1;
        match outcome {
            Ok(DecodedValue::Measurement(_)) | Ok(DecodedValue::DeviceTime(_)) => self.readings += 1,
            Ok(DecodedValue::NoData) => self.no_data += 1,
            Ok(DecodedValue::ServiceNotSupported) => self.not_supported += 1,
            Ok(DecodedValue::Malformed) => self.malformed += 1,
            Err(e) => {
                self.transport_errors += 1;
                if e.is_unreachable() {
                    self.unreachable += 1;
                }
            }
        }
    }

    pub fn print_summary(&self) {
        info!("Poll Statistics:");
        info!("  Requests sent: {}", self.requests_sent);
        info!("  Readings: {}", self.readings);
        info!("  No data: {}", self.no_data);
        info!("  Service not supported: {}", self.not_supported);
        info!("  Malformed responses: {}", self.malformed);
        info!("  Transport errors: {}", self.transport_errors);
        info!("    of which unreachable: {}", self.unreachable);
    }
}

/// Outcome of one request in a poll cycle, as reported to the user.
#[derive(Clone, Debug, Serialize)]
pub struct Reading {
    pub alias: String,
    pub kind: RequestKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<DecodedValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last good value, reported when this request failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback: Option<DecodedValue>,
}

/// Drives one inverter: owns its client, so requests to the device are
/// never interleaved.
pub struct Scheduler {
    config: config::Inverter,
    stats: Arc<Mutex<PollStats>>,
}

impl Scheduler {
    pub fn new(config: config::Inverter, stats: Arc<Mutex<PollStats>>) -> Self {
        Self { config, stats }
    }

    pub async fn start(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut client = Inverter::from_config(&self.config);
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.poll_interval()));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "{}: polling {} every {}s",
            self.config.alias(),
            client.addr(),
            self.config.poll_interval()
        );

        loop {
            // shutdown drops an in-flight poll, which closes its connection
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = async {
                    interval.tick().await;
                    self.poll_once(&mut client).await
                } => {}
            }
        }

        info!("{}: scheduler exiting", self.config.alias());
        Ok(())
    }

    pub async fn poll_once(&self, client: &mut Inverter) -> Vec<Reading> {
        let alias = self.config.alias();
        let mut readings = Vec::with_capacity(self.config.requests().len());

        for &kind in self.config.requests() {
            let outcome = client.query(kind).await;

            if let Ok(mut stats) = self.stats.lock() {
                stats.record(&outcome);
            }

            let reading = match outcome {
                Ok(value) => {
                    Self::log_value(&alias, kind, &value);
                    Reading {
                        alias: alias.clone(),
                        kind,
                        value: Some(value),
                        error: None,
                        fallback: None,
                    }
                }
                Err(err) => {
                    let fallback = client.last_value(kind).cloned();
                    match &fallback {
                        Some(last) => warn!("{}: {} failed ({}), last value {}", alias, kind, err, last),
                        None => warn!("{}: {} failed ({})", alias, kind, err),
                    }
                    Reading {
                        alias: alias.clone(),
                        kind,
                        value: None,
                        error: Some(err.to_string()),
                        fallback,
                    }
                }
            };
            readings.push(reading);
        }

        readings
    }

    fn log_value(alias: &str, kind: RequestKind, value: &DecodedValue) {
        match value {
            DecodedValue::DeviceTime(time) => {
                info!("{}: {} = {}", alias, kind, time);
                if let Some(device) = time.to_naive_datetime() {
                    let drift = device - chrono::Local::now().naive_local();
                    debug!("{}: inverter clock drift {}s", alias, drift.num_seconds());
                }
            }
            DecodedValue::NoData => info!("{}: {} has no data (inverter idle?)", alias, kind),
            _ => info!("{}: {} = {}", alias, kind, value),
        }
    }
}
