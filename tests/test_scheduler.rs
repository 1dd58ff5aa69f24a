mod common;
use common::*;

use std::sync::{Arc, Mutex};
use std::time::Duration;
use stecagrid_bridge::scheduler::{PollStats, Scheduler};

#[tokio::test]
async fn poll_once_reports_every_request() {
    common_setup();

    let (port, device) = MockDevice::spawn(vec![
        Behaviour::Respond(Factory::measurement(RequestKind::AcPower, Factory::WATTS_1000)),
        Behaviour::Respond(Factory::service_not_supported(RequestKind::PanelCurrent)),
        Behaviour::Hangup,
        Behaviour::Respond(Factory::date_time([2024, 6, 21, 12, 0, 30], "MPP")),
    ])
    .await
    .unwrap();

    let config = Factory::inverter_config(
        port,
        "[ac_power, panel_current, daily_yield, device_time]",
    );
    let stats = Arc::new(Mutex::new(PollStats::default()));
    let mut client = Inverter::from_config(&config);
    let scheduler = Scheduler::new(config, stats.clone());

    let readings = scheduler.poll_once(&mut client).await;
    device.await.unwrap().unwrap();

    assert_eq!(readings.len(), 4);
    assert!(readings.iter().all(|r| r.alias == "test"));

    assert_eq!(readings[0].kind, RequestKind::AcPower);
    assert_eq!(readings[0].value, Some(DecodedValue::Measurement(1000.0)));
    assert_eq!(readings[1].value, Some(DecodedValue::ServiceNotSupported));
    assert!(readings[2].value.is_none());
    assert!(readings[2].error.is_some());
    assert!(readings[2].fallback.is_none());
    assert!(readings[3].value.as_ref().map_or(false, |v| v.is_available()));

    let stats = stats.lock().unwrap();
    assert_eq!(stats.requests_sent, 4);
    assert_eq!(stats.readings, 2);
    assert_eq!(stats.not_supported, 1);
    assert_eq!(stats.transport_errors, 1);
    assert_eq!(stats.unreachable, 0);
}

#[tokio::test]
async fn failed_request_falls_back_to_last_value() {
    let (port, _device) = MockDevice::spawn(vec![
        Behaviour::Respond(Factory::measurement(RequestKind::AcPower, Factory::WATTS_1000)),
        Behaviour::Hangup,
    ])
    .await
    .unwrap();

    let config = Factory::inverter_config(port, "[ac_power]");
    let stats = Arc::new(Mutex::new(PollStats::default()));
    let mut client = Inverter::from_config(&config);
    let scheduler = Scheduler::new(config, stats);

    scheduler.poll_once(&mut client).await;
    let readings = scheduler.poll_once(&mut client).await;

    assert_eq!(readings[0].value, None);
    assert_eq!(readings[0].fallback, Some(DecodedValue::Measurement(1000.0)));

    let json = serde_json::to_value(&readings[0]).unwrap();
    assert_eq!(json["alias"], "test");
    assert_eq!(json["kind"], "ac_power");
    assert_eq!(json["fallback"]["status"], "measurement");
    assert_eq!(json["fallback"]["value"], 1000.0);
    assert!(json.get("value").is_none());
}

#[tokio::test]
async fn poll_stats_classify_outcomes() {
    let mut stats = PollStats::default();

    stats.record(&Ok(DecodedValue::Measurement(1.0)));
    stats.record(&Ok(DecodedValue::NoData));
    stats.record(&Ok(DecodedValue::Malformed));
    stats.record(&Err(stecagrid_bridge::error::TransportError::Closed {
        addr: "h:23".to_string(),
    }));

    assert_eq!(stats.requests_sent, 4);
    assert_eq!(stats.readings, 1);
    assert_eq!(stats.no_data, 1);
    assert_eq!(stats.malformed, 1);
    assert_eq!(stats.transport_errors, 1);
    stats.print_summary();
}

#[tokio::test]
async fn app_stops_on_shutdown() {
    common_setup();

    let (port, device) = MockDevice::spawn(vec![Behaviour::Respond(Factory::measurement(
        RequestKind::NominalAcPower,
        Factory::WATTS_1000,
    ))])
    .await
    .unwrap();

    let config = Config::from_yaml(&format!(
        "inverters:\n  - host: 127.0.0.1\n    port: {}\n    poll_interval: 60\n    requests: [nominal_ac_power]\n",
        port
    ))
    .unwrap();

    let (shutdown_tx, _) = broadcast::channel(1);
    let app = tokio::spawn(stecagrid_bridge::app(shutdown_tx.clone(), config));

    // first tick fires immediately
    let requests = device.await.unwrap().unwrap();
    assert_eq!(requests.len(), 1);

    shutdown_tx.send(()).unwrap();
    tokio::time::timeout(Duration::from_secs(5), app)
        .await
        .expect("app did not stop")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn once_mode_polls_every_enabled_inverter() {
    let (port, _device) = MockDevice::spawn(vec![Behaviour::Respond(Factory::measurement(
        RequestKind::PanelVoltage,
        Factory::VOLTS_230_5,
    ))])
    .await
    .unwrap();

    let config = Config::from_yaml(&format!(
        "inverters:\n  - alias: roof\n    host: 127.0.0.1\n    port: {}\n    requests: [panel_voltage]\n  - enabled: false\n    host: 10.255.255.1\n",
        port
    ))
    .unwrap();

    let readings = stecagrid_bridge::poll_once(&config).await;

    assert_eq!(readings.len(), 1);
    assert_eq!(readings[0].alias, "roof");
    assert_eq!(readings[0].value, Some(DecodedValue::Measurement(230.5)));
}
