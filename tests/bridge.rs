// Integration tests for `Bridge` request handling.

use serde_json::{json, Value};
use tokio::sync::mpsc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use isolarcloud_rs::model::Meter;
use isolarcloud_rs::{Bridge, Notification, Request, RequestKind, Settings};

fn settings(uri: &str) -> Settings {
    serde_json::from_value(json!({
        "api_url": uri,
        "app_key": "APPKEY",
        "secret_key": "SECRET",
        "username": "user@example.com",
        "password": "hunter2",
        "serial_number": "B2281302388",
        "device_key": "1234567_14_1_1",
    }))
    .unwrap()
}

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "result_code": "1",
        "result_msg": "success",
        "result_data": data,
    }))
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/openapi/login"))
        .respond_with(ok(json!({ "token": "tok-1" })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn unconfigured_bridge_reports_error() {
    let bridge = Bridge::new();

    let notification = bridge.handle(RequestKind::CurrentPower).await;

    assert!(matches!(
        notification,
        Some(Notification::Error { ref message }) if message.contains("no configuration")
    ));
}

#[tokio::test]
async fn configure_without_settings_is_an_error() {
    let mut bridge = Bridge::new();

    let notification = bridge.receive(Request::new(RequestKind::Configure)).await;

    assert!(matches!(notification, Some(Notification::Error { .. })));
    assert!(bridge.client().is_none());
}

#[tokio::test]
async fn configure_is_silent() {
    let server = MockServer::start().await;
    let mut bridge = Bridge::new();

    let notification = bridge
        .receive(Request::configure(settings(&server.uri())))
        .await;

    assert_eq!(None, notification);
    assert!(bridge.client().is_some());
}

#[tokio::test]
async fn details_request_yields_station_details() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/openapi/getPowerStationDetail"))
        .respond_with(ok(json!({ "design_capacity": "9800" })))
        .mount(&server)
        .await;

    let bridge = Bridge::with_settings(settings(&server.uri())).unwrap();

    match bridge.handle(RequestKind::Details).await {
        Some(Notification::StationDetails(details)) => {
            assert_eq!("Unknown address", details.address);
            assert!((details.peak_power_kw - 9.8).abs() < 1e-9);
        }
        other => panic!("unexpected notification: {:?}", other),
    }
}

#[tokio::test]
async fn empty_cycle_sends_nothing() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/openapi/getDeviceRealTimeData"))
        .respond_with(ok(json!({})))
        .mount(&server)
        .await;

    let bridge = Bridge::with_settings(settings(&server.uri())).unwrap();

    assert_eq!(None, bridge.handle(RequestKind::DayEnergy).await);
}

#[tokio::test]
async fn null_real_time_data_sends_nothing() {
    let server = MockServer::start().await;
    mount_login(&server).await;
    Mock::given(method("POST"))
        .and(path("/openapi/getDeviceRealTimeData"))
        .respond_with(ok(Value::Null))
        .mount(&server)
        .await;

    let bridge = Bridge::with_settings(settings(&server.uri())).unwrap();

    assert_eq!(None, bridge.handle(RequestKind::CurrentPower).await);
}

#[tokio::test]
async fn overview_without_plant_id_is_config_error() {
    let server = MockServer::start().await;
    let bridge = Bridge::with_settings(settings(&server.uri())).unwrap();

    match bridge.handle(RequestKind::Overview).await {
        Some(Notification::Error { message }) => assert!(message.contains("plant_id")),
        other => panic!("unexpected notification: {:?}", other),
    }
}

#[tokio::test]
async fn reconfiguring_same_account_keeps_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openapi/login"))
        .respond_with(ok(json!({ "token": "tok-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut bridge = Bridge::with_settings(settings(&server.uri())).unwrap();
    bridge.client().unwrap().ensure_session().await.unwrap();

    let mut tuned = settings(&server.uri());
    tuned.interval = 10;
    bridge.configure(tuned).unwrap();
    assert_eq!(
        Some("tok-1".to_string()),
        bridge.client().unwrap().session().token()
    );

    let mut other = settings(&server.uri());
    other.username = "someone@example.com".into();
    bridge.configure(other).unwrap();
    assert_eq!(None, bridge.client().unwrap().session().token());
}

#[tokio::test]
async fn notifications_serialize_with_tag() {
    let error = Notification::Error {
        message: "boom".into(),
    };
    assert_eq!(
        json!({ "notification": "ERROR", "payload": { "message": "boom" } }),
        serde_json::to_value(&error).unwrap()
    );
}

#[tokio::test]
async fn run_answers_each_request_once() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openapi/login"))
        .respond_with(ok(json!({ "token": "tok-1" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/openapi/getDeviceRealTimeData"))
        .respond_with(ok(json!({
            "device_point_list": [{
                "device_point": { "p13112": "12400", "p13003": "500", "p13121": "200" }
            }]
        })))
        .mount(&server)
        .await;

    let (request_tx, request_rx) = mpsc::channel(8);
    let (notification_tx, mut notification_rx) = mpsc::channel(8);
    let runner = tokio::spawn(Bridge::new().run(request_rx, notification_tx));

    let requests: Vec<Request> = serde_json::from_value(json!([
        { "kind": "CONFIGURE", "config": {
            "api_url": server.uri(),
            "app_key": "APPKEY",
            "secret_key": "SECRET",
            "username": "user@example.com",
            "password": "hunter2",
            "serial_number": "B2281302388",
            "device_key": "1234567_14_1_1"
        }},
        { "kind": "CURRENT_POWER" },
        { "kind": "DAY_ENERGY" },
    ]))
    .unwrap();
    for request in requests {
        request_tx.send(request).await.unwrap();
    }
    drop(request_tx);
    runner.await.unwrap();

    let mut received = Vec::new();
    while let Some(notification) = notification_rx.recv().await {
        received.push(notification);
    }

    assert_eq!(2, received.len());
    let day_energy = received.iter().find_map(|n| match n {
        Notification::DayEnergy(summary) => Some(summary),
        _ => None,
    });
    assert_eq!(Some(12400.0), day_energy.unwrap().get(Meter::Production));
    assert!(received
        .iter()
        .any(|n| matches!(n, Notification::PowerFlow(s) if s.grid.current_power_watts == 200.0)));
}
