use std::sync::Arc;

use chrono::{Duration, Utc};
use netatmo_energy::{CloudClient, ConfigStore, Error, MemoryConfigStore, TokenStore};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn authorized_store() -> Arc<TokenStore> {
    let store = TokenStore::load(Arc::new(MemoryConfigStore::new()) as Arc<dyn ConfigStore>);
    store.store(
        "acc-1".to_string(),
        Utc::now() + Duration::hours(1),
        "ref-1".to_string(),
    );
    Arc::new(store)
}

fn client_for(server: &MockServer, store: Arc<TokenStore>) -> CloudClient {
    CloudClient::builder(store)
        .base_url(server.uri())
        .build()
        .unwrap()
}

fn homesdata_body() -> serde_json::Value {
    serde_json::json!({
        "body": {
            "homes": [{
                "id": "h1",
                "name": "Main Home",
                "rooms": [
                    {"id": "r1", "name": "Living Room"},
                    {"id": "r2", "name": "Bedroom"}
                ],
                "modules": [
                    {"id": "04:aa", "type": "NRV", "room_id": "r1"},
                    {"id": "70:ee", "type": "NAPlug"}
                ]
            }]
        },
        "status": "ok"
    })
}

#[tokio::test]
async fn missing_token_fails_without_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/homesdata"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let store = TokenStore::load(Arc::new(MemoryConfigStore::new()) as Arc<dyn ConfigStore>);
    let client = client_for(&server, Arc::new(store));
    let err = client.list_homes().await.unwrap_err();
    assert!(matches!(err, Error::Unauthorized(_)), "got {err:?}");
}

#[tokio::test]
async fn list_homes_sends_bearer_and_parses_envelope() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/homesdata"))
        .and(header("authorization", "Bearer acc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(homesdata_body()))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, authorized_store());
    let homes = client.list_homes().await.unwrap();
    assert_eq!(homes.len(), 1);
    assert_eq!(homes[0].id, "h1");
    assert_eq!(homes[0].rooms.len(), 2);
    assert_eq!(homes[0].modules[0].module_type, "NRV");
    assert_eq!(homes[0].modules[0].room_id.as_deref(), Some("r1"));
    assert_eq!(homes[0].modules[1].room_id, None);
}

#[tokio::test]
async fn forbidden_clears_access_token_but_keeps_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/homestatus"))
        .respond_with(ResponseTemplate::new(403).set_body_string(r#"{"error":{"code":3}}"#))
        .mount(&server)
        .await;

    let store = authorized_store();
    let client = client_for(&server, store.clone());
    let err = client.get_home_status("h1").await.unwrap_err();

    assert!(matches!(err, Error::Unauthorized(_)), "got {err:?}");
    let snap = store.snapshot();
    assert!(snap.access_token.is_empty());
    assert_eq!(snap.refresh_token, "ref-1");
    assert!(store.is_authorized());
}

#[tokio::test]
async fn server_error_is_transient_and_token_survives() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/homestatus"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let store = authorized_store();
    let client = client_for(&server, store.clone());
    let err = client.get_home_status("h1").await.unwrap_err();

    match err {
        Error::Remote { status, message } => {
            assert_eq!(status, 500);
            assert_eq!(message, "upstream exploded");
        }
        other => panic!("expected Remote, got {other:?}"),
    }
    assert_eq!(store.snapshot().access_token, "acc-1");
}

#[tokio::test]
async fn home_status_posts_home_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/homestatus"))
        .and(body_string_contains("home_id=h1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "body": {
                "home": {
                    "id": "h1",
                    "rooms": [{
                        "id": "r1",
                        "therm_measured_temperature": 19.5,
                        "therm_setpoint_temperature": 21.0,
                        "heating_power_request": 80,
                        "therm_setpoint_mode": "schedule"
                    }],
                    "modules": [{
                        "id": "04:aa",
                        "type": "NRV",
                        "battery_level": 2550,
                        "rf_strength": 70
                    }]
                }
            },
            "status": "ok"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, authorized_store());
    let status = client.get_home_status("h1").await.unwrap();
    assert_eq!(status.rooms[0].therm_measured_temperature, Some(19.5));
    assert_eq!(status.modules[0].battery_level, Some(2550));
}

#[tokio::test]
async fn set_target_temperature_posts_manual_setpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/setroomthermpoint"))
        .and(body_string_contains("home_id=h1"))
        .and(body_string_contains("room_id=r1"))
        .and(body_string_contains("mode=manual"))
        .and(body_string_contains("temp=21.5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server, authorized_store());
    client
        .set_target_temperature("h1", "r1", 21.5)
        .await
        .expect("setpoint should succeed");
}

#[tokio::test]
async fn set_mode_maps_off_to_away_and_rest_to_schedule() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/setthermmode"))
        .and(body_string_contains("mode=away"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/setthermmode"))
        .and(body_string_contains("mode=schedule"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "status": "ok"
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = client_for(&server, authorized_store());
    client.set_mode("h1", "off").await.unwrap();
    client.set_mode("h1", "heat").await.unwrap();
    client.set_mode("h1", "auto").await.unwrap();
}

#[tokio::test]
async fn malformed_envelope_is_a_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/homesdata"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"unexpected": true})),
        )
        .mount(&server)
        .await;

    let client = client_for(&server, authorized_store());
    let err = client.list_homes().await.unwrap_err();
    assert!(matches!(err, Error::Remote { .. }), "got {err:?}");
}

#[tokio::test]
async fn message_log_records_traffic() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/homesdata"))
        .respond_with(ResponseTemplate::new(200).set_body_json(homesdata_body()))
        .mount(&server)
        .await;

    let tmp = tempfile::NamedTempFile::new().unwrap();
    let client = CloudClient::builder(authorized_store())
        .base_url(server.uri())
        .message_log(
            netatmo_energy::MessageLogMode::Compact,
            tmp.path().to_str().unwrap(),
        )
        .build()
        .unwrap();
    client.list_homes().await.unwrap();

    let contents = std::fs::read_to_string(tmp.path()).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["dir"], "req");
    assert_eq!(lines[1]["dir"], "resp");
    assert_eq!(lines[1]["status"], 200);
}
