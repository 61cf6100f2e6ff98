// ═══════════════════════════════════════════════════════════════════
// Provider Tests — ManualPositionSource, GreenFlowApiClient
// ═══════════════════════════════════════════════════════════════════

use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use greenflow_core::errors::CoreError;
use greenflow_core::models::geo::GeoPoint;
use greenflow_core::models::settings::Settings;
use greenflow_core::models::trip::TripLogPayload;
use greenflow_core::providers::greenflow_api::GreenFlowApiClient;
use greenflow_core::providers::manual_position::ManualPositionSource;
use greenflow_core::providers::traits::{
    CarbonBackend, PositionCallback, PositionSource, PositionUpdate, WatchHandle,
};

fn p(lat: f64, lon: f64) -> GeoPoint {
    GeoPoint::new(lat, lon).unwrap()
}

fn collecting() -> (PositionCallback, Arc<Mutex<Vec<PositionUpdate>>>) {
    let seen: Arc<Mutex<Vec<PositionUpdate>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: PositionCallback =
        Arc::new(move |update: PositionUpdate| sink.lock().unwrap().push(update));
    (callback, seen)
}

// ═══════════════════════════════════════════════════════════════════
// ManualPositionSource
// ═══════════════════════════════════════════════════════════════════

mod manual_source {
    use super::*;

    #[test]
    fn name_and_availability() {
        let source = ManualPositionSource::new();
        assert_eq!(source.name(), "Manual");
        assert!(source.is_available());
        assert!(!ManualPositionSource::unavailable().is_available());
    }

    #[test]
    fn fixes_reach_every_watcher() {
        let source = ManualPositionSource::default();
        let (cb_a, seen_a) = collecting();
        let (cb_b, seen_b) = collecting();
        source.watch(cb_a).unwrap();
        source.watch(cb_b).unwrap();

        source.push_fix(p(1.0, 2.0));

        assert_eq!(seen_a.lock().unwrap().len(), 1);
        assert_eq!(seen_b.lock().unwrap().len(), 1);
        assert!(matches!(seen_a.lock().unwrap()[0], Ok(pt) if pt == p(1.0, 2.0)));
    }

    #[test]
    fn cleared_watch_stops_receiving() {
        let source = ManualPositionSource::new();
        let (cb, seen) = collecting();
        let handle = source.watch(cb).unwrap();

        source.push_fix(p(0.0, 0.0));
        source.clear_watch(handle);
        source.push_fix(p(1.0, 1.0));

        assert_eq!(seen.lock().unwrap().len(), 1);
        assert_eq!(source.watcher_count(), 0);
    }

    #[test]
    fn clearing_unknown_handle_is_noop() {
        let source = ManualPositionSource::new();
        let (cb, _) = collecting();
        source.watch(cb).unwrap();
        source.clear_watch(WatchHandle::new(999));
        assert_eq!(source.watcher_count(), 1);
    }

    #[test]
    fn handles_are_unique() {
        let source = ManualPositionSource::new();
        let (a, _) = collecting();
        let (b, _) = collecting();
        let h1 = source.watch(a).unwrap();
        let h2 = source.watch(b).unwrap();
        assert_ne!(h1, h2);
        assert_ne!(h1.id(), h2.id());
    }

    #[test]
    fn watch_refused_when_unavailable() {
        let source = ManualPositionSource::unavailable();
        let (cb, _) = collecting();
        let err = source.watch(cb).unwrap_err();
        assert!(matches!(err, CoreError::CapabilityUnavailable(_)));
        assert_eq!(source.watcher_count(), 0);
    }

    #[test]
    fn errors_are_delivered_as_position_read() {
        let source = ManualPositionSource::new();
        let (cb, seen) = collecting();
        source.watch(cb).unwrap();

        source.push_error("timeout");

        let seen = seen.lock().unwrap();
        assert!(matches!(&seen[0], Err(CoreError::PositionRead(r)) if r == "timeout"));
    }

    #[test]
    fn watcher_may_call_back_into_source() {
        let source = Arc::new(ManualPositionSource::new());
        let inner = Arc::clone(&source);
        let counts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&counts);
        source
            .watch(Arc::new(move |_update: PositionUpdate| {
                sink.lock().unwrap().push(inner.watcher_count());
            }))
            .unwrap();

        source.push_fix(p(0.0, 0.0));
        assert_eq!(*counts.lock().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn current_position_before_any_fix_fails() {
        let source = ManualPositionSource::new();
        let err = source.current_position().await.unwrap_err();
        assert!(matches!(err, CoreError::PositionRead(_)));
    }

    #[tokio::test]
    async fn current_position_tracks_last_fix() {
        let source = ManualPositionSource::new();
        source.push_fix(p(1.0, 1.0));
        source.push_fix(p(2.0, 2.0));
        assert_eq!(source.current_position().await.unwrap(), p(2.0, 2.0));

        source.set_current(p(3.0, 3.0));
        assert_eq!(source.current_position().await.unwrap(), p(3.0, 3.0));
    }

    #[tokio::test]
    async fn failed_current_read_until_next_fix() {
        let source = ManualPositionSource::new();
        source.fail_current("permission denied");
        let err = source.current_position().await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to read position: permission denied");

        source.push_fix(p(4.0, 4.0));
        assert!(source.current_position().await.is_ok());
    }

    #[tokio::test]
    async fn current_position_unavailable() {
        let source = ManualPositionSource::unavailable();
        assert!(matches!(
            source.current_position().await,
            Err(CoreError::CapabilityUnavailable(_))
        ));
    }
}

// ═══════════════════════════════════════════════════════════════════
// GreenFlowApiClient — against a one-shot local HTTP responder
// ═══════════════════════════════════════════════════════════════════

/// Accept a single connection, answer it with `status` and `body`, and
/// hand back the raw request text.
async fn serve_once(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
            if request_complete(&raw) {
                break;
            }
        }

        let response = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&raw).into_owned()
    });

    (format!("http://{addr}"), handle)
}

fn request_complete(raw: &[u8]) -> bool {
    let text = String::from_utf8_lossy(raw);
    let Some(header_end) = text.find("\r\n\r\n") else {
        return false;
    };
    let content_length = text[..header_end]
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    raw.len() >= header_end + 4 + content_length
}

fn client_for(base_url: &str, token: Option<&str>) -> GreenFlowApiClient {
    GreenFlowApiClient::new(&Settings {
        api_base_url: base_url.to_string(),
        auth_token: token.map(str::to_string),
        request_timeout_secs: 5,
        ..Settings::default()
    })
}

fn payload() -> TripLogPayload {
    TripLogPayload {
        vehicle_id: 7,
        distance_km: 12.35,
        start_lat: -6.2,
        start_lon: 106.8,
        end_lat: -6.3,
        end_lon: 106.9,
        duration_minutes: 25,
    }
}

mod api_client {
    use super::*;

    #[test]
    fn name_and_trailing_slash() {
        let client = client_for("https://api.greenflow.test/", None);
        assert_eq!(client.name(), "GreenFlow API");
        assert_eq!(client.base_url(), "https://api.greenflow.test");
    }

    #[tokio::test]
    async fn fetch_monthly_carbon_parses_envelope() {
        let (url, server) = serve_once(
            "200 OK",
            r#"{"status":true,"message":"ok","data":{
                "monthly_vehicle_carbon":[{"month":"2025-09-01T00:00:00Z","total_carbon_emission_g":12.5}],
                "monthly_electronic_carbon":null
            }}"#,
        )
        .await;

        let data = client_for(&url, Some("secret"))
            .fetch_monthly_carbon()
            .await
            .unwrap();

        assert_eq!(data.monthly_vehicle_carbon.len(), 1);
        assert_eq!(data.monthly_vehicle_carbon[0].total_carbon_emission_g, 12.5);
        assert!(data.monthly_electronic_carbon.is_empty());

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /api/custom/my-data "));
        assert!(request.to_ascii_lowercase().contains("authorization: bearer secret"));
    }

    #[tokio::test]
    async fn fetch_with_missing_data_is_empty() {
        let (url, _server) = serve_once("200 OK", r#"{"status":true,"message":"ok"}"#).await;
        let data = client_for(&url, None).fetch_monthly_carbon().await.unwrap();
        assert!(data.monthly_vehicle_carbon.is_empty());
        assert!(data.monthly_electronic_carbon.is_empty());
    }

    #[tokio::test]
    async fn status_false_is_api_error_with_message() {
        let (url, _server) = serve_once(
            "401 Unauthorized",
            r#"{"status":false,"message":"Unauthorized","data":null}"#,
        )
        .await;

        let err = client_for(&url, None).fetch_monthly_carbon().await.unwrap_err();
        match err {
            CoreError::Api { endpoint, message } => {
                assert_eq!(endpoint, "/api/custom/my-data");
                assert_eq!(message, "Unauthorized");
            }
            other => panic!("expected Api, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn non_json_body_is_api_error() {
        let (url, _server) = serve_once("502 Bad Gateway", "<html>bad gateway</html>").await;
        let err = client_for(&url, None).fetch_monthly_carbon().await.unwrap_err();
        assert!(matches!(err, CoreError::Api { ref message, .. } if message.contains("502")));
    }

    #[tokio::test]
    async fn submit_trip_posts_payload() {
        let (url, server) = serve_once(
            "201 Created",
            r#"{"status":true,"message":"Vehicle log created","data":{"id":1}}"#,
        )
        .await;

        client_for(&url, Some("tok")).submit_trip(&payload()).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /api/carbon/vehicle-log "));
        let body = &request[request.find("\r\n\r\n").unwrap() + 4..];
        let json: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(json["vehicle_id"], 7);
        assert_eq!(json["distance_km"], 12.35);
        assert_eq!(json["duration_minutes"], 25);
    }

    #[tokio::test]
    async fn submit_trip_rejected() {
        let (url, _server) = serve_once(
            "400 Bad Request",
            r#"{"status":false,"message":"Invalid vehicle","data":null}"#,
        )
        .await;

        let err = client_for(&url, None).submit_trip(&payload()).await.unwrap_err();
        assert_eq!(err.to_string(), "API error (/api/carbon/vehicle-log): Invalid vehicle");
    }

    #[tokio::test]
    async fn unreachable_backend_is_network_error() {
        // Bind then drop so the port is known to be closed
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = client_for(&format!("http://{addr}"), None)
            .fetch_monthly_carbon()
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Network(_)));
    }
}
