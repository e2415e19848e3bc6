use bytes::Bytes;
use loki_forwarder::{
    Auth, HttpTransport, HttpTransportConfig, PushPayload, Transport, TransportError,
};
use std::io::Read;
use wiremock::matchers::{body_json, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn payload_json() -> serde_json::Value {
    serde_json::json!({
        "streams": [{
            "stream": {"app": "test", "severity": "info"},
            "values": [["1700000000000000000", "hello loki"]]
        }]
    })
}

fn payload() -> PushPayload {
    PushPayload {
        body: Bytes::from(serde_json::to_vec(&payload_json()).unwrap()),
        compressed: false,
    }
}

fn transport_for(server: &MockServer, config: HttpTransportConfig) -> HttpTransport {
    HttpTransport::new(HttpTransportConfig {
        endpoint: format!("{}/loki/api/v1/push", server.uri()),
        ..config
    })
    .unwrap()
}

#[tokio::test]
async fn posts_json_to_the_push_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/loki/api/v1/push"))
        .and(header("content-type", "application/json"))
        .and(body_json(payload_json()))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(&server, HttpTransportConfig::default());
    let response = transport.push(payload()).await.unwrap();

    assert_eq!(response.status, 204);
    assert!(response.is_success());
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn sends_the_tenant_header_when_configured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("X-Scope-OrgID", "team-a"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(
        &server,
        HttpTransportConfig {
            tenant_id: Some("team-a".to_string()),
            ..Default::default()
        },
    );

    assert!(transport.push(payload()).await.unwrap().is_success());
}

#[tokio::test]
async fn sends_a_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(
        &server,
        HttpTransportConfig {
            auth: Some(Auth::Bearer("s3cret".to_string())),
            ..Default::default()
        },
    );

    assert!(transport.push(payload()).await.unwrap().is_success());
}

#[tokio::test]
async fn sends_basic_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header_exists("authorization"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport_for(
        &server,
        HttpTransportConfig {
            auth: Some(Auth::Basic {
                username: "loki".to_string(),
                password: Some("hunter2".to_string()),
            }),
            ..Default::default()
        },
    );

    transport.push(payload()).await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let auth = requests[0].headers.get("authorization").unwrap();
    let encoded = auth.to_str().unwrap().strip_prefix("Basic ").unwrap();
    assert!(!encoded.is_empty());
}

#[tokio::test]
async fn marks_compressed_payloads_with_content_encoding() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("content-encoding", "gzip"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let json = serde_json::to_vec(&payload_json()).unwrap();
    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
    std::io::Write::write_all(&mut encoder, &json).unwrap();
    let compressed = PushPayload {
        body: Bytes::from(encoder.finish().unwrap()),
        compressed: true,
    };

    let transport = transport_for(&server, HttpTransportConfig::default());
    transport.push(compressed).await.unwrap();

    // The server sees the gzipped bytes untouched.
    let requests = server.received_requests().await.unwrap();
    let mut decoder = flate2::read::GzDecoder::new(&requests[0].body[..]);
    let mut decoded = String::new();
    decoder.read_to_string(&mut decoded).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&decoded).unwrap();
    assert_eq!(parsed, payload_json());
}

#[tokio::test]
async fn keeps_a_truncated_error_body_for_rejections() {
    let server = MockServer::start().await;
    let long_body = "entry out of order, ".repeat(100);
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_string(long_body))
        .mount(&server)
        .await;

    let transport = transport_for(&server, HttpTransportConfig::default());
    let response = transport.push(payload()).await.unwrap();

    assert_eq!(response.status, 400);
    assert!(!response.is_success());
    assert_eq!(response.body.chars().count(), 256);
    assert!(response.body.starts_with("entry out of order"));
}

#[tokio::test]
async fn success_bodies_are_discarded() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
        .mount(&server)
        .await;

    let transport = transport_for(&server, HttpTransportConfig::default());
    let response = transport.push(payload()).await.unwrap();

    assert_eq!(response.status, 200);
    assert!(response.body.is_empty());
}

#[tokio::test]
async fn unreachable_endpoint_is_a_network_error() {
    // Bind a server and drop it so the port is closed. An unpooled server is
    // required: pooled `MockServer::start()` keeps the listener alive on drop.
    let server = MockServer::builder().start().await;
    let endpoint = format!("{}/loki/api/v1/push", server.uri());
    drop(server);

    let transport = HttpTransport::new(HttpTransportConfig {
        endpoint,
        ..Default::default()
    })
    .unwrap();

    match transport.push(payload()).await {
        Err(TransportError::Network(_)) => {}
        other => panic!("expected a network error, got {other:?}"),
    }
}

#[test]
fn rejects_an_unparseable_endpoint() {
    let result = HttpTransport::new(HttpTransportConfig {
        endpoint: "not a url".to_string(),
        ..Default::default()
    });
    assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
}
