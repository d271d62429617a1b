//! Integration tests for the runtime client against a mock HTTP server.

use ai_gateway_rust::config::RuntimeConfig;
use ai_gateway_rust::runtime::{GenerateRequest, RuntimeClient};
use ai_gateway_rust::{Error, HealthStatus};
use futures::StreamExt;
use mockito::Matcher;
use std::time::Duration;

fn client_for(url: &str) -> RuntimeClient {
    RuntimeClient::new(RuntimeConfig::default().with_base_url(url)).unwrap()
}

#[tokio::test]
async fn test_generate_roundtrip() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(serde_json::json!({
            "model": "llama3",
            "prompt": "why is the sky blue?",
            "stream": false,
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"model":"llama3","response":"Rayleigh scattering.","done":true,
                "total_duration":1200000000,"prompt_eval_count":13,"eval_count":7}"#,
        )
        .create_async()
        .await;

    let client = client_for(&server.url());
    // `streaming()` on the request must not leak into the unary call.
    let request = GenerateRequest::new("llama3", "why is the sky blue?").streaming();
    let response = client.generate(&request).await.unwrap();

    assert_eq!(response.response, "Rayleigh scattering.");
    assert!(response.done);
    let usage = response.usage();
    assert_eq!(usage.prompt_tokens, 13);
    assert_eq!(usage.completion_tokens, 7);
    assert_eq!(response.total_time(), Some(Duration::from_millis(1200)));
    mock.assert_async().await;
}

#[tokio::test]
async fn test_generate_maps_runtime_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(404)
        .with_body(r#"{"error":"model 'nope' not found"}"#)
        .create_async()
        .await;

    let client = client_for(&server.url());
    let err = client
        .generate(&GenerateRequest::new("nope", "hi"))
        .await
        .unwrap_err();
    match err {
        Error::Runtime { status, message } => {
            assert_eq!(status, Some(404));
            assert!(message.contains("not found"));
        }
        other => panic!("expected runtime error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_generate_deadline_surfaces_as_timeout() {
    // A listener that accepts and then never answers, so the request deadline
    // is the only thing that can end the call.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _hold = socket;
                tokio::time::sleep(Duration::from_secs(30)).await;
            });
        }
    });

    let config = RuntimeConfig::default()
        .with_base_url(format!("http://{addr}"))
        .with_request_timeout(Duration::from_millis(150));
    let client = RuntimeClient::new(config).unwrap();

    let err = client
        .generate(&GenerateRequest::new("llama3", "hi"))
        .await
        .unwrap_err();
    assert!(err.is_timeout());
    match err {
        Error::Timeout { operation, .. } => assert_eq!(operation, "generate"),
        other => panic!("expected timeout, got {other:?}"),
    }
}

#[tokio::test]
async fn test_list_models() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/api/tags")
        .with_status(200)
        .with_body(
            r#"{"models":[
                {"name":"llama3:8b","size":4661224676,"digest":"sha256:abc"},
                {"name":"phi3"}
            ]}"#,
        )
        .create_async()
        .await;

    let client = client_for(&server.url());
    let list = client.list_models().await.unwrap();
    assert_eq!(list.models.len(), 2);
    assert_eq!(list.models[0].name, "llama3:8b");
    assert_eq!(list.models[0].size, Some(4661224676));
    assert!(list.models[1].size.is_none());
}

#[tokio::test]
async fn test_probe_failure_streak_flips_unhealthy_and_one_success_recovers() {
    let mut server = mockito::Server::new_async().await;
    let failing = server
        .mock("GET", "/api/version")
        .with_status(500)
        .with_body("boom")
        .expect(3)
        .create_async()
        .await;

    let client = client_for(&server.url());
    assert_eq!(client.probe().await.status, HealthStatus::Unknown);
    assert_eq!(client.probe().await.status, HealthStatus::Unknown);
    let third = client.probe().await;
    assert_eq!(third.status, HealthStatus::Unhealthy);
    assert_eq!(third.consecutive_failures, 3);
    failing.assert_async().await;

    // The verdict is cached, so the gate rejects without another probe.
    assert!(client.ensure_healthy().await.is_err());

    failing.remove_async().await;
    server
        .mock("GET", "/api/version")
        .with_status(200)
        .with_body(r#"{"version":"0.5.1"}"#)
        .create_async()
        .await;

    let recovered = client.probe().await;
    assert_eq!(recovered.status, HealthStatus::Healthy);
    assert_eq!(recovered.consecutive_failures, 0);
    assert_eq!(recovered.version.as_deref(), Some("0.5.1"));
    assert!(client.ensure_healthy().await.is_ok());
}

#[tokio::test]
async fn test_health_served_from_probe_cache() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/version")
        .with_status(200)
        .with_body(r#"{"version":"0.5.1"}"#)
        .expect(1)
        .create_async()
        .await;

    let client = client_for(&server.url());
    assert!(client.health().await.is_healthy());
    assert!(client.health().await.is_healthy());
    // Second call came from the cache; the endpoint saw exactly one probe.
    mock.assert_async().await;
}

#[tokio::test]
async fn test_health_reprobes_when_cache_expired() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/api/version")
        .with_status(200)
        .with_body(r#"{"version":"0.5.1"}"#)
        .expect(2)
        .create_async()
        .await;

    let mut config = RuntimeConfig::default().with_base_url(server.url());
    config.probe_cache_ms = 0;
    let client = RuntimeClient::new(config).unwrap();
    client.health().await;
    client.health().await;
    mock.assert_async().await;
}

#[tokio::test]
async fn test_generate_stream_decodes_ndjson_until_done() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .match_body(Matcher::PartialJson(serde_json::json!({"stream": true})))
        .with_status(200)
        .with_header("content-type", "application/x-ndjson")
        .with_body(concat!(
            "{\"model\":\"llama3\",\"response\":\"Hel\",\"done\":false}\n",
            "{\"model\":\"llama3\",\"response\":\"lo\",\"done\":false}\n",
            "{\"model\":\"llama3\",\"response\":\"\",\"done\":true,\"prompt_eval_count\":5,\"eval_count\":2}\n",
            "{\"model\":\"llama3\",\"response\":\"past the end\",\"done\":false}\n",
        ))
        .create_async()
        .await;

    let client = client_for(&server.url());
    let request = GenerateRequest::new("llama3", "hi");
    let chunks: Vec<_> = client
        .generate_stream(&request)
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(chunks.len(), 3);
    let text: String = chunks
        .iter()
        .map(|c| c.as_ref().unwrap().response.as_str())
        .collect();
    assert_eq!(text, "Hello");
    let last = chunks.last().unwrap().as_ref().unwrap();
    assert!(last.done);
    assert_eq!(last.usage().completion_tokens, 2);
}

#[tokio::test]
async fn test_stream_error_frame_surfaces_as_runtime_error() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/api/generate")
        .with_status(200)
        .with_body("{\"error\":\"model is loading\"}\n")
        .create_async()
        .await;

    let client = client_for(&server.url());
    let chunks: Vec<_> = client
        .generate_stream(&GenerateRequest::new("llama3", "hi"))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(chunks.len(), 1);
    let err = chunks[0].as_ref().unwrap_err();
    assert!(matches!(err, Error::Runtime { .. }));
    assert!(err.to_string().contains("model is loading"));
}
