//! Broadcast failure handling over HTTP.

use std::time::Duration;

mod common;
use common::{chain_config, relay_config, MockNode, MockRelayApi, RelayReply, SendReply, TestRelay};

async fn setup() -> (MockNode, MockRelayApi, TestRelay) {
    let node = MockNode::start(137).await;
    let relay_api = MockRelayApi::start().await;
    let relay = TestRelay::start(relay_config(chain_config(&node, Some(&relay_api)))).await;
    (node, relay_api, relay)
}

#[tokio::test]
async fn test_relay_outage_falls_back_to_node() {
    let (node, relay_api, relay) = setup().await;
    relay_api.push(RelayReply::Respond(500, r#"{"message":"internal error"}"#.into()));

    let id = relay.prepare("u1").await;
    let (status, sent) = relay.confirm("u1", &id).await;
    assert_eq!(status, 200, "{}", sent);
    assert_eq!(sent["broadcast_path"], "direct");
    assert_eq!(relay_api.received().len(), 1);
    assert_eq!(node.submitted().len(), 1);

    let (_, record) = relay.get(&format!("/api/transactions/{}", id), Some("u1")).await;
    let attempts = record["attempts"].as_array().unwrap();
    assert_eq!(attempts.len(), 2);
    assert_eq!(attempts[0]["verdict"], "transport");
    assert_eq!(attempts[1]["verdict"], "accepted");
}

#[tokio::test]
async fn test_relay_timeout_falls_back_once() {
    let (node, relay_api, relay) = setup().await;
    relay_api.push(RelayReply::Hang(Duration::from_secs(3)));

    let id = relay.prepare("u1").await;
    let (status, sent) = relay.confirm("u1", &id).await;
    assert_eq!(status, 200, "{}", sent);
    assert_eq!(sent["broadcast_path"], "direct");
    assert_eq!(node.submitted().len(), 1);
}

#[tokio::test]
async fn test_disguised_success_is_success() {
    let (node, relay_api, relay) = setup().await;
    relay_api.push(RelayReply::Respond(
        400,
        r#"{"statusCode":400,"message":"Transaction sent successfully","txId":"{hash}"}"#.into(),
    ));

    let id = relay.prepare("u1").await;
    let (status, sent) = relay.confirm("u1", &id).await;
    assert_eq!(status, 200, "{}", sent);
    assert_eq!(sent["status"], "SENT");
    assert_eq!(sent["broadcast_path"], "relay");
    assert!(sent["description"].as_str().unwrap().contains("non-success"));
    assert!(node.submitted().is_empty());
}

#[tokio::test]
async fn test_chain_rejection_does_not_fall_back() {
    let (node, relay_api, relay) = setup().await;
    relay_api.push(RelayReply::Respond(
        400,
        r#"{"message":"insufficient funds for gas * price + value"}"#.into(),
    ));

    let id = relay.prepare("u1").await;
    let (status, body) = relay.confirm("u1", &id).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "BroadcastRejected");
    assert!(node.submitted().is_empty());

    let (_, record) = relay.get(&format!("/api/transactions/{}", id), Some("u1")).await;
    assert_eq!(record["status"], "FAILED");
}

#[tokio::test]
async fn test_both_paths_down_is_ambiguous() {
    let (node, relay_api, relay) = setup().await;
    relay_api.push(RelayReply::Respond(503, "Service Unavailable".into()));
    node.push_send(SendReply::Status(502));

    let id = relay.prepare("u1").await;
    let (status, body) = relay.confirm("u1", &id).await;
    assert_eq!(status, 502);
    assert_eq!(body["error"], "AmbiguousBroadcastFailure");

    // the nonce stays burned: the payload may still land
    let (_, next) = relay
        .post(
            "/send/polygon/prepare",
            serde_json::json!({
                "UserID": "u1",
                "sender_address": common::SENDER,
                "recipient_address": common::RECIPIENT,
                "amount": "0.001",
            }),
        )
        .await;
    assert_eq!(next["details"]["nonce"], 1);
}

#[tokio::test]
async fn test_stale_nonce_is_reread_once() {
    let node = MockNode::start(137).await;
    let relay = TestRelay::start(relay_config(chain_config(&node, None))).await;
    node.push_send(SendReply::Error("nonce too low".into()));

    let id = relay.prepare("u1").await;
    let (status, sent) = relay.confirm("u1", &id).await;
    assert_eq!(status, 200, "{}", sent);
    assert_eq!(node.submitted().len(), 1);

    let (_, record) = relay.get(&format!("/api/transactions/{}", id), Some("u1")).await;
    assert_eq!(record["nonce"], 1);
    assert_eq!(record["attempts"].as_array().unwrap().len(), 2);
}
