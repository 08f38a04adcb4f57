//! End-to-end tests over HTTP against in-memory stores and mock providers.

use clap::Parser;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

use notify::{Notification, RecordingSink};
use reputation::PointsConfig;
use subscription::{sign, MockGateway};
use tutor_agent::MockBackend;
use tutorug::{serve, AppState, Args, Providers, Stores};
use tutorug_core::{SystemClock, UserId};

const WEBHOOK_SECRET: &str = "whsec-integration-0123456789";

struct TestServer {
    base: String,
    state: Arc<AppState>,
    notifier: Arc<RecordingSink>,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        Self::start_with(&[]).await
    }

    async fn start_with(extra: &[&str]) -> Self {
        let mut argv = vec![
            "tutorug",
            "--dev-mode",
            "--flutterwave-secret-hash",
            WEBHOOK_SECRET,
        ];
        argv.extend_from_slice(extra);
        let args = Args::parse_from(argv);

        let notifier = Arc::new(RecordingSink::new());
        let providers = Providers {
            gateway: Arc::new(MockGateway::new()),
            llm: Arc::new(MockBackend::new("mock-tutor").with_response("Start by factorising.")),
            notifier: notifier.clone(),
        };
        let state = Arc::new(
            AppState::assemble(
                args,
                Stores::in_memory(),
                providers,
                PointsConfig::default(),
                Arc::new(SystemClock),
            )
            .unwrap(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(serve(listener, Arc::clone(&state)));

        Self {
            base: format!("http://{}", addr),
            state,
            notifier,
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    fn token(&self, user: &str) -> String {
        let user = UserId::parse(user).unwrap();
        self.state.gate.jwt().generate_token(&user, None).unwrap()
    }

    async fn onboard(&self, token: &str) -> reqwest::Response {
        self.client
            .post(self.url("/api/onboarding"))
            .bearer_auth(token)
            .json(&json!({ "firstName": "Nakato", "phone": "0772123456" }))
            .send()
            .await
            .unwrap()
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;

    let resp = server.client.get(server.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "online");
    assert_eq!(body["storage"], "memory");
    assert_eq!(body["devMode"], true);
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let server = TestServer::start().await;

    let resp = server.client.get(server.url("/api/nowhere")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_requests_without_token_are_401() {
    let server = TestServer::start().await;

    let resp = server
        .client
        .get(server.url("/api/subscription"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = server
        .client
        .get(server.url("/api/reputation"))
        .bearer_auth("not-a-jwt")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
}

#[tokio::test]
async fn test_paid_features_need_a_subscription() {
    let server = TestServer::start().await;
    let token = server.token("learner-no-sub");

    let resp = server
        .client
        .post(server.url("/api/chat/sessions"))
        .bearer_auth(&token)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "SUBSCRIPTION_REQUIRED");
}

#[tokio::test]
async fn test_onboarding_starts_trial_once() {
    let server = TestServer::start().await;
    let token = server.token("learner-1");

    let resp = server.onboard(&token).await;
    assert_eq!(resp.status(), 201);
    let view: Value = resp.json().await.unwrap();
    assert_eq!(view["status"], "trial");
    assert_eq!(view["hasAccess"], true);
    assert_eq!(view["daysRemaining"], 7);

    // Repeating keeps the same trial and sends no second welcome
    let resp = server.onboard(&token).await;
    assert_eq!(resp.status(), 200);

    let user = UserId::parse("learner-1").unwrap();
    let sent = server.notifier.sent_to(&user).await;
    assert_eq!(sent, vec![Notification::Welcome { trial_days: 7 }]);
}

#[tokio::test]
async fn test_onboarding_rejects_bad_phone() {
    let server = TestServer::start().await;
    let token = server.token("learner-bad-phone");

    let resp = server
        .client
        .post(server.url("/api/onboarding"))
        .bearer_auth(&token)
        .json(&json!({ "firstName": "Okello", "phone": "12" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn test_checkout_and_verify_activates() {
    let server = TestServer::start().await;
    let token = server.token("learner-pay");
    assert_eq!(server.onboard(&token).await.status(), 201);

    let resp = server
        .client
        .post(server.url("/api/payments/initiate"))
        .bearer_auth(&token)
        .json(&json!({ "plan": "monthly" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let initiation: Value = resp.json().await.unwrap();
    assert_eq!(initiation["amount"], 25_000);
    assert_eq!(initiation["currency"], "UGX");
    let tx_ref = initiation["txRef"].as_str().unwrap().to_string();

    // Another learner cannot verify someone else's payment
    let resp = server
        .client
        .get(server.url(&format!("/api/payments/verify/{}", tx_ref)))
        .bearer_auth(server.token("someone-else"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = server
        .client
        .get(server.url(&format!("/api/payments/verify/{}", tx_ref)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["outcome"], "activated");

    let view: Value = server
        .client
        .get(server.url("/api/subscription"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["status"], "active");
    assert_eq!(view["plan"], "monthly");
    assert_eq!(view["hasAccess"], true);

    // Verifying again applies nothing new
    let outcome: Value = server
        .client
        .get(server.url(&format!("/api/payments/verify/{}", tx_ref)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(outcome["outcome"], "already_applied");
}

#[tokio::test]
async fn test_webhook_signature_checked() {
    let server = TestServer::start().await;
    let token = server.token("learner-webhook");
    assert_eq!(server.onboard(&token).await.status(), 201);

    let initiation: Value = server
        .client
        .post(server.url("/api/payments/initiate"))
        .bearer_auth(&token)
        .json(&json!({ "plan": "annual" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let tx_ref = initiation["txRef"].as_str().unwrap();

    let body = serde_json::to_vec(&json!({
        "event": "charge.completed",
        "data": { "tx_ref": tx_ref, "status": "successful" }
    }))
    .unwrap();

    let resp = server
        .client
        .post(server.url("/api/payments/webhook"))
        .header("verif-hash", "wrong-secret")
        .body(body.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = server
        .client
        .post(server.url("/api/payments/webhook"))
        .header("x-flutterwave-signature", sign(WEBHOOK_SECRET, &body))
        .body(body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let outcome: Value = resp.json().await.unwrap();
    assert_eq!(outcome["outcome"], "processed");
    assert_eq!(outcome["payment"]["outcome"], "activated");
}

#[tokio::test]
async fn test_chat_flow_awards_points() {
    let server = TestServer::start().await;
    let token = server.token("learner-chat");
    assert_eq!(server.onboard(&token).await.status(), 201);

    let resp = server
        .client
        .post(server.url("/api/chat/sessions"))
        .bearer_auth(&token)
        .json(&json!({ "kind": "homework" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let session: Value = resp.json().await.unwrap();
    assert_eq!(session["title"], "Homework Help");
    let id = session["id"].as_str().unwrap().to_string();

    let resp = server
        .client
        .post(server.url(&format!("/api/chat/sessions/{}/messages", id)))
        .bearer_auth(&token)
        .json(&json!({ "message": "How do I solve x^2 - 5x + 6 = 0?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let reply: Value = resp.json().await.unwrap();
    assert_eq!(reply["message"]["content"], "Start by factorising.");
    assert_eq!(reply["moderated"], false);
    assert!(reply["pointsAwarded"].as_u64().unwrap() > 0);

    let history: Value = server
        .client
        .get(server.url(&format!("/api/chat/sessions/{}", id)))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(history["messages"].as_array().unwrap().len(), 2);

    let resp = server
        .client
        .post(server.url(&format!("/api/chat/sessions/{}/end", id)))
        .bearer_auth(&token)
        .json(&json!({ "rating": 5 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let ended: Value = resp.json().await.unwrap();
    assert_eq!(ended["isActive"], false);
    assert_eq!(ended["rating"], 5);

    let summary: Value = server
        .client
        .get(server.url("/api/reputation"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(summary["total_points"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_chat_session_private_to_owner() {
    let server = TestServer::start().await;
    let owner = server.token("learner-owner");
    let other = server.token("learner-other");
    server.onboard(&owner).await;
    server.onboard(&other).await;

    let session: Value = server
        .client
        .post(server.url("/api/chat/sessions"))
        .bearer_auth(&owner)
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = session["id"].as_str().unwrap();

    let resp = server
        .client
        .get(server.url(&format!("/api/chat/sessions/{}", id)))
        .bearer_auth(&other)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn test_oversized_body_is_413() {
    let server = TestServer::start_with(&["--max-body-bytes", "256"]).await;
    let token = server.token("learner-big");

    let resp = server
        .client
        .post(server.url("/api/onboarding"))
        .bearer_auth(&token)
        .json(&json!({ "firstName": "x".repeat(1024), "phone": "0772123456" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 413);
}
