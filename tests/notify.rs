use otpauth::notify::{LogNotifier, Notifier, NotifyError, WebhookNotifier};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn webhook_posts_recipient_and_code() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/send"))
        .and(body_partial_json(json!({"recipient": "a@x.com", "code": "123456"})))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let n = WebhookNotifier::new(format!("{}/send", server.uri()));
    n.send("a@x.com", "123456").await.expect("delivered");
}

#[tokio::test]
async fn webhook_error_status_is_a_delivery_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let n = WebhookNotifier::new(server.uri());
    assert!(matches!(n.send("a@x.com", "123456").await, Err(NotifyError::Rejected(503))));
}

#[tokio::test]
async fn unreachable_webhook_is_a_transport_error() {
    // port 9 (discard) on localhost is expected to refuse connections
    let n = WebhookNotifier::new("http://127.0.0.1:9/send");
    assert!(matches!(n.send("a@x.com", "123456").await, Err(NotifyError::Transport(_))));
}

#[tokio::test]
async fn log_notifier_always_succeeds() {
    assert!(LogNotifier.send("a@x.com", "123456").await.is_ok());
}
