//! Dispatcher fan-out against mocked providers.

use std::sync::Arc;

use notify::{
    AfricasTalkingConfig, AfricasTalkingSms, Contact, Delivery, Dispatcher, InMemoryContacts,
    Notification, NotificationSink, SendGridConfig, SendGridEmail,
};
use tutorug_core::UserId;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sms_ok() -> ResponseTemplate {
    ResponseTemplate::new(201).set_body_json(serde_json::json!({
        "SMSMessageData": {
            "Message": "Sent to 1/1",
            "Recipients": [{ "statusCode": 100, "status": "Success", "messageId": "ATXid_9" }]
        }
    }))
}

async fn dispatcher(server: &MockServer, contacts: Arc<InMemoryContacts>) -> Dispatcher {
    let sms = AfricasTalkingSms::new(
        AfricasTalkingConfig::new("sandbox", "at-key").with_base_url(server.uri()),
    )
    .unwrap();
    let email = SendGridEmail::new(
        SendGridConfig::new("sg-key", "noreply@tutoruganda.com").with_base_url(server.uri()),
    )
    .unwrap();
    Dispatcher::new(contacts)
        .with_sms(Arc::new(sms))
        .with_email(Arc::new(email))
}

#[tokio::test]
async fn test_both_channels_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messaging"))
        .respond_with(sms_ok())
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/mail/send"))
        .respond_with(ResponseTemplate::new(202))
        .expect(1)
        .mount(&server)
        .await;

    let user = UserId::parse("u1").unwrap();
    let contacts = Arc::new(InMemoryContacts::new());
    contacts
        .insert(
            user.clone(),
            Contact {
                first_name: "Amina".into(),
                phone: Some("0772123456".into()),
                email: Some("amina@example.com".into()),
            },
        )
        .await;

    let report = dispatcher(&server, contacts)
        .await
        .notify(&user, Notification::Welcome { trial_days: 7 })
        .await;

    assert_eq!(report.sms, Delivery::Sent);
    assert_eq!(report.email, Delivery::Sent);
    assert!(report.delivered());
}

#[tokio::test]
async fn test_sms_failure_is_reported_not_raised() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messaging"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let user = UserId::parse("u2").unwrap();
    let contacts = Arc::new(InMemoryContacts::new());
    contacts
        .insert(
            user.clone(),
            Contact {
                first_name: "Brian".into(),
                phone: Some("0701000000".into()),
                email: None,
            },
        )
        .await;

    let report = dispatcher(&server, contacts)
        .await
        .notify(&user, Notification::SubscriptionExpired)
        .await;

    assert!(matches!(report.sms, Delivery::Failed(_)));
    assert_eq!(report.email, Delivery::Skipped);
    assert!(!report.delivered());
}

#[tokio::test]
async fn test_unknown_user_is_skipped() {
    let server = MockServer::start().await;
    let report = dispatcher(&server, Arc::new(InMemoryContacts::new()))
        .await
        .notify(&UserId::parse("ghost").unwrap(), Notification::SubscriptionExpired)
        .await;

    assert_eq!(report.sms, Delivery::Skipped);
    assert_eq!(report.email, Delivery::Skipped);
}
