//! Access type detection against a mocked gateway and metadata services.

mod common;

use akeyless_csi_provider::config::AccessType;
use akeyless_csi_provider::ProviderError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{attributes, env, provider, TestGateway, BAR1_OBJECTS};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

const AWS_ENV: &[(&str, &str)] = &[
    ("AWS_ACCESS_KEY_ID", "AKIDEXAMPLE"),
    ("AWS_SECRET_ACCESS_KEY", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
];

#[tokio::test]
async fn test_access_key_wins_over_later_mechanisms() {
    let gateway = TestGateway::start().await;
    gateway.accept("access_key", "t-key").await;
    gateway.accept("aws_iam", "t-aws").await;
    gateway.rotate("init-token", "uid-1").await;
    gateway.static_secret("/foo/bar", "supersecret", 0).await;
    let provider = provider(&gateway, env(AWS_ENV));

    let attrs = attributes(&[
        ("akeylessAccessID", "p-1"),
        ("akeylessAccessKey", "key"),
        ("akeylessUIDInitToken", "init-token"),
        ("objects", BAR1_OBJECTS),
    ]);
    provider.mount(&attrs, "{}", "/mnt/a", "0644").await.unwrap();

    assert_eq!(provider.access_type().await, Some(AccessType::AccessKey));
    assert_eq!(gateway.bodies("/auth").await.len(), 1);
    assert!(gateway.bodies("/uid-rotate-token").await.is_empty());

    provider.shutdown().await;
}

#[tokio::test]
async fn test_aws_detected_from_environment_credentials() {
    let gateway = TestGateway::start().await;
    gateway.accept("aws_iam", "t-aws").await;
    gateway.reject_remaining_auth().await;
    gateway.static_secret("/foo/bar", "supersecret", 0).await;
    let provider = provider(&gateway, env(AWS_ENV));

    let attrs = attributes(&[("akeylessAccessID", "p-aws"), ("objects", BAR1_OBJECTS)]);
    provider.mount(&attrs, "{}", "/mnt/a", "0644").await.unwrap();

    assert_eq!(provider.access_type().await, Some(AccessType::AwsIam));

    let auth = gateway.bodies("/auth").await;
    let aws = auth.iter().find(|b| b["access-type"] == "aws_iam").unwrap();
    let envelope = STANDARD.decode(aws["cloud-id"].as_str().unwrap()).unwrap();
    let envelope: serde_json::Value = serde_json::from_slice(&envelope).unwrap();
    let url = STANDARD.decode(envelope["sts_request_url"].as_str().unwrap()).unwrap();
    assert_eq!(url, b"https://sts.amazonaws.com/".to_vec());

    provider.shutdown().await;
}

#[tokio::test]
async fn test_universal_identity_is_last_resort() {
    let gateway = TestGateway::start().await;
    gateway.reject_remaining_auth().await;
    gateway.rotate("init-token", "uid-1").await;
    gateway.static_secret("/foo/bar", "supersecret", 0).await;
    let provider = provider(&gateway, env(&[]));

    let attrs = attributes(&[
        ("akeylessAccessID", "p-uid"),
        ("akeylessUIDInitToken", "init-token"),
        ("objects", BAR1_OBJECTS),
    ]);
    provider.mount(&attrs, "{}", "/mnt/a", "0644").await.unwrap();

    assert_eq!(provider.access_type().await, Some(AccessType::UniversalIdentity));
    assert_eq!(gateway.bodies("/uid-rotate-token").await, vec![json!({ "uid-token": "init-token" })]);

    provider.shutdown().await;
}

#[tokio::test]
async fn test_pinned_access_type_does_not_fall_back() {
    let gateway = TestGateway::start().await;
    gateway.accept("aws_iam", "t-aws").await;
    gateway.reject_remaining_auth().await;
    let provider = provider(&gateway, env(AWS_ENV));

    let attrs = attributes(&[
        ("akeylessAccessType", "access_key"),
        ("akeylessAccessID", "p-1"),
        ("akeylessAccessKey", "wrong"),
        ("objects", BAR1_OBJECTS),
    ]);
    let err = provider.mount(&attrs, "{}", "/mnt/a", "0644").await.unwrap_err();

    assert!(matches!(err, ProviderError::Authentication { .. }));
    let auth = gateway.bodies("/auth").await;
    assert_eq!(auth.len(), 1);
    assert_eq!(auth[0]["access-type"], "access_key");
    assert!(provider.access_type().await.is_none());
}

#[tokio::test]
async fn test_no_mechanism_is_detection_error() {
    let gateway = TestGateway::start().await;
    gateway.reject_remaining_auth().await;
    Mock::given(method("POST"))
        .and(path("/uid-rotate-token"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({ "error": "bad token" })))
        .mount(&gateway.server)
        .await;
    let provider = provider(&gateway, env(&[]));

    let attrs = attributes(&[("akeylessAccessID", "p-none"), ("objects", BAR1_OBJECTS)]);
    let err = provider.mount(&attrs, "{}", "/mnt/a", "0644").await.unwrap_err();

    match &err {
        ProviderError::Detection { access_id, attempts, .. } => {
            assert_eq!(access_id, "p-none");
            let tried: Vec<&str> =
                attempts.iter().filter_map(|a| a.split(':').next()).collect();
            assert_eq!(
                tried,
                vec!["access_key", "aws_iam", "azure_ad", "gcp", "k8s", "universal_identity"]
            );
        }
        other => panic!("expected detection error, got {:?}", other),
    }
    assert_eq!(err.grpc_code(), tonic::Code::Unauthenticated);
    assert!(gateway.bodies("/describe-item").await.is_empty());
}
