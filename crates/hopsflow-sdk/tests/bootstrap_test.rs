use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use hopsflow_models::{ApiKeyName, PlatformScheme, RegistryQuery, ServiceCredentials};
use hopsflow_sdk::{
    ConsulRegistry, CredentialBootstrapper, KeyFileSpec, PlatformOptions, PlatformTrust, SdkError,
    ServiceRegistry, StaticRegistry,
};
use mock_hopsworks::{MockHopsworks, BEARER_TOKEN, SERVER_COOKIE, SESSION_COOKIE};
use reqwest::StatusCode;
use serde_json::json;

const EMAIL: &str = "airflow@hopsworks.ai";
const PASSWORD: &str = "airflow-pw";

fn options() -> PlatformOptions {
    PlatformOptions {
        scheme: PlatformScheme::Http,
        trust: PlatformTrust::SystemRoots,
        ..PlatformOptions::default()
    }
}

fn creds() -> ServiceCredentials {
    ServiceCredentials::new(EMAIL, PASSWORD).unwrap()
}

async fn bootstrapper(mock: &MockHopsworks) -> CredentialBootstrapper<StaticRegistry> {
    let addr = mock.clone().spawn().await.unwrap();
    let registry = StaticRegistry::new(Some(addr.ip().to_string()), Some(addr.port()));
    CredentialBootstrapper::new(registry, creds(), options())
}

fn key_file(dir: &Path) -> KeyFileSpec {
    KeyFileSpec::new(dir.join("api_key"))
}

#[tokio::test]
async fn key_file_holds_issued_key_verbatim() {
    let mock = MockHopsworks::new(EMAIL, PASSWORD);
    let dir = tempfile::tempdir().unwrap();
    let spec = key_file(dir.path());

    let key = bootstrapper(&mock).await.run(&spec).await.unwrap();

    let issued = mock.issued_keys();
    assert_eq!(issued.len(), 1);
    assert_eq!(key.expose(), issued[0]);
    assert_eq!(fs::read_to_string(&spec.path).unwrap(), issued[0]);
    let mode = fs::metadata(&spec.path).unwrap().permissions().mode() & 0o7777;
    assert_eq!(mode, 0o600);
}

#[tokio::test]
async fn default_trust_mode_bootstraps() {
    let mock = MockHopsworks::new(EMAIL, PASSWORD);
    let addr = mock.clone().spawn().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let spec = key_file(dir.path());

    let options = PlatformOptions {
        scheme: PlatformScheme::Http,
        ..PlatformOptions::default()
    };
    assert_eq!(options.trust, PlatformTrust::NetworkPlacement);
    let registry = StaticRegistry::new(Some(addr.ip().to_string()), Some(addr.port()));
    CredentialBootstrapper::new(registry, creds(), options)
        .run(&spec)
        .await
        .unwrap();

    assert_eq!(fs::read_to_string(&spec.path).unwrap(), mock.issued_keys()[0]);
}

#[tokio::test]
async fn ca_certificate_trust_mode_bootstraps() {
    let mock = MockHopsworks::new(EMAIL, PASSWORD);
    let addr = mock.clone().spawn().await.unwrap();
    let ca = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data/hopsworks-ca.pem");

    let options = PlatformOptions {
        trust: PlatformTrust::CaCertificate { path: ca },
        ..options()
    };
    let registry = StaticRegistry::new(Some(addr.ip().to_string()), Some(addr.port()));
    let key = CredentialBootstrapper::new(registry, creds(), options)
        .mint_api_key()
        .await
        .unwrap();

    assert_eq!(key.expose(), mock.issued_keys()[0]);
}

#[tokio::test]
async fn key_request_carries_name_scope_and_session() {
    let mock = MockHopsworks::new(EMAIL, PASSWORD);
    bootstrapper(&mock).await.mint_api_key().await.unwrap();

    let req = mock.last_key_request().unwrap();
    let name: ApiKeyName = req.name.as_deref().unwrap().parse().unwrap();
    assert_eq!(name.prefix(), "airflow");
    assert_eq!(name.suffix().len(), 24);
    assert!(name.suffix().chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    assert_eq!(req.scope.as_deref(), Some("JOB"));

    // the path-scoped session cookie sorts first
    assert_eq!(
        req.cookie.as_deref(),
        Some(format!("{SESSION_COOKIE}; {SERVER_COOKIE}").as_str())
    );
    assert_eq!(req.authorization.as_deref(), Some(BEARER_TOKEN));
    assert_eq!(req.content_type.as_deref(), Some("application/json"));
}

#[tokio::test]
async fn non_ascii_set_cookie_is_kept() {
    // Latin-1 byte, not valid UTF-8
    let mock = MockHopsworks::new(EMAIL, PASSWORD).extra_set_cookie(b"LANG=caf\xe9; Path=/");
    bootstrapper(&mock).await.mint_api_key().await.unwrap();

    let cookie = mock.last_key_request().unwrap().cookie.unwrap();
    assert!(cookie.starts_with(SESSION_COOKIE));
    assert!(cookie.contains("LANG=caf\u{fffd}"));
}

#[tokio::test]
async fn every_run_uses_a_fresh_name() {
    let mock = MockHopsworks::new(EMAIL, PASSWORD);
    let b = bootstrapper(&mock).await;

    b.mint_api_key().await.unwrap();
    let first = mock.last_key_request().unwrap().name;
    b.mint_api_key().await.unwrap();
    let second = mock.last_key_request().unwrap().name;

    assert_ne!(first, second);
    assert_eq!(mock.issued_keys().len(), 2);
}

#[tokio::test]
async fn missing_port_sends_nothing() {
    let mock = MockHopsworks::new(EMAIL, PASSWORD);
    let addr = mock.clone().spawn().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let spec = key_file(dir.path());

    let b = CredentialBootstrapper::new(
        StaticRegistry::new(Some(addr.ip().to_string()), None),
        creds(),
        options(),
    );
    let err = b.run(&spec).await.unwrap_err();

    assert!(matches!(err, SdkError::ConfigurationUnresolved(_)));
    assert_eq!(mock.login_calls(), 0);
    assert_eq!(mock.api_key_calls(), 0);
    assert!(!spec.path.exists());
}

#[tokio::test]
async fn rejected_login_stops_before_key_request() {
    let mock = MockHopsworks::new(EMAIL, PASSWORD).reject_logins(StatusCode::UNAUTHORIZED);
    let dir = tempfile::tempdir().unwrap();
    let spec = key_file(dir.path());

    let err = bootstrapper(&mock).await.run(&spec).await.unwrap_err();

    match err {
        SdkError::AuthenticationFailed { status, body } => {
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert!(body.contains("login rejected"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(mock.login_calls(), 1);
    assert_eq!(mock.api_key_calls(), 0);
    assert!(!spec.path.exists());
}

#[tokio::test]
async fn wrong_password_is_authentication_failure() {
    let mock = MockHopsworks::new(EMAIL, "something-else");
    let err = bootstrapper(&mock).await.mint_api_key().await.unwrap_err();
    assert!(matches!(err, SdkError::AuthenticationFailed { .. }));
}

#[tokio::test]
async fn key_response_without_key_writes_nothing() {
    let mock = MockHopsworks::new(EMAIL, PASSWORD).key_response(json!({}));
    let dir = tempfile::tempdir().unwrap();
    let spec = key_file(dir.path());

    let err = bootstrapper(&mock).await.run(&spec).await.unwrap_err();

    assert!(matches!(err, SdkError::ResponseMalformed(_)));
    assert!(!spec.path.exists());
}

#[tokio::test]
async fn key_issuance_failure_reports_uri_and_status() {
    let mock =
        MockHopsworks::new(EMAIL, PASSWORD).reject_key_requests(StatusCode::INTERNAL_SERVER_ERROR);
    let err = bootstrapper(&mock).await.mint_api_key().await.unwrap_err();

    match err {
        SdkError::KeyIssuanceFailed { uri, status, .. } => {
            assert!(uri.contains("/hopsworks-api/api/users/apiKey?name=airflow_"));
            assert!(uri.ends_with("&scope=JOB"));
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn failed_run_keeps_previous_key_file() {
    let mock = MockHopsworks::new(EMAIL, PASSWORD).key_response(json!({ "name": "x" }));
    let dir = tempfile::tempdir().unwrap();
    let spec = key_file(dir.path());
    fs::write(&spec.path, "previous-key").unwrap();

    assert!(bootstrapper(&mock).await.run(&spec).await.is_err());
    assert_eq!(fs::read_to_string(&spec.path).unwrap(), "previous-key");
}

#[tokio::test]
async fn login_without_token_still_issues_key() {
    let mock = MockHopsworks::new(EMAIL, PASSWORD).without_authorization_header();

    let key = bootstrapper(&mock).await.mint_api_key().await.unwrap();

    assert_eq!(key.expose(), mock.issued_keys()[0]);
    assert_eq!(mock.last_key_request().unwrap().authorization, None);
}

#[tokio::test]
async fn consul_catalog_supplies_port() {
    let mock = MockHopsworks::new(EMAIL, PASSWORD)
        .register_service("glassfish", 8181, &["http", "hopsworks"])
        .register_service("glassfish", 4848, &["admin"]);
    let addr = mock.spawn().await.unwrap();
    let consul = ConsulRegistry::new(&format!("http://{addr}")).unwrap();

    let resolved = consul.resolve(&RegistryQuery::platform()).await.unwrap();

    assert_eq!(resolved.host.as_deref(), Some("hopsworks.glassfish.service.consul"));
    assert_eq!(resolved.port, Some(8181));
}

#[tokio::test]
async fn consul_without_matching_entry_is_unresolved() {
    let mock = MockHopsworks::new(EMAIL, PASSWORD).register_service("glassfish", 4848, &["admin"]);
    let addr = mock.clone().spawn().await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let spec = key_file(dir.path());

    let consul = ConsulRegistry::new(&format!("http://{addr}")).unwrap();
    let b = CredentialBootstrapper::new(consul, creds(), options());
    let err = b.run(&spec).await.unwrap_err();

    assert!(matches!(err, SdkError::ConfigurationUnresolved(_)));
    assert!(err.to_string().contains("port=<none>"));
    assert_eq!(mock.login_calls(), 0);
    assert!(!spec.path.exists());
}

#[tokio::test]
async fn unreachable_consul_is_unresolved() {
    // nothing listens on the discard port
    let consul = ConsulRegistry::new("http://127.0.0.1:9").unwrap();
    let err = consul.resolve(&RegistryQuery::platform()).await.unwrap_err();
    assert!(matches!(err, SdkError::ConfigurationUnresolved(_)));
}
