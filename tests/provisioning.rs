//! End-to-end provisioning scenarios driven through scripted collaborators.

#[path = "common/test_constants.rs"]
mod test_constants;

use std::time::Duration;

use camino::Utf8PathBuf;
use cherry_machine::test_support::{
    FIXTURE_FINGERPRINT, FIXTURE_PUBLIC_KEY, ScriptedApi, ScriptedKeygen, server, ssh_key,
};
use cherry_machine::{CherryConfig, CherryDriver, CherryDriverError, Driver, MachineContext};
use tempfile::TempDir;

use test_constants::{DEFAULT_IMAGE, DEFAULT_PLAN, DEFAULT_REGION};

fn config(label: &str, key_path: Option<String>) -> CherryConfig {
    CherryConfig {
        auth_token: String::from("token"),
        project_id: String::from("123"),
        hostname: String::new(),
        ssh_user: String::from("root"),
        existing_ssh_key_label: label.to_owned(),
        existing_ssh_key_path: key_path,
        ssh_port: 22,
        image: String::from(DEFAULT_IMAGE),
        region: String::from(DEFAULT_REGION),
        plan: String::from(DEFAULT_PLAN),
        userdata: None,
        tags: None,
    }
}

fn utf8_root(tmp: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("non-utf8 temp dir: {}", path.display()))
}

fn driver(
    config: CherryConfig,
    api: &ScriptedApi,
    keygen: &ScriptedKeygen,
    store: Utf8PathBuf,
) -> CherryDriver<ScriptedApi, ScriptedKeygen> {
    CherryDriver::with_parts(
        config,
        MachineContext::new("m1", store),
        api.clone(),
        keygen.clone(),
    )
    .unwrap_or_else(|err| panic!("driver: {err}"))
    .with_poll_settings(Duration::from_millis(1), 5)
}

#[tokio::test]
async fn generated_key_flow_provisions_and_reports_ip() {
    let tmp = TempDir::new().expect("temp dir");
    let store = utf8_root(&tmp);
    let api = ScriptedApi::new();
    api.push_server(server("1001", "provisioning", &[]));
    api.push_server(server("1001", "active", &[("primary-ip", "10.0.0.5")]));
    let keygen = ScriptedKeygen::new();
    let mut driver = driver(config("none", None), &api, &keygen, store.clone());

    driver.pre_create_check().await.expect("pre-create check");
    driver.create().await.expect("create");

    let invocations = keygen.invocations();
    assert_eq!(invocations.len(), 1, "keygen should run once");
    let command = invocations.first().expect("keygen invocation").command_string();
    assert!(
        command.ends_with(&format!("-f {store}/machines/m1/id_rsa")),
        "unexpected keygen call: {command}"
    );

    let registered = api.registered_keys();
    assert_eq!(registered.len(), 1);
    let (label, public_key) = registered.first().expect("registered key");
    assert_eq!(label, "m1");
    assert_eq!(public_key.trim(), FIXTURE_PUBLIC_KEY);

    let requests = api.created_servers();
    assert_eq!(requests.len(), 1);
    let request = requests.first().expect("create request");
    assert_eq!(request.hostname, "m1");
    assert_eq!(request.project_id, "123");
    assert_eq!(request.ssh_key_ids, vec![String::from("501")]);

    assert_eq!(driver.server_id(), Some("1001"));
    assert_eq!(driver.ip().await.expect("ip"), "10.0.0.5");
    assert_eq!(api.get_server_calls(), 2);
}

#[tokio::test]
async fn mismatched_existing_key_stops_before_server_creation() {
    let tmp = TempDir::new().expect("temp dir");
    let root = utf8_root(&tmp);
    let key_path = root.join("prod_rsa");
    std::fs::write(&key_path, "PRIVATE\n").expect("write private key");
    std::fs::write(root.join("prod_rsa.pub"), format!("{FIXTURE_PUBLIC_KEY}\n"))
        .expect("write public key");

    let api = ScriptedApi::new();
    api.set_ssh_keys(vec![ssh_key("7", "prod-key", "de:ad:be:ef")]);
    let keygen = ScriptedKeygen::new();
    let mut driver = driver(
        config("prod-key", Some(key_path.to_string())),
        &api,
        &keygen,
        root.join("store"),
    );

    let err = driver
        .pre_create_check()
        .await
        .expect_err("fingerprints differ");
    assert_eq!(
        err,
        CherryDriverError::FingerprintMismatch {
            remote: String::from("deadbeef"),
            local: String::from(FIXTURE_FINGERPRINT),
        }
    );
    let message = err.to_string();
    assert!(message.contains("deadbeef") && message.contains(FIXTURE_FINGERPRINT));
    assert!(api.created_servers().is_empty());
    assert!(keygen.invocations().is_empty());
}

#[tokio::test]
async fn server_that_never_activates_times_out() {
    let tmp = TempDir::new().expect("temp dir");
    let api = ScriptedApi::new();
    for _ in 0..5 {
        api.push_server(server("1001", "provisioning", &[("primary-ip", "10.0.0.5")]));
    }
    let keygen = ScriptedKeygen::new();
    let mut driver = driver(config("none", None), &api, &keygen, utf8_root(&tmp));

    let err = driver.create().await.expect_err("never active");
    assert_eq!(
        err,
        CherryDriverError::Timeout {
            server_id: String::from("1001"),
            attempts: 5,
        }
    );
    assert_eq!(driver.server_id(), Some("1001"));
    assert!(driver.ip_address().is_none());
}
