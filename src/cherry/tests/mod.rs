//! Unit tests for the Cherry Servers driver.

use std::time::Duration;

use camino::Utf8PathBuf;
use tempfile::TempDir;

use crate::cherry::{CherryDriver, CherryDriverError, PowerAction};
use crate::config::CherryConfig;
use crate::driver::{Driver, MachineContext, MachineState};
use crate::test_support::{ScriptedApi, ScriptedKeygen, server};


fn dummy_config() -> CherryConfig {
    CherryConfig {
        auth_token: String::from("token"),
        project_id: String::from("proj"),
        hostname: String::new(),
        ssh_user: String::from("root"),
        existing_ssh_key_label: String::from("none"),
        existing_ssh_key_path: None,
        ssh_port: 22,
        image: String::from("Ubuntu 16.04 64bit"),
        region: String::from("EU-East-1"),
        plan: String::from("94"),
        userdata: None,
        tags: None,
    }
}

fn store_root(tmp: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(tmp.path().to_path_buf())
        .unwrap_or_else(|path| panic!("non-utf8 temp dir: {}", path.display()))
}

fn driver_fixture(
    config: CherryConfig,
    api: &ScriptedApi,
    tmp: &TempDir,
) -> CherryDriver<ScriptedApi, ScriptedKeygen> {
    CherryDriver::with_parts(
        config,
        MachineContext::new("machine-1", store_root(tmp)),
        api.clone(),
        ScriptedKeygen::new(),
    )
    .unwrap_or_else(|err| panic!("driver fixture: {err}"))
    .with_poll_settings(Duration::from_millis(1), 5)
}

#[test]
fn construction_rejects_missing_token() {
    let tmp = TempDir::new().expect("temp dir");
    let config = CherryConfig {
        auth_token: String::from("  "),
        ..dummy_config()
    };
    let result = CherryDriver::with_parts(
        config,
        MachineContext::new("m", store_root(&tmp)),
        ScriptedApi::new(),
        ScriptedKeygen::new(),
    );
    assert!(
        matches!(result, Err(CherryDriverError::Config(ref message)) if message.contains("CHERRYSERVERS_AUTH_TOKEN")),
        "unexpected result: {:?}",
        result.err()
    );
}

#[tokio::test]
async fn lifecycle_verbs_map_to_power_actions() {
    let tmp = TempDir::new().expect("temp dir");
    let api = ScriptedApi::new();
    let driver = driver_fixture(dummy_config(), &api, &tmp).with_server_id("77");

    driver.start().await.expect("start");
    driver.stop().await.expect("stop");
    driver.restart().await.expect("restart");
    driver.kill().await.expect("kill");
    driver.remove().await.expect("remove");

    let expected = vec![
        (String::from("77"), PowerAction::PowerOn),
        (String::from("77"), PowerAction::PowerOff),
        (String::from("77"), PowerAction::Reboot),
        (String::from("77"), PowerAction::PowerOff),
    ];
    assert_eq!(api.actions(), expected);
    assert_eq!(api.deleted(), vec![String::from("77")]);
}

#[tokio::test]
async fn power_action_errors_propagate_unchanged() {
    let tmp = TempDir::new().expect("temp dir");
    let api = ScriptedApi::new();
    let failure = CherryDriverError::Api {
        status: 409,
        message: String::from("server busy"),
    };
    api.fail_actions(failure.clone());
    let driver = driver_fixture(dummy_config(), &api, &tmp).with_server_id("77");

    let err = driver.start().await.expect_err("start should fail");
    assert_eq!(err, failure);
}

#[tokio::test]
async fn operations_without_server_fail() {
    let tmp = TempDir::new().expect("temp dir");
    let api = ScriptedApi::new();
    let driver = driver_fixture(dummy_config(), &api, &tmp);

    let err = driver.stop().await.expect_err("no server yet");
    assert!(matches!(err, CherryDriverError::ServerNotCreated { .. }));
    assert!(api.actions().is_empty());
}

#[tokio::test]
async fn state_maps_provider_status() {
    let tmp = TempDir::new().expect("temp dir");
    let api = ScriptedApi::new();
    api.push_server(server("9", "provisioning", &[]));
    api.push_server(server("9", "active", &[]));
    api.push_server(server("9", "terminating", &[]));
    api.push_server(server("9", "rescue", &[("primary-ip", "10.0.0.5")]));
    let driver = driver_fixture(dummy_config(), &api, &tmp).with_server_id("9");

    let mut observed = Vec::new();
    for _ in 0..4 {
        observed.push(driver.state().await.expect("state"));
    }
    assert_eq!(
        observed,
        vec![
            MachineState::Starting,
            MachineState::Running,
            MachineState::Stopped,
            MachineState::Unknown,
        ]
    );
}

#[tokio::test]
async fn state_query_failure_is_observed_as_error() {
    let tmp = TempDir::new().expect("temp dir");
    let api = ScriptedApi::new();
    api.push_fetch_error("connection reset");
    let driver = driver_fixture(dummy_config(), &api, &tmp).with_server_id("9");

    let result = driver.state().await;
    assert!(result.is_err());
    assert_eq!(MachineState::observed(&result), MachineState::Error);
}

#[tokio::test]
async fn url_requires_running_machine() {
    let tmp = TempDir::new().expect("temp dir");
    let api = ScriptedApi::new();
    api.push_server(server("9", "provisioning", &[("primary-ip", "10.0.0.5")]));
    let driver = driver_fixture(dummy_config(), &api, &tmp).with_server_id("9");

    let err = driver.url().await.expect_err("not running");
    assert_eq!(
        err,
        CherryDriverError::NotRunning {
            state: String::from("Starting"),
        }
    );
}

#[tokio::test]
async fn url_and_ssh_hostname_use_primary_ip() {
    let tmp = TempDir::new().expect("temp dir");
    let api = ScriptedApi::new();
    api.push_server(server("9", "active", &[("primary-ip", "10.0.0.5")]));
    api.push_server(server("9", "active", &[("primary-ip", "10.0.0.5")]));
    api.push_server(server("9", "active", &[("primary-ip", "10.0.0.5")]));
    let driver = driver_fixture(dummy_config(), &api, &tmp).with_server_id("9");

    assert_eq!(driver.url().await.expect("url"), "tcp://10.0.0.5:2376");
    assert_eq!(driver.ssh_hostname().await.expect("hostname"), "10.0.0.5");
}

#[tokio::test]
async fn ip_without_primary_address_fails() {
    let tmp = TempDir::new().expect("temp dir");
    let api = ScriptedApi::new();
    api.push_server(server("9", "active", &[("floating-ip", "192.0.2.1")]));
    let driver = driver_fixture(dummy_config(), &api, &tmp).with_server_id("9");

    let err = driver.ip().await.expect_err("no primary ip");
    assert_eq!(
        err,
        CherryDriverError::IpNotSet {
            server_id: String::from("9"),
        }
    );
}

#[test]
fn ssh_settings_come_from_configuration() {
    let tmp = TempDir::new().expect("temp dir");
    let api = ScriptedApi::new();
    let config = CherryConfig {
        ssh_user: String::from("ubuntu"),
        ssh_port: 2222,
        ..dummy_config()
    };
    let driver = driver_fixture(config, &api, &tmp);

    assert_eq!(driver.driver_name(), "cherryservers");
    assert_eq!(driver.ssh_username(), "ubuntu");
    assert_eq!(driver.ssh_port(), 2222);
    assert_eq!(
        driver.ssh_key_path(),
        store_root(&tmp).join("machines/machine-1/id_rsa")
    );
}

#[tokio::test]
async fn create_failure_is_propagated_and_no_wait_happens() {
    let tmp = TempDir::new().expect("temp dir");
    let api = ScriptedApi::new();
    let failure = CherryDriverError::Api {
        status: 422,
        message: String::from("plan unavailable"),
    };
    api.fail_create_server(failure.clone());
    let mut driver = driver_fixture(dummy_config(), &api, &tmp);

    let err = driver.create().await.expect_err("create should fail");
    assert_eq!(err, failure);
    assert_eq!(api.get_server_calls(), 0);
    assert!(driver.server_id().is_none());
}

#[tokio::test]
async fn create_sends_configured_request() {
    let tmp = TempDir::new().expect("temp dir");
    let user_data = tmp.path().join("user-data");
    std::fs::write(&user_data, "#cloud-config\n").expect("write user data");
    let api = ScriptedApi::new();
    api.push_server(server("1001", "active", &[("primary-ip", "10.0.0.5")]));
    let config = CherryConfig {
        hostname: String::from("web-1"),
        userdata: user_data.to_str().map(str::to_owned),
        tags: Some(String::from("env=dev, team=ops")),
        ..dummy_config()
    };
    let mut driver = driver_fixture(config, &api, &tmp);

    driver.create().await.expect("create");

    let requests = api.created_servers();
    let request = requests.first().expect("one create request");
    assert_eq!(request.hostname, "web-1");
    assert_eq!(request.plan, "94");
    assert_eq!(request.ssh_key_ids, vec![String::from("501")]);
    assert_eq!(request.user_data.as_deref(), Some("I2Nsb3VkLWNvbmZpZwo="));
    assert_eq!(
        request.tags,
        vec![
            (String::from("env"), String::from("dev")),
            (String::from("team"), String::from("ops")),
        ]
    );
}
