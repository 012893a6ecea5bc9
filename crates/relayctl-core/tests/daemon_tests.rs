//! End-to-end tests: real daemon, real socket, client lock, fake hardware.

use std::time::Duration;

use pretty_assertions::assert_eq;
use relayctl_config::RelayConfig;
use relayctl_core::hardware::SimulatedBoard;
use relayctl_core::ipc::{Action, IpcClient, RelayResponse, RelayStatus};
use relayctl_test_utils::{FlakyHardware, TestConfigBuilder, TestDaemon};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

fn single(relay: &str, status: RelayStatus) -> RelayResponse {
    RelayResponse::Single {
        relay: relay.to_string(),
        status,
    }
}

fn error_message(response: &RelayResponse) -> &str {
    match response {
        RelayResponse::Error { error } => error,
        other => panic!("expected an error response, got {other:?}"),
    }
}

#[test_log::test(tokio::test)]
async fn switching_one_relay_leaves_the_others_alone() {
    let daemon = TestDaemon::start().await;
    let names: Vec<String> = daemon.config.relays.iter().map(|r| r.name.clone()).collect();

    for target in &names {
        daemon.send("all", Action::Off).await;
        assert_eq!(daemon.send(target, Action::On).await, single(target, RelayStatus::On));

        for other in names.iter().filter(|n| *n != target) {
            assert_eq!(
                daemon.send(other, Action::Status).await,
                single(other, RelayStatus::Off),
                "switching {target} changed {other}"
            );
        }
    }
    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn off_on_an_off_relay_reports_off() {
    let daemon = TestDaemon::start().await;
    assert_eq!(daemon.send("mag", Action::Off).await, single("mag", RelayStatus::Off));
    assert_eq!(daemon.send("mag", Action::Off).await, single("mag", RelayStatus::Off));
    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn on_and_off_round_trip_through_status() {
    let daemon = TestDaemon::start().await;

    daemon.send("plants", Action::On).await;
    assert_eq!(daemon.send("plants", Action::Status).await, single("plants", RelayStatus::On));
    assert!(daemon.energized("plants"));

    daemon.send("plants", Action::Off).await;
    assert_eq!(daemon.send("plants", Action::Status).await, single("plants", RelayStatus::Off));
    assert!(!daemon.energized("plants"));

    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn all_status_covers_every_relay_once() {
    let daemon = TestDaemon::start().await;
    daemon.send("pump2", Action::On).await;

    let RelayResponse::All(map) = daemon.send("all", Action::Status).await else {
        panic!("expected a mapping");
    };
    let names: Vec<&str> = map.iter().map(|(name, _)| name).collect();
    let expected: Vec<&str> = daemon.config.relays.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, expected);
    assert_eq!(map.get("pump2"), Some(RelayStatus::On));
    assert_eq!(map.get("farbed"), Some(RelayStatus::Off));

    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn all_off_drives_everything_off() {
    let board = SimulatedBoard::with_energized(&[10, 6, 9, 7, 8, 5, 11]);
    let daemon =
        TestDaemon::start_with(TestConfigBuilder::new(), FlakyHardware::with_board(board)).await;

    // Energized relays survive daemon startup.
    assert!(daemon.energized("pump1"));

    let RelayResponse::All(map) = daemon.send("all", Action::Off).await else {
        panic!("expected a mapping");
    };
    assert_eq!(map.len(), daemon.config.relays.len());
    assert!(map.iter().all(|(_, status)| status == RelayStatus::Off));
    for relay in &daemon.config.relays {
        assert!(!daemon.energized(&relay.name), "{} still energized", relay.name);
    }

    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn all_on_is_rejected_without_writes() {
    let daemon = TestDaemon::start().await;
    let writes_before = daemon.hardware.board().write_count();

    let response = daemon.send("all", Action::On).await;
    assert!(error_message(&response).contains("not allowed"));
    assert_eq!(daemon.hardware.board().write_count(), writes_before);
    assert_eq!(daemon.hardware.calls(), 0);

    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn unknown_relay_is_rejected_without_hardware_access() {
    let daemon = TestDaemon::start().await;

    for action in [Action::On, Action::Off, Action::Status] {
        let response = daemon.send("valve99", action).await;
        assert!(error_message(&response).contains("valve99"));
    }
    assert_eq!(daemon.hardware.calls(), 0);

    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn transient_faults_are_retried_away() {
    let daemon = TestDaemon::start().await;

    daemon.hardware.fail_next(2);
    assert_eq!(daemon.send("nearbed", Action::On).await, single("nearbed", RelayStatus::On));
    assert_eq!(daemon.hardware.injected_faults(), 2);
    // Two failed writes, the successful write, then the read-back.
    assert_eq!(daemon.hardware.calls(), 4);

    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn retry_budget_comes_from_config() {
    let daemon =
        TestDaemon::start_with(TestConfigBuilder::new().retry(5, 1), FlakyHardware::new()).await;

    daemon.hardware.fail_next(4);
    assert_eq!(daemon.send("mag", Action::On).await, single("mag", RelayStatus::On));
    assert_eq!(daemon.hardware.injected_faults(), 4);

    daemon.hardware.fail_always();
    let response = daemon.send("mag", Action::Status).await;
    assert!(error_message(&response).contains("5 attempt(s)"));

    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn persistent_fault_yields_hardware_error() {
    let daemon = TestDaemon::start().await;
    daemon.hardware.fail_always();

    let response = tokio::time::timeout(Duration::from_secs(5), daemon.send("mag", Action::On))
        .await
        .expect("daemon hung on a dead bus");
    let message = error_message(&response);
    assert!(message.starts_with("hardware error:"), "{message}");
    assert!(message.contains("3 attempt(s)"), "{message}");

    // The daemon keeps serving once the bus recovers.
    daemon.hardware.heal();
    assert_eq!(daemon.send("mag", Action::Status).await, single("mag", RelayStatus::Off));

    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_clients_both_succeed() {
    let daemon = TestDaemon::start().await;

    let a = daemon.client();
    let b = daemon.client();
    let (ra, rb) = tokio::join!(a.send("farbed", Action::On), b.send("pump1", Action::On));

    assert_eq!(ra.unwrap(), single("farbed", RelayStatus::On));
    assert_eq!(rb.unwrap(), single("pump1", RelayStatus::On));
    assert!(daemon.energized("farbed"));
    assert!(daemon.energized("pump1"));

    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn concurrent_connections_without_the_lock_are_serialized() {
    let daemon = TestDaemon::start().await;
    let socket = daemon.socket_path();

    let mut tasks = Vec::new();
    for relay in ["farbed", "nearbed", "mag", "plants", "valve5", "pump1", "pump2"] {
        let ipc = IpcClient::new(&socket);
        tasks.push(tokio::spawn(async move {
            ipc.send(&relayctl_core::RelayRequest::new(relay, Action::On, "burst"))
                .await
                .unwrap()
        }));
    }
    for task in tasks {
        assert!(!task.await.unwrap().is_error());
    }

    let RelayResponse::All(map) = daemon.send("all", Action::Status).await else {
        panic!("expected a mapping");
    };
    assert!(map.iter().all(|(_, status)| status == RelayStatus::On));

    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn malformed_requests_get_error_responses() {
    let daemon = TestDaemon::start().await;

    for payload in [
        &b"this is not json\n"[..],
        &br#"{"relay":"mag","action":"toggle"}"#[..],
        &br#"{"action":"on"}"#[..],
    ] {
        let mut stream = UnixStream::connect(daemon.socket_path()).await.unwrap();
        stream.write_all(payload).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with(r#"{"error":"#), "{reply}");
    }
    assert_eq!(daemon.hardware.calls(), 0);

    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn legacy_username_field_is_accepted() {
    let daemon = TestDaemon::start().await;
    let mut stream = UnixStream::connect(daemon.socket_path()).await.unwrap();
    stream
        .write_all(br#"{"relay": "valve5", "action": "on", "username": "pi"}"#)
        .await
        .unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    assert_eq!(reply, "{\"relay\":\"valve5\",\"status\":\"on\"}\n");
    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn shutdown_removes_the_socket() {
    let daemon = TestDaemon::start().await;
    let socket = daemon.socket_path();
    assert!(socket.exists());

    daemon.stop().await.unwrap();
    assert!(!socket.exists());

    let scratch = tempfile::tempdir().unwrap();
    let err = relayctl_core::RelayClient::new(IpcClient::new(&socket), scratch.path().join("lock"))
        .send("mag", Action::Status)
        .await
        .unwrap_err();
    assert_eq!(err.exit_code(), 4);
}

#[test_log::test(tokio::test)]
async fn custom_relay_table() {
    let builder = TestConfigBuilder::new().relays(vec![
        RelayConfig::new("drip", 0, 0),
        RelayConfig::new("mister", 1, 15),
    ]);
    let daemon = TestDaemon::start_with(builder, FlakyHardware::new()).await;

    assert_eq!(daemon.send("mister", Action::On).await, single("mister", RelayStatus::On));
    assert!(daemon.hardware.board().energized(15));
    assert!(error_message(&daemon.send("farbed", Action::Status).await).contains("farbed"));

    daemon.stop().await.unwrap();
}

#[test_log::test(tokio::test)]
async fn stop_does_not_wait_for_an_unfinished_request() {
    let daemon = TestDaemon::start().await;
    let socket = daemon.socket_path();

    let mut idle = UnixStream::connect(&socket).await.unwrap();
    idle.write_all(br#"{"relay":"#).await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    tokio::time::timeout(Duration::from_secs(3), daemon.stop())
        .await
        .expect("daemon kept running for a stalled client")
        .unwrap();
    assert!(!socket.exists());
}

#[test_log::test(tokio::test)]
async fn relay_names_shaped_like_reply_fields() {
    let builder = TestConfigBuilder::new().relays(vec![
        RelayConfig::new("relay", 0, 3),
        RelayConfig::new("status", 1, 4),
        RelayConfig::new("drip", 2, 5),
    ]);
    let daemon = TestDaemon::start_with(builder, FlakyHardware::new()).await;

    assert_eq!(daemon.send("status", Action::On).await, single("status", RelayStatus::On));

    let reply = daemon.send("all", Action::Status).await;
    let RelayResponse::All(map) = reply else {
        panic!("expected a mapping, got {reply:?}");
    };
    let entries: Vec<_> = map.iter().collect();
    assert_eq!(
        entries,
        vec![
            ("relay", RelayStatus::Off),
            ("status", RelayStatus::On),
            ("drip", RelayStatus::Off),
        ]
    );

    daemon.stop().await.unwrap();
}
