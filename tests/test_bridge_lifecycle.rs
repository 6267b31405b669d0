//! Connection lifecycle, discovery and refresh through the event loop
//!
//! The bridge runs in its own task against the mock transport; tests drive it
//! with injected transport events and observe published messages.


use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use test_helpers::{mock_bridge, sample_catalog, wait_for_subscriptions, NODE};
use tokio::sync::watch;
use wallbridge::bridge::RefreshStep;
use wallbridge::control::CurrentWallpaper;
use wallbridge::testing::{ControlCall, MockTransport};
use wallbridge::transport::TransportEvent;

const COMMAND_TOPICS: usize = 9;

/// unique_id and device identifiers of every discovery document, keyed by topic
fn discovery_identities(transport: &MockTransport) -> HashMap<String, Vec<(String, Value)>> {
    let mut identities: HashMap<String, Vec<(String, Value)>> = HashMap::new();
    for message in transport.published_messages() {
        if !message.topic.ends_with("/config") {
            continue;
        }
        let document: Value = serde_json::from_slice(&message.payload).unwrap();
        identities.entry(message.topic.clone()).or_default().push((
            document["unique_id"].as_str().unwrap().to_string(),
            document["device"]["identifiers"].clone(),
        ));
    }
    identities
}

#[tokio::test]
async fn test_discovery_is_idempotent_across_reconnects() {
    let (mut bridge, transport, control) = mock_bridge();
    control.set_wallpapers(sample_catalog());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { bridge.run(shutdown_rx).await });

    wait_for_subscriptions(&transport, COMMAND_TOPICS).await;
    transport.inject(TransportEvent::Connected).await;
    wait_for_subscriptions(&transport, COMMAND_TOPICS * 2).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let identities = discovery_identities(&transport);
    assert_eq!(identities.len(), 11);
    for (topic, registrations) in identities {
        assert!(registrations.len() >= 2, "{topic} registered once");
        let first = &registrations[0];
        assert!(
            registrations.iter().all(|registration| registration == first),
            "{topic} changed identity between connects"
        );
        assert!(first.0.starts_with(NODE));
        assert_eq!(first.1, serde_json::json!([format!("wallpaper_engine_{NODE}")]));
    }
}

#[tokio::test]
async fn test_presence_online_then_offline() {
    let (mut bridge, transport, _control) = mock_bridge();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { bridge.run(shutdown_rx).await });
    wait_for_subscriptions(&transport, COMMAND_TOPICS).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    let status_topic = format!("homeassistant/status/{NODE}");
    assert_eq!(transport.published_to(&status_topic), vec!["online", "offline"]);
    let published = transport.published_messages();
    assert_eq!(published.first().unwrap().topic, status_topic);
    assert_eq!(published.last().unwrap().topic, status_topic);
    assert!(published
        .iter()
        .filter(|m| m.topic == status_topic)
        .all(|m| m.retain));
}

#[tokio::test]
async fn test_commands_are_handled_in_order() {
    let (mut bridge, transport, control) = mock_bridge();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { bridge.run(shutdown_rx).await });
    wait_for_subscriptions(&transport, COMMAND_TOPICS).await;
    control.clear_calls();

    for (entity, payload) in [("muted", "ON"), ("paused", "ON"), ("muted", "OFF")] {
        transport
            .inject(TransportEvent::Message {
                topic: format!("we/{NODE}/{entity}/set"),
                payload: payload.as_bytes().to_vec(),
            })
            .await;
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap().unwrap();

    assert_eq!(
        control.calls(),
        vec![ControlCall::Mute, ControlCall::Pause, ControlCall::Unmute]
    );
    assert_eq!(
        transport.published_to(&format!("we/{NODE}/muted/state")),
        vec!["OFF", "ON", "OFF"]
    );
}

#[tokio::test]
async fn test_refresh_steps_are_independent() {
    let (mut bridge, transport, control) = mock_bridge();
    control.fail_on("list_wallpapers");
    control.set_profiles(vec!["Work".to_string()]);
    control.set_current(CurrentWallpaper {
        id: "abc123".to_string(),
        title: "Sunset".to_string(),
        path: "/workshop/abc123".to_string(),
        ..CurrentWallpaper::default()
    });

    let report = bridge.refresh().await;
    assert_eq!(report.failed, vec![RefreshStep::Wallpapers]);

    let calls = control.calls();
    assert_eq!(
        calls,
        vec![
            ControlCall::ListWallpapers,
            ControlCall::ListProfiles,
            ControlCall::CurrentWallpaper
        ]
    );
    assert_eq!(
        transport.published_to(&format!("we/{NODE}/profiles/list")),
        vec![r#"["Work"]"#]
    );
    assert_eq!(
        transport.published_to(&format!("we/{NODE}/current_wallpaper/state")),
        vec![r#"{"id":"abc123","title":"Sunset"}"#]
    );
}

#[tokio::test]
async fn test_every_step_failing_still_completes() {
    let (mut bridge, transport, control) = mock_bridge();
    for method in ["list_wallpapers", "list_profiles", "current_wallpaper"] {
        control.fail_on(method);
    }
    transport.set_publish_failure(true);

    let report = bridge.refresh().await;
    assert_eq!(
        report.failed,
        vec![
            RefreshStep::Wallpapers,
            RefreshStep::Profiles,
            RefreshStep::SelectOptions,
            RefreshStep::CurrentWallpaper,
            RefreshStep::Catalogs
        ]
    );
}

#[tokio::test]
async fn test_select_options_follow_catalog() {
    let (mut bridge, transport, control) = mock_bridge();
    control.set_wallpapers(sample_catalog());
    bridge.refresh().await;

    let select = transport.published_to(&format!(
        "homeassistant/select/{NODE}/select_wallpaper/config"
    ));
    let document: Value = serde_json::from_str(select.last().unwrap()).unwrap();
    let options: Vec<&str> = document["options"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(options.contains(&"Sunset (abc123)"));
    assert!(options.contains(&"Sunset (abc123)|all"));
    assert!(options.contains(&"Rain (def456)|2"));
    assert_eq!(options.len(), 2 * (1 + 1 + 3));
}

#[tokio::test]
async fn test_transport_failure_surfaces_error() {
    let (mut bridge, transport, _control) = mock_bridge();

    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move { bridge.run(shutdown_rx).await });
    wait_for_subscriptions(&transport, COMMAND_TOPICS).await;
    transport
        .inject(TransportEvent::Failed("too many poll failures".to_string()))
        .await;

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap();
    let error = result.unwrap_err();
    assert!(error.to_string().contains("too many poll failures"));
}
