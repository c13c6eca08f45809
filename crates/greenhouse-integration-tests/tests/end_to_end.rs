// End-to-end scenarios over real TCP sockets.
//
// Each test starts a greenhouse server on an ephemeral localhost port and
// drives it with one or more control panels through the real client.

use std::collections::BTreeMap;
use std::time::Duration;

use greenhouse_integration_tests::{TestGreenhouse, TestPanel, NO_PUBLISH};
use greenhouse_protocol::{ActuatorState, Message, NodeSnapshot, SensorReading};
use greenhouse_server::{ActuatorPolicy, Layout, PanelClient};

fn single_node_layout() -> Layout {
    Layout {
        nodes: vec![NodeSnapshot::new(1)
            .with_sensor(SensorReading::new("temp", 21.5, "C"))
            .with_actuator(2, ActuatorState::new("window", false))],
    }
}

#[tokio::test]
async fn node_info_reply_matches_registry() {
    let greenhouse =
        TestGreenhouse::start_with(single_node_layout(), ActuatorPolicy::default(), NO_PUBLISH)
            .await;
    let mut panel = greenhouse.panel().await;

    let reply = panel.node_info().await;
    let expected = BTreeMap::from([(1, single_node_layout().nodes.remove(0))]);
    assert_eq!(reply, Message::NodeInfo { nodes: expected });
    assert!(!panel.view.is_actuator_on(1, 2));

    greenhouse.shutdown().await;
}

#[tokio::test]
async fn actuator_change_is_broadcast_but_node_info_is_not() {
    let greenhouse = TestGreenhouse::start().await;
    let mut first = greenhouse.panel().await;
    let mut second = greenhouse.panel().await;
    greenhouse.wait_for_sessions(2).await;

    first.client.turn_on(2, 3).await.unwrap();
    let expected = Message::ActuatorState {
        node_id: 2,
        actuator_id: 3,
        is_on: true,
    };
    assert_eq!(first.recv_reply().await, expected);
    assert_eq!(second.recv_reply().await, expected);
    assert!(second.view.is_actuator_on(2, 3));
    assert!(greenhouse.registry.is_actuator_on(2, 3).await);

    let reply = first.node_info().await;
    assert!(matches!(reply, Message::NodeInfo { ref nodes } if nodes.len() == 3));
    second.expect_silence().await;
}

#[tokio::test]
async fn errors_go_only_to_the_requester() {
    let greenhouse =
        TestGreenhouse::start_with(Layout::builtin(), ActuatorPolicy::RejectUnknown, NO_PUBLISH)
            .await;
    let mut asking = greenhouse.panel().await;
    let mut watching = greenhouse.panel().await;
    greenhouse.wait_for_sessions(2).await;

    asking.client.turn_on(1, 99).await.unwrap();
    assert_eq!(
        asking.recv_reply().await,
        Message::error("Actuator 99 not found on node 1")
    );
    asking.client.remove_node(42).await.unwrap();
    assert_eq!(asking.recv_reply().await, Message::error("Node 42 not found"));
    assert_eq!(asking.view.last_error(), Some("Node 42 not found"));

    watching.expect_silence().await;
    assert_eq!(greenhouse.registry.node_count().await, 3);
}

#[tokio::test]
async fn remove_node_is_broadcast() {
    let greenhouse = TestGreenhouse::start().await;
    let mut first = greenhouse.panel().await;
    let mut second = greenhouse.panel().await;
    greenhouse.wait_for_sessions(2).await;

    first.node_info().await;
    second.node_info().await;
    assert_eq!(second.view.nodes().len(), 3);

    first.client.remove_node(3).await.unwrap();
    assert_eq!(first.recv_reply().await, Message::NodeRemoved { node_id: 3 });
    assert_eq!(second.recv_reply().await, Message::NodeRemoved { node_id: 3 });
    assert_eq!(second.view.nodes().len(), 2);

    match first.node_info().await {
        Message::NodeInfo { nodes } => assert!(!nodes.contains_key(&3)),
        other => panic!("expected NodeInfo, got {other:?}"),
    }
}

#[tokio::test]
async fn garbage_lines_do_not_end_the_session() {
    let greenhouse = TestGreenhouse::start().await;
    let mut panel = greenhouse.panel().await;

    panel.send("hello there").await;
    panel.send("on:one:two").await;
    panel.send("SENSOR_DATA:1;temperature=20 °C").await;
    panel.expect_silence().await;

    panel.send("off:1:1").await;
    assert_eq!(
        panel.recv_reply().await,
        Message::ActuatorState {
            node_id: 1,
            actuator_id: 1,
            is_on: false
        }
    );
}

#[tokio::test]
async fn disconnect_closes_only_the_issuing_panel() {
    let greenhouse = TestGreenhouse::start().await;
    let mut leaving = greenhouse.panel().await;
    let mut staying = greenhouse.panel().await;
    greenhouse.wait_for_sessions(2).await;

    leaving.client.disconnect().await.unwrap();
    assert_eq!(leaving.recv().await, None);
    greenhouse.wait_for_sessions(1).await;

    staying.client.turn_on(1, 1).await.unwrap();
    assert!(matches!(
        staying.recv_reply().await,
        Message::ActuatorState { is_on: true, .. }
    ));
}

#[tokio::test]
async fn dropped_connection_leaves_the_live_set() {
    let greenhouse = TestGreenhouse::start().await;
    let panel = greenhouse.panel().await;
    greenhouse.wait_for_sessions(1).await;

    drop(panel);
    greenhouse.wait_for_sessions(0).await;
}

#[tokio::test]
async fn sensor_data_is_published_periodically() {
    let greenhouse = TestGreenhouse::start_with(
        Layout::builtin(),
        ActuatorPolicy::default(),
        Duration::from_millis(50),
    )
    .await;
    let mut panel = greenhouse.panel().await;

    let mut seen = BTreeMap::new();
    while seen.len() < 3 {
        if let Some(Message::SensorData { node_id, readings }) = panel.recv().await {
            seen.insert(node_id, readings);
        }
    }
    assert_eq!(seen[&1].len(), 4);
    assert_eq!(seen[&3], vec![SensorReading::new("temperature", 27.0, "°C"); 2]);

    greenhouse.registry.set_sensor_value(3, "temperature", 30.5).await.unwrap();
    loop {
        if let Some(Message::SensorData { node_id: 3, readings }) = panel.recv().await {
            if readings[0].value == 30.5 {
                break;
            }
        }
    }
    assert_eq!(panel.view.sensors(3), None, "view only tracks nodes it has info for");

    greenhouse.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_panels_serialize_on_the_registry() {
    const PANELS: usize = 4;
    const COMMANDS: usize = 20;

    let greenhouse = TestGreenhouse::start().await;
    let mut panels = Vec::new();
    for _ in 0..PANELS {
        panels.push(greenhouse.panel().await);
    }
    greenhouse.wait_for_sessions(PANELS).await;

    let mut tasks = Vec::new();
    for (index, mut panel) in panels.into_iter().enumerate() {
        tasks.push(tokio::spawn(async move {
            let mut last = false;
            for i in 0..COMMANDS {
                last = (i + index) % 2 == 0;
                if last {
                    panel.client.turn_on(1, 1).await.unwrap();
                } else {
                    panel.client.turn_off(1, 1).await.unwrap();
                }
            }
            // Every panel sees every state change exactly once.
            for _ in 0..PANELS * COMMANDS {
                let message = panel.recv_reply().await;
                assert!(
                    matches!(
                        message,
                        Message::ActuatorState {
                            node_id: 1,
                            actuator_id: 1,
                            ..
                        }
                    ),
                    "unexpected {message:?}"
                );
            }
            panel.expect_silence().await;
            last
        }));
    }

    let mut last_commands = Vec::new();
    for task in tasks {
        last_commands.push(tokio_test::assert_ok!(task.await));
    }

    // The serial order ends with some panel's final command.
    let final_state = greenhouse.registry.is_actuator_on(1, 1).await;
    assert!(last_commands.contains(&final_state));
}

#[tokio::test]
async fn shutdown_stops_accepting_but_keeps_sessions() {
    let greenhouse = TestGreenhouse::start().await;
    let addr = greenhouse.addr;
    let mut panel = greenhouse.panel().await;
    greenhouse.wait_for_sessions(1).await;

    let registry = std::sync::Arc::clone(&greenhouse.registry);
    greenhouse.shutdown().await;

    assert!(PanelClient::connect(addr).await.is_err());

    panel.client.turn_on(1, 1).await.unwrap();
    assert!(matches!(
        panel.recv_reply().await,
        Message::ActuatorState { is_on: true, .. }
    ));
    assert!(registry.is_actuator_on(1, 1).await);
}

#[tokio::test]
async fn panel_view_tracks_node_info() {
    let greenhouse = TestGreenhouse::start().await;
    let mut panel: TestPanel = greenhouse.panel().await;

    panel.node_info().await;
    assert_eq!(panel.view.nodes().len(), 3);
    assert_eq!(panel.view.sensors(1).map(<[_]>::len), Some(4));

    panel.client.turn_on(2, 1).await.unwrap();
    panel.recv_reply().await;
    assert!(panel.view.nodes()[&2].actuators[&1].is_on);
}
