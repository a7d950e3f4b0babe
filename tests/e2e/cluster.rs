//! Cluster lifecycle tests against fake nodes.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::harness::{environment, FakeCluster, FakeNode, FakeNodeOptions, RunBehavior};
use localnet::{Cluster, Error, GethConfig, LocalnetConfig, NodeState};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn healthy(_: usize) -> FakeNodeOptions {
    FakeNodeOptions::default()
}

#[test]
fn test_node_list_built_at_construction() {
    let fake = FakeCluster::new(5, healthy);
    assert_eq!(fake.cluster.nodes().len(), 5);
    assert_eq!(fake.nodes.len(), 5);
    for (i, node) in fake.cluster.nodes().iter().enumerate() {
        assert_eq!(node.index(), i);
        assert_eq!(node.spec().name(), format!("validator-{i:02}"));
    }
    assert!(fake.calls().is_empty(), "construction must not touch nodes");
}

#[tokio::test]
async fn test_init_orders_calls_and_builds_full_mesh() {
    let fake = FakeCluster::new(4, healthy);
    fake.cluster.init().await.unwrap();

    let expected: Vec<String> = (0..4)
        .flat_map(|i| [format!("init:{i}"), format!("id:{i}")])
        .chain((0..4).map(|i| format!("peers:{i}")))
        .collect();
    assert_eq!(fake.calls(), expected);

    for (i, node) in fake.nodes.iter().enumerate() {
        let peers = node.peers().unwrap();
        assert_eq!(peers.len(), 3);
        assert!(!peers.contains(&FakeNode::identifier(i)));
        for j in (0..4).filter(|j| *j != i) {
            assert!(peers.contains(&FakeNode::identifier(j)));
        }
    }
    for node in fake.cluster.nodes() {
        assert_eq!(node.state().await, NodeState::Peered);
    }
}

#[tokio::test]
async fn test_single_node_has_no_peers() {
    let fake = FakeCluster::new(1, healthy);
    fake.cluster.init().await.unwrap();
    assert_eq!(fake.nodes[0].peers().unwrap(), Vec::<String>::new());
}

#[tokio::test]
async fn test_init_fails_fast() {
    let fake = FakeCluster::new(4, |i| FakeNodeOptions {
        fail_initialize: i == 2,
        ..FakeNodeOptions::default()
    });

    let err = fake.cluster.init().await.unwrap_err();
    assert!(matches!(err, Error::Initialization(_)));

    let calls = fake.calls();
    assert_eq!(calls, vec!["init:0", "id:0", "init:1", "id:1", "init:2"]);
    assert!(fake.nodes.iter().all(|n| n.peers().is_none()));

    let nodes = fake.cluster.nodes();
    assert_eq!(nodes[0].state().await, NodeState::Initialized);
    assert!(matches!(nodes[2].state().await, NodeState::Failed(_)));
    assert_eq!(nodes[3].state().await, NodeState::Pending);
}

#[tokio::test]
async fn test_peering_aborts_on_first_error() {
    let fake = FakeCluster::new(3, |i| FakeNodeOptions {
        fail_set_peers: i == 1,
        ..FakeNodeOptions::default()
    });

    let err = fake.cluster.init().await.unwrap_err();
    assert!(matches!(err, Error::Topology(_)));

    let calls = fake.calls();
    assert_eq!(calls.last().unwrap(), "peers:1");
    assert!(!calls.contains(&"peers:2".to_string()));
    assert!(fake.nodes[0].peers().is_some());
    assert!(fake.nodes[2].peers().is_none());
}

#[tokio::test]
async fn test_node_info_in_index_order() {
    let fake = FakeCluster::new(3, healthy);
    assert!(fake.cluster.node_info().await.is_err());

    fake.cluster.init().await.unwrap();
    let info = fake.cluster.node_info().await.unwrap();
    assert_eq!(info.len(), 3);
    for (i, entry) in info.iter().enumerate() {
        assert_eq!(entry.index, i);
        assert_eq!(entry.identifier, FakeNode::identifier(i));
    }
}

#[tokio::test(start_paused = true)]
async fn test_node_failure_cancels_siblings() {
    let fake = FakeCluster::new(4, |i| FakeNodeOptions {
        run: if i == 2 {
            RunBehavior::FailAfter(Duration::from_secs(3))
        } else {
            RunBehavior::UntilCancelled
        },
        ..FakeNodeOptions::default()
    });
    fake.cluster.init().await.unwrap();

    let err = fake.cluster.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::ProcessRun(ref m) if m.contains("node 2")));

    for i in [0, 1, 3] {
        assert!(fake.nodes[i].saw_cancel(), "node {i} should observe cancellation");
        assert_eq!(fake.cluster.nodes()[i].state().await, NodeState::Stopped);
    }
    assert!(matches!(
        fake.cluster.nodes()[2].state().await,
        NodeState::Failed(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_caller_cancel_stops_every_node() {
    let fake = FakeCluster::new(3, healthy);
    fake.cluster.init().await.unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        trigger.cancel();
    });

    let err = fake.cluster.run(&cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    for (i, node) in fake.nodes.iter().enumerate() {
        assert!(node.saw_cancel());
        assert_eq!(fake.cluster.nodes()[i].state().await, NodeState::Stopped);
    }
}

#[tokio::test]
async fn test_run_cancelled_before_start() {
    let fake = FakeCluster::new(2, healthy);
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert!(fake.cluster.run(&cancel).await.unwrap_err().is_cancelled());
}

#[tokio::test]
async fn test_empty_cluster_cannot_run() {
    let fake = FakeCluster::new(0, healthy);
    fake.cluster.init().await.unwrap();
    let err = fake.cluster.run(&CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_geth_cluster_rejects_port_overflow() {
    let dir = tempfile::tempdir().unwrap();
    let env = environment(dir.path(), 3);
    let settings = LocalnetConfig {
        p2p_base_port: 65534,
        ..LocalnetConfig::default()
    };
    let geth = GethConfig::from_settings(PathBuf::from("geth"), &settings);
    let err = Cluster::with_geth(env, geth).err().unwrap();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_geth_node_info_needs_no_binary() {
    let dir = tempfile::tempdir().unwrap();
    let env = environment(dir.path(), 2);
    for (i, account) in env.validator_accounts().iter().enumerate() {
        let instance = env.validator_datadir(i).join("geth");
        std::fs::create_dir_all(&instance).unwrap();
        std::fs::write(instance.join("nodekey"), account.private_key_hex()).unwrap();
    }

    let settings = LocalnetConfig {
        geth: Some(PathBuf::from("/nonexistent/geth")),
        ..LocalnetConfig::default()
    };
    let geth = GethConfig::from_settings(settings.geth_or_default(), &settings);
    let info = Cluster::with_geth(env, geth).unwrap().node_info().await.unwrap();

    assert_eq!(info.len(), 2);
    for (i, node) in info.iter().enumerate() {
        assert_eq!(node.index, i);
        assert!(node.identifier.starts_with("enode://"));
        assert!(node.identifier.ends_with(&format!("@127.0.0.1:{}", 30303 + i)));
    }
    assert_ne!(info[0].identifier, info[1].identifier);
}
