//! Pipeline and pool behaviour against a scripted cluster.

use sluice_testing::{Behavior, VirtualCluster};
use sluice_transport::{
    AttemptOutcome, NodePoolConfig, NodeState, PipelineFailure, RequestSpec, RetryConfig,
    SelectionStrategy, SniffConfig,
};
use std::time::Duration;

#[tokio::test]
async fn test_dead_node_is_not_selected_while_others_are_alive() {
    let cluster = VirtualCluster::new(3).with_behavior(1, Behavior::Refuse);
    let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();

    for _ in 0..12 {
        let envelope = pipeline.execute(RequestSpec::get("/")).await;
        assert!(envelope.is_valid());
    }

    // one refused call marks node-1 dead, after that it is skipped
    assert_eq!(cluster.calls_to(1).len(), 1);
    let snapshot = pipeline.pool().snapshot();
    assert_eq!(snapshot[1].state(), NodeState::Dead);
    assert_eq!(snapshot[0].state(), NodeState::Alive);
    assert_eq!(snapshot[2].state(), NodeState::Alive);
}

#[tokio::test]
async fn test_retry_count_is_max_retries_plus_one() {
    for max_retries in [0u32, 1, 3, 7] {
        let cluster = VirtualCluster::new(3).with_all(Behavior::Status(503));
        let mut config = cluster.transport_config();
        config.retry = RetryConfig::immediate(max_retries);
        let pipeline = cluster.pipeline(config).unwrap();

        let envelope = pipeline.execute(RequestSpec::get("/_search")).await;

        assert!(!envelope.is_valid());
        assert_eq!(envelope.attempts().len() as u32, max_retries + 1);
        assert_eq!(cluster.call_count() as u32, max_retries + 1);
        assert!(matches!(
            envelope.failure(),
            Some(PipelineFailure::MaxRetriesExceeded { attempts, .. }) if *attempts == max_retries + 1
        ));
        assert_eq!(envelope.status_code(), Some(503));
    }
}

#[tokio::test]
async fn test_timeout_is_retried_on_another_node() {
    let cluster = VirtualCluster::new(2).with_behavior(0, Behavior::Hang);
    let config = sluice_transport::TransportConfig::builder()
        .nodes(cluster.urls())
        .request_timeout(Duration::from_millis(50))
        .build();
    let pipeline = cluster.pipeline(config).unwrap();

    let envelope = pipeline.execute(RequestSpec::get("/")).await;

    assert!(envelope.is_valid());
    let outcomes: Vec<AttemptOutcome> = envelope.attempts().iter().map(|a| a.outcome).collect();
    assert_eq!(outcomes, [AttemptOutcome::TransportError, AttemptOutcome::Success]);
    assert!(envelope.attempts()[0].error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn test_request_timeout_override() {
    let cluster = VirtualCluster::new(1)
        .with_behavior(0, Behavior::Delay(Duration::from_millis(200), Box::new(Behavior::Ok)));
    let mut config = cluster.transport_config();
    config.retry = RetryConfig::disabled();
    let pipeline = cluster.pipeline(config).unwrap();

    let envelope = pipeline
        .execute(RequestSpec::get("/").timeout(Duration::from_millis(20)))
        .await;

    assert!(!envelope.is_valid());
    assert_eq!(envelope.attempts().len(), 1);
}

#[tokio::test]
async fn test_recovered_node_is_marked_alive() {
    let cluster = VirtualCluster::new(1).with_behavior(0, Behavior::fail_then_ok(1, Behavior::Refuse));
    let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();

    let envelope = pipeline.execute(RequestSpec::get("/")).await;

    assert!(envelope.is_valid());
    assert_eq!(envelope.attempts().len(), 2);
    assert!(envelope.attempts()[1].resurrected);
    let node = &pipeline.pool().snapshot()[0];
    assert_eq!(node.state(), NodeState::Alive);
    assert_eq!(node.failed_attempts(), 0);
}

#[tokio::test]
async fn test_max_retry_time_bounds_the_call() {
    let cluster = VirtualCluster::new(2).with_all(Behavior::Status(502));
    let mut config = cluster.transport_config();
    config.retry = RetryConfig::exponential(50, Duration::from_millis(20))
        .with_max_retry_time(Duration::from_millis(60));
    let pipeline = cluster.pipeline(config).unwrap();

    let envelope = pipeline.execute(RequestSpec::get("/")).await;

    assert!(matches!(
        envelope.failure(),
        Some(PipelineFailure::MaxRetryTimeExceeded(_))
    ));
    assert!(envelope.attempts().len() < 51);
}

#[tokio::test]
async fn test_sniff_on_connection_fault_discovers_new_nodes() {
    let cluster = VirtualCluster::new(1).with_behavior(0, Behavior::Sequence(vec![
        Behavior::Status(503),
        Behavior::Ok,
    ]));
    let mut config = cluster.transport_config();
    cluster.set_topology(["http://node-0:9200", "http://node-5:9200"]);
    config.pool = NodePoolConfig {
        strategy: SelectionStrategy::Sticky,
        ..Default::default()
    };
    config.sniff = SniffConfig {
        on_connection_fault: true,
        ..Default::default()
    };
    let pipeline = cluster.pipeline(config).unwrap();

    let envelope = pipeline.execute(RequestSpec::get("/")).await;

    assert!(envelope.is_valid());
    assert_eq!(pipeline.pool().len(), 2);
    assert_eq!(envelope.attempts()[1].node.as_str(), "http://node-5:9200/");
    // node-0 keeps its dead state across the sniff
    assert_eq!(pipeline.pool().snapshot()[0].state(), NodeState::Dead);
}

#[tokio::test]
async fn test_sniff_lifespan_refreshes_topology() {
    let cluster = VirtualCluster::new(1);
    let mut config = cluster.transport_config();
    config.sniff = SniffConfig {
        on_start: true,
        lifespan: Some(Duration::from_millis(30)),
        ..Default::default()
    };
    let pipeline = cluster.pipeline(config).unwrap();

    pipeline.execute(RequestSpec::get("/")).await;
    assert_eq!(pipeline.pool().len(), 1);

    cluster.set_topology(["http://node-0:9200", "http://node-1:9200", "http://node-2:9200"]);
    tokio::time::sleep(Duration::from_millis(40)).await;
    pipeline.execute(RequestSpec::get("/")).await;

    assert_eq!(pipeline.pool().len(), 3);
    let sniffs = cluster
        .calls()
        .iter()
        .filter(|c| c.path == "/_nodes/http")
        .count();
    assert_eq!(sniffs, 2);
}

#[tokio::test]
async fn test_concurrent_calls_share_the_pool() {
    let cluster = VirtualCluster::new(4).with_behavior(2, Behavior::Refuse);
    let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let pipeline = pipeline.clone();
        handles.push(tokio::spawn(async move {
            pipeline.execute(RequestSpec::get("/")).await.is_valid()
        }));
    }
    for handle in handles {
        assert!(handle.await.unwrap());
    }

    assert_eq!(pipeline.pool().alive_count(), 3);
    assert!(pipeline.pool().snapshot().iter().all(|n| n.in_flight() == 0));
}
