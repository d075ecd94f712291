//! Bulk runs against a scripted cluster.

use sluice_bulk::{
    BulkAllConfig, BulkAllError, BulkAllEvent, BulkAllPhase, BulkOperation, ItemRetryPolicy,
    bulk_all, bulk_all_iter,
};
use sluice_testing::{Behavior, ItemReply, VirtualCluster, item_rule};
use sluice_transport::{BackoffStrategy, PipelineFailure, RetryConfig};
use std::time::Duration;

fn operations(count: usize) -> Vec<BulkOperation> {
    (0..count)
        .map(|i| {
            BulkOperation::index(&serde_json::json!({ "n": i }))
                .unwrap()
                .with_id(i.to_string())
        })
        .collect()
}

fn fast_config() -> sluice_bulk::BulkAllConfigBuilder {
    BulkAllConfig::builder()
        .index("docs")
        .backoff(BackoffStrategy::None)
}

#[tokio::test]
async fn test_successful_items_are_never_resent() {
    let cluster = VirtualCluster::new(2).with_item_rule(item_rule(|item| {
        match item.id.as_deref() {
            Some("3") | Some("7") if item.seen == 1 => ItemReply::rejected(),
            _ => ItemReply::Ok,
        }
    }));
    let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();
    let config = fast_config().buffer_size(5).build();

    let summary = bulk_all_iter(pipeline, config, operations(10))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.items_succeeded, 10);
    assert_eq!(summary.items_failed, 0);
    assert_eq!(summary.items_retried, 2);
    assert_eq!(summary.total_retries, 2);
    for i in 0..10 {
        let expected = if i == 3 || i == 7 { 2 } else { 1 };
        assert_eq!(cluster.deliveries(&i.to_string()), expected, "item {}", i);
    }

    // retried bodies carry only the rejected item
    let retried: Vec<_> = cluster
        .bulk_calls()
        .iter()
        .map(|call| call.bulk_items().len())
        .collect();
    assert_eq!(retried.iter().filter(|n| **n == 1).count(), 2);
}

#[tokio::test]
async fn test_items_retried_counts_each_item_once() {
    let cluster = VirtualCluster::new(1).with_item_rule(item_rule(|item| {
        match item.id.as_deref() {
            Some("5") if item.seen <= 2 => ItemReply::rejected(),
            _ => ItemReply::Ok,
        }
    }));
    let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();
    let config = fast_config().buffer_size(10).build();

    let summary = bulk_all_iter(pipeline, config, operations(8))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.items_succeeded, 8);
    assert_eq!(summary.total_retries, 2);
    assert_eq!(summary.items_retried, 1);
    assert_eq!(cluster.deliveries("5"), 3);
}

#[tokio::test]
async fn test_concurrency_does_not_change_outcome() {
    let mut outcomes = Vec::new();
    for concurrency in [1, 4] {
        let cluster = VirtualCluster::new(3).with_item_rule(item_rule(|item| {
            let n: usize = item.id.as_deref().and_then(|id| id.parse().ok()).unwrap_or(0);
            if n % 7 == 0 {
                ItemReply::conflict()
            } else if n % 11 == 0 && item.seen == 1 {
                ItemReply::rejected()
            } else {
                ItemReply::Ok
            }
        }));
        let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();
        let config = fast_config()
            .buffer_size(250)
            .concurrency(concurrency)
            .build();

        let summary = bulk_all_iter(pipeline, config, operations(10_000))
            .unwrap()
            .wait()
            .await
            .unwrap();
        outcomes.push((
            summary.buffers,
            summary.items_succeeded,
            summary.items_failed,
            summary.failed_buffers,
        ));
    }

    let failed = (0..10_000).filter(|n| n % 7 == 0).count() as u64;
    assert_eq!(outcomes[0], outcomes[1]);
    assert_eq!(outcomes[0].0, 40);
    assert_eq!(outcomes[0].1, 10_000 - failed);
    assert_eq!(outcomes[0].2, failed);
}

#[tokio::test]
async fn test_transport_failure_exhausts_item_retries() {
    // the first buffer holds ids 0 and 1; every request carrying it is refused
    let cluster = VirtualCluster::new(3).with_route(|call| {
        call.body_text()
            .contains(r#""_id":"0""#)
            .then_some(Behavior::Refuse)
    });
    let mut transport = cluster.transport_config();
    transport.retry = RetryConfig::immediate(1);
    let pipeline = cluster.pipeline(transport).unwrap();
    let config = fast_config()
        .buffer_size(2)
        .concurrency(1)
        .max_item_retries(1)
        .build();

    let mut observer = bulk_all_iter(pipeline, config, operations(3)).unwrap();
    let mut buffers = Vec::new();
    let mut completed = None;
    while let Some(event) = observer.next_event().await {
        match event {
            BulkAllEvent::Buffer(result) => buffers.push(result),
            BulkAllEvent::Completed(summary) => completed = Some(summary),
            BulkAllEvent::Failed(e) => panic!("unexpected terminal failure: {}", e),
        }
    }

    buffers.sort_by_key(|b| b.buffer);
    assert_eq!(buffers.len(), 2);
    assert_eq!(buffers[0].items, 2);
    assert_eq!(buffers[0].failed, 2);
    assert_eq!(buffers[1].items, 1);
    assert_eq!(buffers[1].succeeded, 1);

    let summary = completed.unwrap();
    assert_eq!(summary.failed_buffers, 1);
    assert!(summary.total_retries >= 1);
    assert_eq!(observer.counters().failed_buffers(), 1);
    assert_eq!(observer.phase(), BulkAllPhase::Completed);
}

#[tokio::test]
async fn test_permanent_item_errors_do_not_fail_the_run() {
    let cluster = VirtualCluster::new(1).with_item_rule(item_rule(|item| {
        match item.id.as_deref() {
            Some("1") => ItemReply::conflict(),
            Some("4") => ItemReply::mapping(),
            _ => ItemReply::Ok,
        }
    }));
    let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();
    let config = fast_config().buffer_size(3).build();

    let mut observer = bulk_all_iter(pipeline, config, operations(6)).unwrap();
    let mut failures = Vec::new();
    while let Some(event) = observer.next_event().await {
        if let BulkAllEvent::Buffer(result) = event {
            failures.extend(result.failures);
        }
    }

    failures.sort_by_key(|f| f.seq);
    assert_eq!(failures.len(), 2);
    assert_eq!(failures[0].id.as_deref(), Some("1"));
    assert_eq!(failures[0].status, Some(409));
    assert_eq!(
        failures[0].error_type.as_deref(),
        Some("version_conflict_engine_exception")
    );
    assert_eq!(failures[0].retries, 0);
    assert_eq!(failures[1].error_type.as_deref(), Some("mapper_parsing_exception"));

    // conflicts are never re-sent
    assert_eq!(cluster.deliveries("1"), 1);
    assert_eq!(observer.counters().total_retries(), 0);
    assert_eq!(observer.counters().failed_buffers(), 2);
}

#[tokio::test]
async fn test_whole_buffer_rejection_is_retried() {
    let cluster = VirtualCluster::new(1).with_all(Behavior::fail_then_ok(1, Behavior::Status(429)));
    let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();
    let config = fast_config().buffer_size(10).build();

    let summary = bulk_all_iter(pipeline, config, operations(4))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.items_succeeded, 4);
    assert_eq!(summary.total_retries, 1);
    assert_eq!(summary.items_retried, 4);
    assert_eq!(cluster.bulk_calls().len(), 2);
    assert_eq!(cluster.deliveries("0"), 1);
}

#[tokio::test]
async fn test_authentication_failure_stops_run() {
    let cluster = VirtualCluster::new(2).with_all(Behavior::Status(401));
    let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();
    let config = fast_config().buffer_size(10).concurrency(1).build();

    let mut observer = bulk_all_iter(pipeline, config, operations(100)).unwrap();
    let mut terminal = Vec::new();
    while let Some(event) = observer.next_event().await {
        if event.is_terminal() {
            terminal.push(event);
        }
    }

    assert_eq!(terminal.len(), 1);
    match &terminal[0] {
        BulkAllEvent::Failed(BulkAllError::Pipeline { buffer, failure }) => {
            assert_eq!(*buffer, 0);
            assert_eq!(*failure, PipelineFailure::Authentication { status: 401 });
        }
        other => panic!("expected pipeline failure, got {:?}", other),
    }
    // no node penalty and no further buffers
    assert_eq!(cluster.call_count(), 1);
    assert_eq!(observer.phase(), BulkAllPhase::Failed);
}

#[tokio::test]
async fn test_fatal_error_abandons_retries_in_flight() {
    // buffer 0 fails authentication late, buffer 1 is waiting to retry by then
    let cluster = VirtualCluster::new(1)
        .with_route(|call| {
            call.body_text().contains(r#""_id":"0""#).then(|| {
                Behavior::Delay(Duration::from_millis(50), Box::new(Behavior::Status(401)))
            })
        })
        .with_item_rule(item_rule(|_| ItemReply::rejected()));
    let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();
    let config = BulkAllConfig::builder()
        .index("docs")
        .buffer_size(1)
        .concurrency(2)
        .max_item_retries(3)
        .backoff(BackoffStrategy::Constant(Duration::from_millis(500)))
        .build();

    let started = std::time::Instant::now();
    let mut observer = bulk_all_iter(pipeline, config, operations(2)).unwrap();
    let mut buffers = Vec::new();
    let mut terminal = None;
    while let Some(event) = observer.next_event().await {
        match event {
            BulkAllEvent::Buffer(result) => buffers.push(result),
            other => terminal = Some(other),
        }
    }

    assert!(matches!(
        terminal,
        Some(BulkAllEvent::Failed(BulkAllError::Pipeline {
            failure: PipelineFailure::Authentication { status: 401 },
            ..
        }))
    ));
    assert!(started.elapsed() < Duration::from_millis(400));
    assert_eq!(cluster.call_count(), 2);

    buffers.sort_by_key(|b| b.buffer);
    assert_eq!(buffers.len(), 2);
    assert_eq!(buffers[1].abandoned, 1);
    assert_eq!(buffers[1].dispatches, 1);
}

#[tokio::test]
async fn test_cancel_stops_drawing_input() {
    let cluster = VirtualCluster::new(1).with_all(Behavior::Delay(
        Duration::from_millis(20),
        Box::new(Behavior::Ok),
    ));
    let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();
    let config = fast_config().buffer_size(10).concurrency(1).build();

    let mut observer = bulk_all_iter(pipeline, config, operations(1_000)).unwrap();
    match observer.next_event().await {
        Some(BulkAllEvent::Buffer(result)) => assert_eq!(result.succeeded, 10),
        other => panic!("expected a buffer event, got {:?}", other),
    }
    observer.cancel();

    assert_eq!(observer.wait().await, Err(BulkAllError::Cancelled));
    assert!(cluster.bulk_calls().len() < 100);
}

#[tokio::test]
async fn test_cancel_abandons_pending_retries() {
    let cluster = VirtualCluster::new(1).with_item_rule(item_rule(|_| ItemReply::rejected()));
    let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();
    let config = BulkAllConfig::builder()
        .buffer_size(3)
        .backoff(BackoffStrategy::Constant(Duration::from_secs(60)))
        .build();

    let mut observer = bulk_all_iter(pipeline, config, operations(3)).unwrap();
    while observer.phase() != BulkAllPhase::Retrying {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    observer.cancel();

    match observer.next_event().await {
        Some(BulkAllEvent::Buffer(result)) => {
            assert_eq!(result.abandoned, 3);
            assert_eq!(result.succeeded + result.failed, 0);
        }
        other => panic!("expected a buffer event, got {:?}", other),
    }
    assert!(matches!(
        observer.next_event().await,
        Some(BulkAllEvent::Failed(BulkAllError::Cancelled))
    ));
    assert_eq!(cluster.bulk_calls().len(), 1);
}

#[tokio::test]
async fn test_lazy_stream_input() {
    let cluster = VirtualCluster::new(2);
    let pipeline = cluster.pipeline(cluster.transport_config()).unwrap();
    let config = fast_config()
        .buffer_size(7)
        .retry_policy(ItemRetryPolicy::never())
        .build();

    let stream = futures::stream::iter(operations(20));
    let summary = bulk_all(pipeline, config, stream)
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(summary.buffers, 3);
    assert_eq!(summary.items_succeeded, 20);
    assert!(cluster.bulk_calls().iter().all(|c| c.path == "/docs/_bulk"));
}
