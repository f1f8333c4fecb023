mod common;

use common::{quick, service_with, sorted_bodies};
use sqsdr::{Dump, Error, FilterChooser, QueueRef, QueueService, Redrive};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

#[tokio::test]
async fn redrive_moves_every_message() {
    let (service, urls) = service_with(&["orders-dlq", "orders"]);
    for i in 0..12 {
        service.push(&urls[0], format!("order {:02}", i));
    }

    let source = QueueRef::resolve("orders-dlq", service.clone()).await.unwrap();
    let destination = QueueRef::resolve("orders", service.clone()).await.unwrap();
    Redrive::new(source, destination)
        .with_config(quick())
        .redrive(&CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(service.visible_count(&urls[0]), 0);
    assert_eq!(service.in_flight_count(&urls[0]), 0);
    assert_eq!(service.visible_count(&urls[1]), 12);
    assert!(service.created_queues().is_empty());
}

#[tokio::test]
async fn filtered_redrive_only_moves_matches() {
    let (service, urls) = service_with(&["orders-dlq", "orders"]);
    for kind in ["placed", "cancelled", "placed", "refunded", "placed"] {
        service.push(
            &urls[0],
            format!(r#"{{"detail":{{"type":"{}","id":1}}}}"#, kind),
        );
    }

    let filter = FilterChooser::new(Some("detail.type"), "^\"placed\"$").unwrap();
    Redrive::new(
        QueueRef::new(&urls[0], service.clone()),
        QueueRef::new(&urls[1], service.clone()),
    )
    .with_filter(filter)
    .with_config(quick())
    .redrive(&CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(service.visible_count(&urls[1]), 3);
    let left_behind = sorted_bodies(&service, &urls[0]);
    assert_eq!(left_behind.len(), 2);
    assert!(left_behind[0].contains("cancelled"));
    assert!(left_behind[1].contains("refunded"));
    assert_eq!(
        service.deleted_queues(),
        vec!["sqsdr-orders-dlq-fallthrough"]
    );
    assert!(!service.queue_exists("sqsdr-orders-dlq-fallthrough"));
}

#[tokio::test]
async fn unparseable_bodies_stay_in_the_source() {
    let (service, urls) = service_with(&["dlq", "main"]);
    service.push(&urls[0], r#"{"level":"error"}"#);
    service.push(&urls[0], "not json at all");

    Redrive::new(
        QueueRef::new(&urls[0], service.clone()),
        QueueRef::new(&urls[1], service.clone()),
    )
    .with_filter(FilterChooser::new(Some("level"), "error").unwrap())
    .with_config(quick())
    .redrive(&CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(sorted_bodies(&service, &urls[1]), vec![r#"{"level":"error"}"#]);
    assert_eq!(sorted_bodies(&service, &urls[0]), vec!["not json at all"]);
}

#[tokio::test]
async fn dump_writes_every_message_and_keeps_them() {
    let (service, urls) = service_with(&["dlq"]);
    for body in ["a", "b", "c", "d"] {
        service.push(&urls[0], body);
    }

    let out = Arc::new(Mutex::new(Vec::<u8>::new()));
    Dump::shared(QueueRef::new(&urls[0], service.clone()), out.clone())
        .with_config(quick())
        .dump(&CancellationToken::new())
        .await
        .unwrap();

    let text = String::from_utf8(out.lock().unwrap().clone()).unwrap();
    let mut dumped: Vec<String> = text
        .lines()
        .map(|line| {
            let record: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(record["MessageId"].is_string());
            assert!(record["ReceiptHandle"].is_string());
            record["Body"].as_str().unwrap().to_string()
        })
        .collect();
    dumped.sort();

    assert_eq!(dumped, vec!["a", "b", "c", "d"]);
    assert_eq!(sorted_bodies(&service, &urls[0]), vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn leftover_fallthrough_queue_is_reused() {
    let (service, urls) = service_with(&["dlq", "main"]);
    // a crashed run left a message behind in its fallthrough queue
    let leftover = service.add_queue("sqsdr-dlq-fallthrough");
    service.push(&leftover, "parked");
    service.push(&urls[0], "fresh");

    Redrive::new(
        QueueRef::new(&urls[0], service.clone()),
        QueueRef::new(&urls[1], service.clone()),
    )
    .with_filter(FilterChooser::new(None, "^nothing matches this$").unwrap())
    .with_config(quick())
    .redrive(&CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(sorted_bodies(&service, &urls[0]), vec!["fresh", "parked"]);
    assert_eq!(service.visible_count(&urls[1]), 0);
    assert!(!service.queue_exists("sqsdr-dlq-fallthrough"));
}

#[tokio::test]
async fn missing_queue_is_reported_by_name() {
    let (service, _) = service_with(&[]);

    let err = match QueueRef::resolve("nope", service.clone()).await {
        Ok(_) => panic!("resolved a queue that does not exist"),
        Err(e) => e,
    };

    assert!(matches!(err, Error::QueueNotFound { .. }));
    assert!(err.to_string().contains("'nope'"));
}

#[tokio::test]
async fn cancelled_redrive_deletes_nothing() {
    let (service, urls) = service_with(&["dlq", "main"]);
    service.push(&urls[0], "stay");
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = Redrive::new(
        QueueRef::new(&urls[0], service.clone()),
        QueueRef::new(&urls[1], service.clone()),
    )
    .with_config(quick())
    .redrive(&cancel)
    .await
    .unwrap_err();

    assert!(err.is_cancelled());
    assert_eq!(service.visible_count(&urls[0]), 1);
    assert!(service.delete_calls().is_empty());
}

#[tokio::test]
async fn create_queue_is_idempotent() {
    let (service, _) = service_with(&[]);

    let first = service.create_queue("sqsdr-x-fallthrough").await.unwrap();
    service.push(&first, "kept");
    let second = service.create_queue("sqsdr-x-fallthrough").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(service.visible_count(&second), 1);
}
