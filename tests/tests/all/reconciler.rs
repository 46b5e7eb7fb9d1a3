use etcd_resolver::{
    bind_store, key_prefix, ResolvedAddress, ResolverError, ResolverHandle, ResolverOptions,
    ServerRecord, WatchEvent,
};
use std::time::Duration;
use tests::{delete_event, put_event, FakeStore, Pushes, RecordingConn};

const RESYNC_INTERVAL: Duration = Duration::from_secs(1);

fn record(host: u8, weight: i64) -> ServerRecord {
    ServerRecord::new("search", format!("10.0.0.{}:9000", host))
        .with_version("v1")
        .with_weight(weight)
}

fn addr(host: u8) -> String {
    format!("10.0.0.{}:9000", host)
}

fn options(resync_interval: Duration) -> ResolverOptions {
    ResolverOptions {
        resync_interval,
        snapshot_timeout: Duration::from_millis(200),
        close_timeout: Duration::from_secs(1),
    }
}

async fn bind_with(
    store: &FakeStore,
    resync_interval: Duration,
) -> (ResolverHandle, RecordingConn, Pushes) {
    tests::init_tracing();
    let (conn, pushes) = RecordingConn::new();
    let handle = bind_store(
        store.clone(),
        key_prefix("search", "v1"),
        conn.clone().into_dyn(),
        options(resync_interval),
    )
    .await
    .expect("failed to bind resolver");
    (handle, conn, pushes)
}

/// Bind with a resync interval long enough to stay out of the way of the test.
async fn bind(store: &FakeStore) -> (ResolverHandle, RecordingConn, Pushes) {
    bind_with(store, Duration::from_secs(3600)).await
}

#[tokio::test]
async fn empty_store_binds_with_a_single_empty_push() {
    let store = FakeStore::new();

    let (_handle, _conn, mut pushes) = bind(&store).await;

    assert_eq!(pushes.next().await, vec![]);
    pushes.assert_none_within(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn bind_reports_the_registered_members() {
    let store = FakeStore::new();
    store.register(&record(1, 5));
    store.register(&record(2, 3));

    let (handle, _conn, mut pushes) = bind(&store).await;

    assert_eq!(handle.prefix(), "/search/v1/");
    assert_eq!(
        pushes.next().await,
        vec![
            ResolvedAddress::new(addr(1), 5),
            ResolvedAddress::new(addr(2), 3),
        ]
    );
}

#[tokio::test]
async fn put_event_adds_the_address() {
    let store = FakeStore::new();
    let (_handle, _conn, mut pushes) = bind(&store).await;
    assert_eq!(pushes.next().await, vec![]);

    store.register(&record(1, 5));

    assert_eq!(pushes.next().await, vec![ResolvedAddress::new(addr(1), 5)]);
    pushes.assert_none_within(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn delete_event_removes_the_address() {
    let store = FakeStore::new();
    store.register(&record(1, 5));
    store.register(&record(2, 5));
    let (_handle, _conn, mut pushes) = bind(&store).await;
    pushes.next().await;

    store.deregister(&record(1, 5));

    assert_eq!(pushes.next_addrs().await, vec![addr(2)]);
}

#[tokio::test]
async fn put_then_delete_in_one_batch_ends_empty() {
    let store = FakeStore::new();
    let (_handle, _conn, mut pushes) = bind(&store).await;
    pushes.next().await;

    store.commit(vec![put_event(&record(1, 5)), delete_event(&record(1, 5))]);

    assert_eq!(pushes.next().await, vec![]);
    pushes.assert_none_within(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn a_batch_is_reported_with_a_single_push() {
    let store = FakeStore::new();
    let (_handle, _conn, mut pushes) = bind(&store).await;
    pushes.next().await;

    store.commit(vec![
        put_event(&record(1, 1)),
        put_event(&record(2, 1)),
        put_event(&record(3, 1)),
    ]);

    assert_eq!(pushes.next_addrs().await, vec![addr(1), addr(2), addr(3)]);
    pushes.assert_none_within(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn batches_that_change_nothing_are_not_reported() {
    let store = FakeStore::new();
    store.register(&record(1, 5));
    let (_handle, _conn, mut pushes) = bind(&store).await;
    pushes.next().await;

    store.deregister(&record(7, 5));
    store.notify(vec![WatchEvent::Put {
        key: format!("/search/v1/{}", addr(8)),
        value: b"garbage".to_vec(),
    }]);
    store.notify(vec![]);
    store.register(&record(2, 5));

    // The first push after the no-op batches is the one for the new member.
    assert_eq!(pushes.next_addrs().await, vec![addr(1), addr(2)]);
}

#[tokio::test]
async fn members_of_other_services_and_versions_are_ignored() {
    let store = FakeStore::new();
    let (_handle, _conn, mut pushes) = bind(&store).await;
    pushes.next().await;

    store.register(&ServerRecord::new("index", addr(1)).with_version("v1"));
    store.register(&ServerRecord::new("search", addr(2)).with_version("v2"));

    pushes.assert_none_within(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn re_registering_an_address_keeps_its_weight_until_the_next_snapshot() {
    let store = FakeStore::new();
    let (handle, _conn, mut pushes) = bind(&store).await;
    pushes.next().await;

    store.register(&record(1, 5));
    assert_eq!(pushes.next().await, vec![ResolvedAddress::new(addr(1), 5)]);

    store.register(&record(1, 9));
    pushes.assert_none_within(Duration::from_millis(50)).await;

    handle.resolve_now();
    assert_eq!(pushes.next().await, vec![ResolvedAddress::new(addr(1), 9)]);
}

#[tokio::test]
async fn resolve_now_reads_back_members_the_watch_missed() {
    let store = FakeStore::new();
    store.register(&record(1, 5));
    let (handle, _conn, mut pushes) = bind(&store).await;
    pushes.next().await;

    store.register_silently(&record(2, 5));
    handle.resolve_now();

    assert_eq!(pushes.next_addrs().await, vec![addr(1), addr(2)]);
}

#[tokio::test]
async fn repeated_snapshots_report_the_same_set() {
    let store = FakeStore::new();
    store.register(&record(1, 5));
    store.register(&record(2, 7));
    let (handle, _conn, mut pushes) = bind(&store).await;
    let first = pushes.next().await;

    handle.resolve_now();
    let second = pushes.next().await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn failed_snapshot_keeps_the_last_known_members() {
    let store = FakeStore::new();
    store.register(&record(1, 5));
    let (handle, _conn, mut pushes) = bind(&store).await;
    assert_eq!(pushes.next_addrs().await, vec![addr(1)]);

    store.fail_reads(true);
    handle.resolve_now();
    pushes.assert_none_within(Duration::from_millis(100)).await;
    assert_eq!(store.reads(), 2);

    // The watch path still builds on the retained set.
    store.register(&record(2, 5));
    assert_eq!(pushes.next_addrs().await, vec![addr(1), addr(2)]);
}

#[tokio::test]
async fn failed_push_does_not_stop_the_resolver() {
    let store = FakeStore::new();
    let (_handle, conn, mut pushes) = bind(&store).await;
    pushes.next().await;

    conn.fail_updates(true);
    store.register(&record(1, 5));
    assert_eq!(pushes.next_addrs().await, vec![addr(1)]);

    conn.fail_updates(false);
    store.register(&record(2, 5));
    assert_eq!(pushes.next_addrs().await, vec![addr(1), addr(2)]);
}

#[tokio::test(start_paused = true)]
async fn periodic_snapshot_replaces_a_stale_set_after_the_watch_stops() {
    let store = FakeStore::new();
    store.register(&record(1, 5));
    store.register(&record(3, 5));
    let (_handle, _conn, mut pushes) = bind_with(&store, RESYNC_INTERVAL).await;
    assert_eq!(pushes.next_addrs().await, vec![addr(1), addr(3)]);

    store.close_watches();
    store.register_silently(&record(2, 5));
    store.deregister_silently(&record(3, 5));

    assert_eq!(pushes.next_addrs().await, vec![addr(1), addr(2)]);
    // The closed watch is reopened on the same tick.
    assert_eq!(store.watches(), 2);
    assert_eq!(store.open_watches(), 1);

    store.register(&record(4, 5));
    assert_eq!(pushes.next_addrs().await, vec![addr(1), addr(2), addr(4)]);
}

#[tokio::test(start_paused = true)]
async fn periodic_snapshot_is_reported_even_when_nothing_changed() {
    let store = FakeStore::new();
    store.register(&record(1, 5));
    let (_handle, _conn, mut pushes) = bind_with(&store, RESYNC_INTERVAL).await;
    let first = pushes.next().await;

    assert_eq!(pushes.next().await, first);
    assert_eq!(pushes.next().await, first);
}

#[tokio::test(start_paused = true)]
async fn periodic_snapshot_failures_are_retried() {
    let store = FakeStore::new();
    store.register(&record(1, 5));
    let (_handle, _conn, mut pushes) = bind_with(&store, RESYNC_INTERVAL).await;
    pushes.next().await;

    store.fail_reads(true);
    pushes
        .assert_none_within(RESYNC_INTERVAL * 3 + RESYNC_INTERVAL / 2)
        .await;
    assert_eq!(store.reads(), 4);

    store.fail_reads(false);
    store.register_silently(&record(2, 5));
    assert_eq!(pushes.next_addrs().await, vec![addr(1), addr(2)]);
}

#[tokio::test(start_paused = true)]
async fn watch_failure_at_bind_is_covered_by_the_periodic_snapshot() {
    let store = FakeStore::new();
    store.fail_watches(true);
    let (_handle, _conn, mut pushes) = bind_with(&store, RESYNC_INTERVAL).await;
    assert_eq!(pushes.next().await, vec![]);

    store.fail_watches(false);
    store.register(&record(1, 5));

    assert_eq!(pushes.next_addrs().await, vec![addr(1)]);
    assert_eq!(store.watches(), 2);
}

#[tokio::test]
async fn failed_initial_snapshot_fails_bind_and_leaves_nothing_running() {
    let store = FakeStore::new();
    store.register(&record(1, 5));
    store.fail_reads(true);
    let (conn, mut pushes) = RecordingConn::new();

    let result = bind_store(
        store.clone(),
        key_prefix("search", "v1"),
        conn.into_dyn(),
        options(RESYNC_INTERVAL),
    )
    .await;

    match result {
        Err(ResolverError::InitialSnapshot { prefix, .. }) => assert_eq!(prefix, "/search/v1/"),
        other => panic!("unexpected bind result: {:?}", other),
    }
    assert_eq!(store.open_watches(), 0);
    pushes.assert_none_within(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn initial_snapshot_is_bounded_in_time() {
    let store = FakeStore::new();
    store.hang_reads(true);
    let (conn, _pushes) = RecordingConn::new();

    let result = bind_store(
        store.clone(),
        key_prefix("search", "v1"),
        conn.into_dyn(),
        options(RESYNC_INTERVAL),
    )
    .await;

    assert!(matches!(result, Err(ResolverError::InitialSnapshot { .. })));
}

#[tokio::test]
async fn failed_first_push_fails_bind() {
    let store = FakeStore::new();
    let (conn, _pushes) = RecordingConn::new();
    conn.fail_updates(true);

    let result = bind_store(
        store.clone(),
        key_prefix("search", "v1"),
        conn.into_dyn(),
        options(RESYNC_INTERVAL),
    )
    .await;

    assert!(matches!(result, Err(ResolverError::InitialSnapshot { .. })));
}

#[tokio::test]
async fn no_pushes_after_close_even_with_buffered_events() {
    let store = FakeStore::new();
    let (handle, _conn, mut pushes) = bind(&store).await;
    assert_eq!(pushes.next().await, vec![]);

    store.register(&record(1, 5));
    store.register(&record(2, 5));
    handle.close().await.expect("failed to close resolver");

    pushes.assert_none_within(Duration::from_millis(50)).await;
    assert_eq!(store.open_watches(), 0);
}

#[tokio::test]
async fn dropping_the_handle_stops_the_resolver() {
    let store = FakeStore::new();
    let (handle, _conn, mut pushes) = bind(&store).await;
    pushes.next().await;

    drop(handle);
    tokio::time::timeout(Duration::from_secs(5), async {
        while store.open_watches() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("resolver kept running after its handle was dropped");

    store.register(&record(1, 5));
    pushes.assert_none_within(Duration::from_millis(50)).await;
}

#[tokio::test(start_paused = true)]
async fn unanswered_watch_does_not_hold_up_the_periodic_snapshot() {
    let store = FakeStore::new();
    let (handle, _conn, mut pushes) = bind_with(&store, RESYNC_INTERVAL).await;
    assert_eq!(pushes.next().await, vec![]);

    store.hang_watches(true);
    store.close_watches();
    store.register_silently(&record(1, 5));

    assert_eq!(pushes.next_addrs().await, vec![addr(1)]);
    assert_eq!(store.reads(), 2);
    assert_eq!(store.open_watches(), 0);

    handle
        .close()
        .await
        .expect("resolver did not stop while its watch was pending");
}

#[tokio::test(start_paused = true)]
async fn bind_completes_when_the_watch_is_never_answered() {
    let store = FakeStore::new();
    store.register(&record(1, 5));
    store.hang_watches(true);

    let (_handle, _conn, mut pushes) = bind_with(&store, RESYNC_INTERVAL).await;

    assert_eq!(pushes.next_addrs().await, vec![addr(1)]);
    store.hang_watches(false);
    store.register_silently(&record(2, 5));
    assert_eq!(pushes.next_addrs().await, vec![addr(1), addr(2)]);
    assert_eq!(store.open_watches(), 1);
}

#[tokio::test]
async fn zero_resync_interval_is_rejected_at_bind() {
    let store = FakeStore::new();
    let (conn, _pushes) = RecordingConn::new();

    let result = bind_store(
        store.clone(),
        key_prefix("search", "v1"),
        conn.into_dyn(),
        options(Duration::ZERO),
    )
    .await;

    assert!(matches!(result, Err(ResolverError::InvalidOptions(_))));
    assert_eq!(store.reads(), 0);
    assert_eq!(store.watches(), 0);
}
