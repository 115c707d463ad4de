use crate::{archiver, test_config, wait_until};
use assert_matches::assert_matches;
use blob_archiver::{unix_now, ArchiverConfig, ArchiverError, LockConfig, LockState};
use blob_archiver_beacon_client::test_utils::{StubBeaconClient, FIVE};
use blob_archiver_beacon_types::BlockId;
use blob_archiver_storage::{
    test_utils::{HoldPoint, ObjectKind, TestStore},
    DataStoreReader, DataStoreWriter, Lockfile, ObjectStorage,
};
use std::{sync::Arc, time::Duration};
use test_case::test_case;
use tokio_util::sync::CancellationToken;

const T: u64 = 1_700_000_000;

fn with_id(id: &str) -> ArchiverConfig {
    ArchiverConfig { archiver_id: Some(id.to_string()), ..test_config() }
}

#[tokio::test]
async fn only_one_of_two_racing_archivers_writes() {
    // every store operation yields, so the two acquisitions interleave step by step
    let store = TestStore::new(ObjectStorage::in_memory(false)).interleave();
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let a = archiver(&beacon, &store, with_id("a"));
    let b = archiver(&beacon, &store, with_id("b"));

    let mut lock_a = a.lock_coordinator();
    let mut lock_b = b.lock_coordinator();
    let (state_a, state_b) =
        tokio::join!(lock_a.try_acquire_at(T), lock_b.try_acquire_at(T));
    let states = [state_a.unwrap(), state_b.unwrap()];

    assert_eq!(states.iter().filter(|s| **s == LockState::HeldBySelf).count(), 1);
    assert_eq!(states.iter().filter(|s| **s == LockState::HeldByOther).count(), 1);

    let (winner, loser) = if a.lease().is_held() { (&a, &b) } else { (&b, &a) };
    assert_eq!(store.read_lockfile().await.unwrap().archiver_id, winner.archiver_id());
    assert_matches!(loser.persist_block(BlockId::Head, false).await, Err(ArchiverError::LeaseLost));
    assert!(!store.exists(FIVE).await.unwrap());

    winner.persist_block(BlockId::Head, false).await.unwrap();
    assert!(store.exists(FIVE).await.unwrap());
}

#[tokio::test]
async fn displaced_holder_stops_writing_after_heartbeat() {
    let store = TestStore::new(ObjectStorage::in_memory(false));
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let a = archiver(&beacon, &store, with_id("a"));
    let b = archiver(&beacon, &store, with_id("b"));
    let mut lock_a = a.lock_coordinator();
    let mut lock_b = b.lock_coordinator();

    // b has read the empty lockfile but not yet written when a takes the lease
    let gate = store.hold_next_write(ObjectKind::Lockfile, HoldPoint::BeforeWrite);
    let (state_a, state_b) = tokio::join!(
        async {
            gate.reached().await;
            let state = lock_a.try_acquire_at(T).await;
            gate.release();
            state
        },
        lock_b.try_acquire_at(T)
    );

    // both believe they hold the lease until the next heartbeat
    assert_eq!(state_a.unwrap(), LockState::HeldBySelf);
    assert_eq!(state_b.unwrap(), LockState::HeldBySelf);

    assert_eq!(lock_a.heartbeat_at(T + 1).await.unwrap(), LockState::HeldByOther);
    assert_eq!(lock_b.heartbeat_at(T + 1).await.unwrap(), LockState::HeldBySelf);
    assert_matches!(a.persist_block(BlockId::Head, false).await, Err(ArchiverError::LeaseLost));
    b.persist_block(BlockId::Head, false).await.unwrap();
    assert_eq!(store.read_lockfile().await.unwrap().archiver_id, "b");
}

#[test_case(19, LockState::HeldByOther; "fresh")]
#[test_case(20, LockState::HeldBySelf; "at timeout")]
#[test_case(21, LockState::HeldBySelf; "one second past timeout")]
#[tokio::test]
async fn stale_lockfile_is_taken_over(elapsed: u64, expected: LockState) {
    let store = ObjectStorage::in_memory(false);
    store.write_lockfile(&Lockfile::new("someone-else", T)).await.unwrap();
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let archiver = archiver(&beacon, &store, with_id("a"));

    let timeout = LockConfig::default().timeout.as_secs();
    assert_eq!(timeout, 20);
    let state = archiver.lock_coordinator().try_acquire_at(T + elapsed).await.unwrap();

    assert_eq!(state, expected);
    assert_eq!(archiver.lease().is_held(), expected == LockState::HeldBySelf);
}

#[tokio::test]
async fn standby_takes_over_when_holder_stops() {
    let store = ObjectStorage::in_memory(false);
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let lock = LockConfig {
        timeout: Duration::from_secs(2),
        update_interval: Duration::from_millis(500),
        retry_interval: Duration::from_millis(100),
    };
    let active = Arc::new(archiver(&beacon, &store, ArchiverConfig { lock, ..with_id("active") }));
    let standby = Arc::new(archiver(&beacon, &store, ArchiverConfig { lock, ..with_id("standby") }));

    let active_cancel = CancellationToken::new();
    let active_task = tokio::spawn(Arc::clone(&active).start(active_cancel.clone()));
    wait_until(|| async { store.exists(FIVE).await.unwrap() }).await;

    let standby_cancel = CancellationToken::new();
    let standby_task = tokio::spawn(Arc::clone(&standby).start(standby_cancel.clone()));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(active.lease().is_held());
    assert!(!standby.lease().is_held());

    active_cancel.cancel();
    active_task.await.unwrap().unwrap();

    wait_until(|| async { standby.lease().is_held() }).await;
    let lockfile = store.read_lockfile().await.unwrap();
    assert_eq!(lockfile.archiver_id, "standby");
    assert!(unix_now() >= lockfile.timestamp);

    standby_cancel.cancel();
    standby_task.await.unwrap().unwrap();
}
