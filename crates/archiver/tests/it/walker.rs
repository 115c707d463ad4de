use crate::{archiver, take_lease, test_config, wait_until};
use alloy_primitives::B256;
use assert_matches::assert_matches;
use blob_archiver::ArchiverError;
use blob_archiver_beacon_client::test_utils::{
    blob_sidecars, make_header, StubBeaconClient, FIVE, FOUR, ONE, ORIGIN_BLOCK, START_SLOT, THREE,
    TWO,
};
use blob_archiver_beacon_types::BlockId;
use blob_archiver_storage::{
    test_utils::{HoldPoint, ObjectKind, TestStore},
    BlobData, DataStoreReader, DataStoreWriter, FileStorage, ObjectStorage,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const CHAIN: [B256; 6] = [ORIGIN_BLOCK, ONE, TWO, THREE, FOUR, FIVE];

async fn archived(store: &impl DataStoreReader, roots: &[B256]) -> bool {
    for root in roots {
        if !store.exists(*root).await.unwrap() {
            return false
        }
    }
    true
}

#[tokio::test]
async fn archives_from_head_down_to_origin() {
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    beacon.set_alias(BlockId::Head, THREE);
    let store = ObjectStorage::in_memory(false);
    let archiver = Arc::new(archiver(&beacon, &store, test_config()));

    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&archiver).start(cancel.clone()));

    wait_until(|| async {
        archived(&store, &[ORIGIN_BLOCK, ONE, TWO, THREE]).await &&
            store.read_backfill_processes().await.unwrap().is_empty()
    })
    .await;
    cancel.cancel();
    task.await.unwrap().unwrap();

    assert!(store.read_blob(TWO).await.unwrap().blob_sidecars.data.is_empty());
    assert_eq!(store.read_blob(THREE).await.unwrap().blob_sidecars.data.len(), 4);
    assert_eq!(store.read_blob(ORIGIN_BLOCK).await.unwrap().blob_sidecars.data.len(), 1);
    assert!(!store.exists(FOUR).await.unwrap());
    assert!(!store.exists(FIVE).await.unwrap());
}

#[tokio::test]
async fn archiving_twice_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStorage::open(dir.path()).unwrap();
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let archiver = archiver(&beacon, &store, test_config());
    take_lease(&archiver).await;

    let (header, existed) = archiver.persist_block(BlockId::Root(FOUR), false).await.unwrap();
    assert_eq!(header.root, FOUR);
    assert!(!existed);
    let path = dir.path().join(format!("{FOUR:#x}"));
    let first = std::fs::read(&path).unwrap();
    let index = store.read_backfill_processes().await.unwrap();

    let (_, existed) = archiver.persist_block(BlockId::Root(FOUR), false).await.unwrap();
    assert!(existed);
    assert_eq!(std::fs::read(&path).unwrap(), first);
    assert_eq!(store.read_backfill_processes().await.unwrap(), index);

    // fetching the sidecars is skipped for archived blocks
    let fetched = beacon.sidecar_requests().iter().filter(|id| **id == format!("{FOUR:#x}")).count();
    assert_eq!(fetched, 1);
}

#[tokio::test]
async fn live_walk_leaves_index_alone_when_head_is_known() {
    let store = ObjectStorage::in_memory(false);
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let archiver = archiver(&beacon, &store, test_config());
    take_lease(&archiver).await;

    for root in CHAIN {
        archiver.persist_block(BlockId::Root(root), false).await.unwrap();
    }
    archiver.process_blocks_until_known_block().await.unwrap();
    archiver.process_blocks_until_known_block().await.unwrap();

    assert!(store.read_backfill_processes().await.unwrap().is_empty());
}

#[tokio::test]
async fn backfill_resumes_after_restart() {
    let store = ObjectStorage::in_memory(false);
    let beacon = Arc::new(StubBeaconClient::with_default_chain());

    // first run: archive the head and take one backfill step, then stop
    let first = archiver(&beacon, &store, test_config());
    take_lease(&first).await;
    let (head, _) = first.persist_block(BlockId::Head, false).await.unwrap();
    let process = first.tracker().start_or_resume(first.lease(), head).await.unwrap();
    let process = first.backfill_step(&process).await.unwrap().unwrap();
    assert_eq!(process.current_block.root, FOUR);
    drop(first);

    let persisted = store.read_backfill_processes().await.unwrap();
    assert_eq!(persisted[&FIVE].current_block.root, FOUR);

    // second run picks up at the persisted frontier
    let requests_before = beacon.header_requests().len();
    let second = archiver(&beacon, &store, test_config());
    take_lease(&second).await;
    let processes = second.tracker().processes(second.lease()).await.unwrap();
    let resumed = processes[&FIVE].clone();
    second.run_backfill(resumed, &CancellationToken::new()).await.unwrap();

    assert!(archived(&store, &CHAIN).await);
    assert!(store.read_backfill_processes().await.unwrap().is_empty());
    let requested = &beacon.header_requests()[requests_before..];
    assert!(!requested.contains(&format!("{FIVE:#x}")));
    assert!(!requested.contains(&format!("{FOUR:#x}")));
    assert_eq!(
        requested,
        [THREE, TWO, ONE, ORIGIN_BLOCK].map(|root| format!("{root:#x}")).as_slice()
    );
}

#[tokio::test]
async fn reorg_stops_at_common_ancestor() {
    let store = ObjectStorage::in_memory(false);
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let archiver = archiver(&beacon, &store, test_config());
    take_lease(&archiver).await;
    for root in CHAIN {
        archiver.persist_block(BlockId::Root(root), false).await.unwrap();
    }
    let abandoned = store.read_blob(FIVE).await.unwrap();

    // the chain switches to a branch forking off after THREE
    let fork_four = B256::repeat_byte(0x44);
    let fork_five = B256::repeat_byte(0x55);
    beacon.insert_block(make_header(START_SLOT + 4, fork_four, THREE), blob_sidecars(14, 1));
    beacon.insert_block(make_header(START_SLOT + 5, fork_five, fork_four), blob_sidecars(15, 2));
    beacon.set_alias(BlockId::Head, fork_five);
    let requests_before = beacon.header_requests().len();

    archiver.process_blocks_until_known_block().await.unwrap();

    assert!(archived(&store, &[fork_four, fork_five]).await);
    assert_eq!(store.read_blob(FIVE).await.unwrap(), abandoned);
    let requested = &beacon.header_requests()[requests_before..];
    assert_eq!(
        requested,
        ["head".to_string(), format!("{fork_four:#x}"), format!("{THREE:#x}")].as_slice()
    );
    assert!(store.read_backfill_processes().await.unwrap().is_empty());
}

#[tokio::test]
async fn deep_gap_is_handed_to_backfill() {
    let store = ObjectStorage::in_memory(false);
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let config = blob_archiver::ArchiverConfig { max_live_walk_depth: 2, ..test_config() };
    let archiver = archiver(&beacon, &store, config);
    take_lease(&archiver).await;
    archiver.persist_block(BlockId::Root(ORIGIN_BLOCK), false).await.unwrap();

    archiver.process_blocks_until_known_block().await.unwrap();

    assert!(archived(&store, &[FIVE, FOUR]).await);
    assert!(!store.exists(THREE).await.unwrap());
    let processes = store.read_backfill_processes().await.unwrap();
    assert_eq!(processes.keys().copied().collect::<Vec<_>>(), vec![FOUR]);

    archiver.run_backfill(processes[&FOUR].clone(), &CancellationToken::new()).await.unwrap();
    assert!(archived(&store, &CHAIN).await);
    assert!(store.read_backfill_processes().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_parent_ends_walk_without_origin() {
    let store = ObjectStorage::in_memory(false);
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let config = blob_archiver::ArchiverConfig { origin_block: B256::ZERO, ..test_config() };
    let archiver = archiver(&beacon, &store, config);
    take_lease(&archiver).await;

    let (head, _) = archiver.persist_block(BlockId::Head, false).await.unwrap();
    let process = archiver.tracker().start_or_resume(archiver.lease(), head).await.unwrap();
    archiver.run_backfill(process, &CancellationToken::new()).await.unwrap();

    assert!(archived(&store, &CHAIN).await);
    assert!(store.read_backfill_processes().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_fetch_is_retried() {
    let store = ObjectStorage::in_memory(false);
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let archiver = Arc::new(archiver(&beacon, &store, test_config()));
    take_lease(&archiver).await;
    beacon.fail(BlockId::Root(TWO));

    let (head, _) = archiver.persist_block(BlockId::Head, false).await.unwrap();
    let process = archiver.tracker().start_or_resume(archiver.lease(), head).await.unwrap();
    let task = tokio::spawn({
        let archiver = Arc::clone(&archiver);
        async move { archiver.run_backfill(process, &CancellationToken::new()).await }
    });

    wait_until(|| async {
        let index = store.read_backfill_processes().await.unwrap();
        index.get(&FIVE).is_some_and(|p| p.current_block.root == THREE)
    })
    .await;
    assert!(!store.exists(TWO).await.unwrap());

    beacon.recover(BlockId::Root(TWO));
    task.await.unwrap().unwrap();
    assert!(archived(&store, &CHAIN).await);
}

#[tokio::test]
async fn writes_require_the_lease() {
    let store = ObjectStorage::in_memory(false);
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let archiver = archiver(&beacon, &store, test_config());

    assert_matches!(
        archiver.persist_block(BlockId::Head, false).await,
        Err(ArchiverError::LeaseLost)
    );
    assert_matches!(
        archiver.process_blocks_until_known_block().await,
        Err(ArchiverError::LeaseLost)
    );
    assert!(!store.exists(FIVE).await.unwrap());
}

#[tokio::test]
async fn rearchive_overwrites_slots() {
    let store = ObjectStorage::in_memory(false);
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let archiver = archiver(&beacon, &store, test_config());
    take_lease(&archiver).await;
    store.write_blob(&BlobData::new(ONE, Vec::new())).await.unwrap();

    let last = archiver.rearchive_range(START_SLOT + 1, START_SLOT + 8).await.unwrap();

    assert_eq!(last, START_SLOT + 8);
    assert_eq!(store.read_blob(ONE).await.unwrap().blob_sidecars.data.len(), 2);
    assert!(archived(&store, &[ONE, TWO, THREE, FOUR, FIVE]).await);
    assert!(!store.exists(ORIGIN_BLOCK).await.unwrap());
}

#[tokio::test]
async fn rearchive_reports_failing_slot() {
    let store = ObjectStorage::in_memory(false);
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let archiver = archiver(&beacon, &store, test_config());
    take_lease(&archiver).await;
    beacon.fail(BlockId::Slot(START_SLOT + 3));

    let err = archiver.rearchive_range(START_SLOT, START_SLOT + 5).await.unwrap_err();
    assert_eq!(err.slot, START_SLOT + 3);
    assert_matches!(err.source, ArchiverError::Beacon(_));
    assert!(!store.exists(FOUR).await.unwrap());

    let err = archiver.rearchive_range(5, 4).await.unwrap_err();
    assert_matches!(err.source, ArchiverError::InvalidRange { from: 5, to: 4 });
}

#[tokio::test]
async fn failed_fetch_midway_through_live_walk_leaves_no_gap() {
    let store = ObjectStorage::in_memory(false);
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let archiver = archiver(&beacon, &store, test_config());
    take_lease(&archiver).await;
    for root in [ORIGIN_BLOCK, ONE, TWO] {
        archiver.persist_block(BlockId::Root(root), false).await.unwrap();
    }

    beacon.fail(BlockId::Root(THREE));
    assert_matches!(archiver.process_blocks_until_known_block().await, Err(ArchiverError::Beacon(_)));
    // nothing above the missing block was written, so the next walk goes all the way down again
    assert!(!store.exists(FIVE).await.unwrap());
    assert!(!store.exists(FOUR).await.unwrap());

    beacon.recover(BlockId::Root(THREE));
    archiver.process_blocks_until_known_block().await.unwrap();
    assert!(archived(&store, &CHAIN).await);
    assert!(store.read_backfill_processes().await.unwrap().is_empty());
}

#[tokio::test]
async fn failed_write_midway_through_live_walk_leaves_no_gap() {
    let store = TestStore::new(ObjectStorage::in_memory(false));
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let archiver = archiver(&beacon, &store, test_config());
    take_lease(&archiver).await;
    for root in [ORIGIN_BLOCK, ONE, TWO] {
        archiver.persist_block(BlockId::Root(root), false).await.unwrap();
    }

    store.fail_blob(FOUR);
    assert_matches!(archiver.process_blocks_until_known_block().await, Err(ArchiverError::Storage(_)));
    // blocks are written oldest first
    assert!(store.exists(THREE).await.unwrap());
    assert!(!store.exists(FOUR).await.unwrap());
    assert!(!store.exists(FIVE).await.unwrap());

    store.recover_blob(FOUR);
    archiver.process_blocks_until_known_block().await.unwrap();
    assert!(archived(&store, &CHAIN).await);
}

#[tokio::test]
async fn interrupted_live_walk_leaves_no_gap() {
    let store = TestStore::new(ObjectStorage::in_memory(false));
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let archiver = archiver(&beacon, &store, test_config());
    take_lease(&archiver).await;
    for root in [ORIGIN_BLOCK, ONE, TWO] {
        archiver.persist_block(BlockId::Root(root), false).await.unwrap();
    }

    // stop the walk right after its first write
    let gate = store.hold_next_write(ObjectKind::Blob, HoldPoint::AfterWrite);
    tokio::select! {
        _ = archiver.process_blocks_until_known_block() => panic!("walk was not held"),
        _ = gate.reached() => {}
    }
    assert!(store.exists(THREE).await.unwrap());
    assert!(!store.exists(FIVE).await.unwrap());

    archiver.process_blocks_until_known_block().await.unwrap();
    assert!(archived(&store, &CHAIN).await);
    assert!(store.read_backfill_processes().await.unwrap().is_empty());
}

#[tokio::test]
async fn head_backfill_survives_interrupted_start() {
    let store = TestStore::new(ObjectStorage::in_memory(false));
    let beacon = Arc::new(StubBeaconClient::with_default_chain());
    let first = Arc::new(archiver(&beacon, &store, test_config()));

    // the first run stops before the head reaches the archive
    let gate = store.hold_next_write(ObjectKind::Blob, HoldPoint::BeforeWrite);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(Arc::clone(&first).start(cancel.clone()));
    gate.reached().await;
    task.abort();
    cancel.cancel();
    assert!(task.await.unwrap_err().is_cancelled());
    drop(first);

    assert!(!store.exists(FIVE).await.unwrap());
    let processes = store.read_backfill_processes().await.unwrap();
    assert_eq!(processes.keys().copied().collect::<Vec<_>>(), vec![FIVE]);

    // the next run finds the backfill and archives everything from the head down
    let second = archiver(&beacon, &store, test_config());
    take_lease(&second).await;
    second.run_backfill(processes[&FIVE].clone(), &CancellationToken::new()).await.unwrap();
    assert!(archived(&store, &CHAIN).await);
    assert!(store.read_backfill_processes().await.unwrap().is_empty());
}
