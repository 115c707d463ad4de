//! Behaviour every [`DataStore`] backend must share.

use assert_matches::assert_matches;
use blob_archiver_beacon_client::test_utils::{
    blob_sidecars, make_header, FIVE, FOUR, ONE, THREE, TWO,
};
use blob_archiver_storage::{
    BackfillProcess, BackfillProcesses, BlobData, DataStore, FileStorage, Lockfile, ObjectStorage,
    StorageError,
};

async fn missing_blob_is_not_found(store: impl DataStore) {
    assert!(!store.exists(ONE).await.unwrap());
    assert_matches!(store.read_blob(ONE).await, Err(StorageError::NotFound(hash)) if hash == ONE);
}

async fn blob_round_trip(store: impl DataStore) {
    let data = BlobData::new(THREE, blob_sidecars(13, 4));
    store.write_blob(&data).await.unwrap();

    assert!(store.exists(THREE).await.unwrap());
    assert!(!store.exists(FOUR).await.unwrap());
    assert_eq!(store.read_blob(THREE).await.unwrap(), data);
}

async fn empty_blob_list_round_trip(store: impl DataStore) {
    let data = BlobData::new(TWO, Vec::new());
    store.write_blob(&data).await.unwrap();

    assert!(store.exists(TWO).await.unwrap());
    assert!(store.read_blob(TWO).await.unwrap().blob_sidecars.data.is_empty());
}

async fn last_write_wins(store: impl DataStore) {
    store.write_blob(&BlobData::new(FIVE, blob_sidecars(15, 1))).await.unwrap();
    let replacement = BlobData::new(FIVE, blob_sidecars(15, 6));
    store.write_blob(&replacement).await.unwrap();

    assert_eq!(store.read_blob(FIVE).await.unwrap(), replacement);
}

async fn absent_index_and_lockfile_are_empty(store: impl DataStore) {
    assert!(store.read_backfill_processes().await.unwrap().is_empty());
    let lockfile = store.read_lockfile().await.unwrap();
    assert!(lockfile.is_empty());
    assert_eq!(lockfile, Lockfile::default());
}

async fn backfill_index_round_trip(store: impl DataStore) {
    let mut process = BackfillProcess::new(make_header(15, FIVE, FOUR));
    process.current_block = make_header(12, TWO, ONE);
    let processes = BackfillProcesses::from([(FIVE, process)]);
    store.write_backfill_processes(&processes).await.unwrap();
    assert_eq!(store.read_backfill_processes().await.unwrap(), processes);

    store.write_backfill_processes(&BackfillProcesses::new()).await.unwrap();
    assert!(store.read_backfill_processes().await.unwrap().is_empty());
}

async fn lockfile_round_trip(store: impl DataStore) {
    let lockfile = Lockfile::new("archiver-a", 1_700_000_000);
    store.write_lockfile(&lockfile).await.unwrap();
    assert_eq!(store.read_lockfile().await.unwrap(), lockfile);

    let taken_over = Lockfile::new("archiver-b", 1_700_000_021);
    store.write_lockfile(&taken_over).await.unwrap();
    assert_eq!(store.read_lockfile().await.unwrap(), taken_over);
}

/// Runs `$check` against a fresh instance of every backend.
macro_rules! backends_test {
    ($($check:ident),* $(,)?) => {
        mod file {
            $(
                #[tokio::test]
                async fn $check() {
                    let dir = tempfile::tempdir().unwrap();
                    super::$check(super::FileStorage::open(dir.path()).unwrap()).await;
                }
            )*
        }

        mod object {
            $(
                #[tokio::test]
                async fn $check() {
                    super::$check(super::ObjectStorage::in_memory(false)).await;
                }
            )*
        }

        mod object_compressed {
            $(
                #[tokio::test]
                async fn $check() {
                    super::$check(super::ObjectStorage::in_memory(true)).await;
                }
            )*
        }
    };
}

backends_test!(
    missing_blob_is_not_found,
    blob_round_trip,
    empty_blob_list_round_trip,
    last_write_wins,
    absent_index_and_lockfile_are_empty,
    backfill_index_round_trip,
    lockfile_round_trip,
);
