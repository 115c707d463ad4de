//! Root module for test modules, so that the tests are built into a single binary.

mod lease;
mod walker;

const fn main() {}

use blob_archiver::{unix_now, Archiver, ArchiverConfig, LockConfig, LockState};
use blob_archiver_beacon_client::test_utils::{StubBeaconClient, ORIGIN_BLOCK};
use blob_archiver_storage::{DataStore, ObjectStorage};
use std::{future::Future, sync::Arc, time::Duration};

type TestArchiver<S = ObjectStorage> = Archiver<Arc<StubBeaconClient>, S>;

/// Short intervals so the loops make progress quickly.
fn test_config() -> ArchiverConfig {
    ArchiverConfig {
        poll_interval: Duration::from_millis(10),
        origin_block: ORIGIN_BLOCK,
        backfill_error_retry_interval: Duration::from_millis(10),
        archiver_id: Some("archiver-test".to_string()),
        lock: LockConfig { retry_interval: Duration::from_millis(10), ..Default::default() },
        ..Default::default()
    }
}

fn archiver<S: DataStore + Clone + 'static>(
    beacon: &Arc<StubBeaconClient>,
    store: &S,
    config: ArchiverConfig,
) -> TestArchiver<S> {
    blob_archiver_tracing::init_test_tracing();
    Archiver::new(Arc::clone(beacon), store.clone(), config)
}

/// Takes the lease for `archiver` without starting the heartbeat.
async fn take_lease<S: DataStore + Clone + 'static>(archiver: &TestArchiver<S>) {
    let state = archiver.lock_coordinator().try_acquire_at(unix_now()).await.unwrap();
    assert_eq!(state, LockState::HeldBySelf);
}

/// Polls `condition` until it holds, failing the test after ten seconds.
async fn wait_until<F, Fut>(mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(Duration::from_secs(10), async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}
