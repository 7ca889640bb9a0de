//! Best-effort sync of tracking progress with the account backend.
//!
//! Local storage is always the source of truth for the UI; the backend is a mirror that is
//! pushed to after edits and pulled from once per login. Nothing here ever fails loudly: every
//! network problem ends up as a [`SyncResult::Failed`] or a log line.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::pin::pin;

use depot::Depot;
use futures::future::{Either, select};
use garage_utils::RemoteProgressSnapshot;
use garage_utils::api::{SyncProgressRequest, SyncProgressResponse};
use serde::{Deserialize, Serialize};

use crate::api::ApiError;
use crate::preferences::{GarageLevel, PreferenceStore};
use crate::tracking::TrackingStore;

pub const DEFAULT_SYNC_TIMEOUT_MS: u32 = 15_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct SyncOptions {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u32,
    /// Display names by vehicle key, sent along with the snapshot.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

fn default_timeout_ms() -> u32 {
    DEFAULT_SYNC_TIMEOUT_MS
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_SYNC_TIMEOUT_MS,
            labels: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum SyncResult {
    Pushed,
    /// The backend already has this snapshot.
    Skipped,
    /// Another push was in flight; this snapshot (or a newer one) is sent right after it.
    Coalesced,
    Failed {
        message: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum ReconcileOutcome {
    Merged {
        remote_keys: usize,
    },
    /// Local data was left as it was.
    Failed {
        message: String,
    },
    /// The user logged out or in again while the pull was in flight.
    Stale,
}

/// The account backend, as seen by the sync adapter.
#[allow(async_fn_in_trait)]
pub trait ProgressRemote {
    async fn push(
        &self,
        access_token: &str,
        request: &SyncProgressRequest,
    ) -> Result<SyncProgressResponse, ApiError>;

    async fn pull(&self, access_token: &str) -> Result<RemoteProgressSnapshot, ApiError>;

    /// Resolves after `ms` milliseconds. Used for request timeouts.
    async fn sleep(&self, ms: u32);
}

/// The real backend, over `fetch`.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpProgressRemote;

impl ProgressRemote for HttpProgressRemote {
    async fn push(
        &self,
        access_token: &str,
        request: &SyncProgressRequest,
    ) -> Result<SyncProgressResponse, ApiError> {
        let response = crate::utils::post_to_api("/progress", request, Some(access_token)).await?;
        crate::utils::response_json(response).await
    }

    async fn pull(&self, access_token: &str) -> Result<RemoteProgressSnapshot, ApiError> {
        let response = crate::utils::get_from_api("/progress", Some(access_token)).await?;
        let body = crate::utils::response_text(response).await?;
        if body.trim().is_empty() {
            return Ok(RemoteProgressSnapshot::default());
        }
        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| ApiError::Parse(format!("{e}. Body: {body}")))?;
        Ok(RemoteProgressSnapshot::from_json_lenient(&value))
    }

    async fn sleep(&self, ms: u32) {
        #[cfg(target_arch = "wasm32")]
        crate::utils::sleep_ms(ms).await;
        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = ms;
            futures::future::pending::<()>().await;
        }
    }
}

async fn with_timeout<R: ProgressRemote, T>(
    remote: &R,
    timeout_ms: u32,
    request: impl Future<Output = Result<T, ApiError>>,
) -> Result<T, ApiError> {
    let request = pin!(request);
    let timer = pin!(remote.sleep(timeout_ms));
    match select(request, timer).await {
        Either::Left((result, _)) => result,
        Either::Right(((), _)) => Err(ApiError::Timeout(timeout_ms)),
    }
}

struct PendingPush {
    access_token: String,
    request: SyncProgressRequest,
    hash: u64,
    timeout_ms: u32,
}

#[derive(Default)]
struct PushQueue {
    in_flight: bool,
    /// Latest snapshot submitted while a push was in flight. Newer submissions overwrite it.
    queued: Option<PendingPush>,
    last_pushed_hash: Option<u64>,
}

/// Clears the in-flight flag even if the pushing future is dropped mid-request.
///
/// A snapshot still queued at that point is discarded: whoever pushes next has newer data.
struct InFlight<'a>(&'a RefCell<PushQueue>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        let mut queue = self.0.borrow_mut();
        queue.in_flight = false;
        if queue.queued.take().is_some() {
            log::info!("Dropping queued progress push, its sender went away");
        }
    }
}

pub struct RemoteSync<R> {
    remote: R,
    // never borrowed across an .await
    queue: RefCell<PushQueue>,
    ready: Cell<bool>,
    session: Cell<u64>,
}

impl<R: ProgressRemote> RemoteSync<R> {
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            queue: RefCell::new(PushQueue::default()),
            ready: Cell::new(true),
            session: Cell::new(0),
        }
    }

    /// False while a login reconciliation is running.
    pub fn is_ready(&self) -> bool {
        self.ready.get()
    }

    /// Push `snapshot` to the backend.
    ///
    /// At most one push is in flight. A push requested meanwhile is queued instead (replacing
    /// any snapshot already queued) and answered with [`SyncResult::Coalesced`]; the caller
    /// that owns the in-flight push sends the queued snapshot next and returns the result of
    /// the last push it made.
    pub async fn push_progress(
        &self,
        access_token: &str,
        snapshot: RemoteProgressSnapshot,
        options: SyncOptions,
    ) -> SyncResult {
        if access_token.is_empty() {
            return SyncResult::Failed {
                message: "Not logged in".to_string(),
            };
        }

        let hash = snapshot.content_hash();
        let push = PendingPush {
            access_token: access_token.to_string(),
            request: SyncProgressRequest {
                snapshot,
                labels: options.labels,
            },
            hash,
            timeout_ms: options.timeout_ms,
        };

        {
            let mut queue = self.queue.borrow_mut();
            if queue.in_flight {
                queue.queued = Some(push);
                return SyncResult::Coalesced;
            }
            if queue.last_pushed_hash == Some(hash) {
                log::info!("Progress unchanged since last push, skipping");
                return SyncResult::Skipped;
            }
            queue.in_flight = true;
        }
        let _in_flight = InFlight(&self.queue);

        let mut next = Some(push);
        let mut result = SyncResult::Skipped;
        while let Some(push) = next.take() {
            result = self.send(push).await;
            let mut queue = self.queue.borrow_mut();
            next = queue
                .queued
                .take()
                .filter(|queued| queue.last_pushed_hash != Some(queued.hash));
        }
        result
    }

    async fn send(&self, push: PendingPush) -> SyncResult {
        let PendingPush {
            access_token,
            request,
            hash,
            timeout_ms,
        } = push;

        let response = with_timeout(
            &self.remote,
            timeout_ms,
            self.remote.push(&access_token, &request),
        )
        .await;

        match response {
            Ok(response) if response.success => {
                self.queue.borrow_mut().last_pushed_hash = Some(hash);
                if response.skipped {
                    SyncResult::Skipped
                } else {
                    SyncResult::Pushed
                }
            }
            Ok(response) => {
                let message = response
                    .error
                    .unwrap_or_else(|| "Server rejected the progress update".to_string());
                log::warn!("Progress push rejected: {message}");
                SyncResult::Failed { message }
            }
            Err(e) => {
                log::warn!("Progress push failed: {e}");
                SyncResult::Failed {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Pull the account's progress and merge it into the local store.
    ///
    /// Starts a new session: [`Self::is_ready`] is false until this finishes, whatever the
    /// outcome. If another session starts before the pull returns, the result is discarded.
    pub async fn reconcile_on_login(
        &self,
        depot: &RefCell<Depot>,
        access_token: &str,
        timeout_ms: u32,
    ) -> ReconcileOutcome {
        let session = self.begin_session();
        self.ready.set(false);

        let pulled = with_timeout(&self.remote, timeout_ms, self.remote.pull(access_token)).await;

        if self.session.get() != session {
            log::info!("Discarding progress pulled for an earlier session");
            return ReconcileOutcome::Stale;
        }

        let outcome = match pulled {
            Ok(snapshot) => Self::merge(&mut depot.borrow_mut(), &snapshot),
            Err(e) => {
                log::warn!("Could not pull remote progress, keeping local data: {e}");
                ReconcileOutcome::Failed {
                    message: e.to_string(),
                }
            }
        };
        self.ready.set(true);
        outcome
    }

    fn merge(depot: &mut Depot, snapshot: &RemoteProgressSnapshot) -> ReconcileOutcome {
        let merged = snapshot.reconcile_into(&depot.get_all_car_tracking_data());
        if let Err(e) = depot.replace_all_car_tracking_data(&merged) {
            log::error!("Failed to store reconciled progress: {e}");
            return ReconcileOutcome::Failed {
                message: e.to_string(),
            };
        }

        if let Some(level) = snapshot.garage_level {
            let local = depot.garage_level();
            if local.as_ref().is_none_or(|local| local.level <= level) {
                let garage_level = GarageLevel {
                    level,
                    xp: snapshot
                        .xp
                        .or(local.map(|local| local.xp))
                        .unwrap_or_default(),
                    updated_at: Some(chrono::Utc::now()),
                };
                if let Err(e) = depot.set_garage_level(&garage_level) {
                    log::error!("Failed to store remote garage level: {e}");
                }
            }
        }

        let remote_keys = snapshot.mentioned_keys().len();
        log::info!("Merged remote progress for {remote_keys} vehicles");
        ReconcileOutcome::Merged { remote_keys }
    }

    /// Forget the current session: in-flight pulls are discarded and the next push is sent
    /// even if it matches the last one.
    pub fn end_session(&self) {
        self.begin_session();
        self.ready.set(true);
        let mut queue = self.queue.borrow_mut();
        queue.last_pushed_hash = None;
        queue.queued = None;
    }

    fn begin_session(&self) -> u64 {
        let session = self.session.get().wrapping_add(1);
        self.session.set(session);
        session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;
    use crate::tracking::TRACKING_KEY;
    use depot::{ChangeKind, KeyFilter};
    use garage_utils::TrackingPatch;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::task::Poll;

    /// Yields to the executor once, so joined futures get to interleave.
    async fn yield_now() {
        let mut yielded = false;
        futures::future::poll_fn(|cx| {
            if yielded {
                Poll::Ready(())
            } else {
                yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        })
        .await
    }

    #[derive(Default)]
    struct FakeRemote {
        pushed: RefCell<Vec<SyncProgressRequest>>,
        pull_result: RefCell<Option<Result<RemoteProgressSnapshot, ApiError>>>,
        response: RefCell<Option<SyncProgressResponse>>,
        /// Requests never answer, so only the timer can finish them.
        hang: bool,
        timer_fires: bool,
    }

    impl ProgressRemote for FakeRemote {
        async fn push(
            &self,
            _access_token: &str,
            request: &SyncProgressRequest,
        ) -> Result<SyncProgressResponse, ApiError> {
            if self.hang {
                futures::future::pending::<()>().await;
            }
            yield_now().await;
            self.pushed.borrow_mut().push(request.clone());
            Ok(self
                .response
                .borrow()
                .clone()
                .unwrap_or(SyncProgressResponse {
                    success: true,
                    skipped: false,
                    error: None,
                }))
        }

        async fn pull(&self, _access_token: &str) -> Result<RemoteProgressSnapshot, ApiError> {
            if self.hang {
                futures::future::pending::<()>().await;
            }
            yield_now().await;
            self.pull_result
                .borrow_mut()
                .take()
                .unwrap_or_else(|| Ok(RemoteProgressSnapshot::default()))
        }

        async fn sleep(&self, _ms: u32) {
            if !self.timer_fires {
                futures::future::pending::<()>().await;
            }
        }
    }

    fn snapshot(owned: &[&str]) -> RemoteProgressSnapshot {
        RemoteProgressSnapshot {
            owned_cars: owned.iter().map(|key| key.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn identical_snapshot_is_pushed_once() {
        let sync = RemoteSync::new(FakeRemote::default());
        let first = block_on(sync.push_progress("t", snapshot(&["a::b"]), SyncOptions::default()));
        let second = block_on(sync.push_progress("t", snapshot(&["a::b"]), SyncOptions::default()));

        assert_eq!(first, SyncResult::Pushed);
        assert_eq!(second, SyncResult::Skipped);
        assert_eq!(sync.remote.pushed.borrow().len(), 1);
    }

    #[test]
    fn timeout_becomes_a_failed_result() {
        let sync = RemoteSync::new(FakeRemote {
            hang: true,
            timer_fires: true,
            ..Default::default()
        });
        let result = block_on(sync.push_progress(
            "t",
            snapshot(&["a::b"]),
            SyncOptions {
                timeout_ms: 50,
                ..Default::default()
            },
        ));
        assert_eq!(
            result,
            SyncResult::Failed {
                message: "Timed out after 50 ms".to_string()
            }
        );

        // a failed push is retried next time rather than skipped
        let sync = RemoteSync {
            remote: FakeRemote::default(),
            ..sync
        };
        let retried = block_on(sync.push_progress(
            "t",
            snapshot(&["a::b"]),
            SyncOptions::default(),
        ));
        assert_eq!(retried, SyncResult::Pushed);
    }

    #[test]
    fn rejected_push_reports_the_server_message() {
        let remote = FakeRemote::default();
        *remote.response.borrow_mut() = Some(SyncProgressResponse {
            success: false,
            skipped: false,
            error: Some("quota".to_string()),
        });
        let sync = RemoteSync::new(remote);
        let result = block_on(sync.push_progress("t", snapshot(&["a::b"]), SyncOptions::default()));
        assert_eq!(
            result,
            SyncResult::Failed {
                message: "quota".to_string()
            }
        );
    }

    #[test]
    fn server_side_skip_is_reported() {
        let remote = FakeRemote::default();
        *remote.response.borrow_mut() = Some(SyncProgressResponse {
            success: true,
            skipped: true,
            error: None,
        });
        let sync = RemoteSync::new(remote);
        let result = block_on(sync.push_progress("t", snapshot(&["a::b"]), SyncOptions::default()));
        assert_eq!(result, SyncResult::Skipped);
    }

    #[test]
    fn overlapping_pushes_coalesce_to_the_latest_snapshot() {
        let sync = RemoteSync::new(FakeRemote::default());
        let (first, second, third) = block_on(async {
            futures::join!(
                sync.push_progress("t", snapshot(&["a::one"]), SyncOptions::default()),
                sync.push_progress("t", snapshot(&["a::two"]), SyncOptions::default()),
                sync.push_progress("t", snapshot(&["a::three"]), SyncOptions::default()),
            )
        });

        assert_eq!(first, SyncResult::Pushed);
        assert_eq!(second, SyncResult::Coalesced);
        assert_eq!(third, SyncResult::Coalesced);

        let pushed = sync.remote.pushed.borrow();
        let owned: Vec<_> = pushed
            .iter()
            .map(|request| request.snapshot.owned_cars.clone())
            .collect();
        assert_eq!(owned, vec![vec!["a::one"], vec!["a::three"]]);
    }

    #[test]
    fn abandoned_push_does_not_resend_its_queued_snapshot() {
        let sync = RemoteSync::new(FakeRemote::default());
        let latest = block_on(async {
            let mut owner = Box::pin(sync.push_progress(
                "t",
                snapshot(&["a::old"]),
                SyncOptions::default(),
            ));
            assert!(futures::poll!(owner.as_mut()).is_pending());

            let queued = sync
                .push_progress("t", snapshot(&["b::mid"]), SyncOptions::default())
                .await;
            assert_eq!(queued, SyncResult::Coalesced);
            drop(owner);

            sync.push_progress("t", snapshot(&["c::newest"]), SyncOptions::default())
                .await
        });

        assert_eq!(latest, SyncResult::Pushed);
        let pushed = sync.remote.pushed.borrow();
        let owned: Vec<_> = pushed
            .iter()
            .map(|request| request.snapshot.owned_cars.clone())
            .collect();
        assert_eq!(owned, vec![vec!["c::newest"]]);
    }

    #[test]
    fn missing_token_fails_without_a_request() {
        let sync = RemoteSync::new(FakeRemote::default());
        let result = block_on(sync.push_progress("", snapshot(&["a::b"]), SyncOptions::default()));
        assert!(matches!(result, SyncResult::Failed { .. }));
        assert!(sync.remote.pushed.borrow().is_empty());
    }

    #[test]
    fn login_merges_remote_progress_and_keeps_local_only_cars() {
        let depot = RefCell::new(Depot::in_memory());
        depot
            .borrow_mut()
            .set_car_tracking_data("car::a", &TrackingPatch::owned(true));

        let remote = FakeRemote::default();
        *remote.pull_result.borrow_mut() = Some(Ok(RemoteProgressSnapshot {
            owned_cars: vec!["car::b".into()],
            garage_level: Some(40),
            ..Default::default()
        }));
        let sync = RemoteSync::new(remote);

        let outcome = block_on(sync.reconcile_on_login(&depot, "t", DEFAULT_SYNC_TIMEOUT_MS));
        assert_eq!(outcome, ReconcileOutcome::Merged { remote_keys: 1 });
        assert!(sync.is_ready());

        let depot = depot.borrow();
        assert!(depot.get_car_tracking_data("car::a").owned);
        assert!(depot.get_car_tracking_data("car::b").owned);
        assert_eq!(depot.garage_level().map(|level| level.level), Some(40));
    }

    #[test]
    fn login_merge_replaces_the_stored_map() {
        let depot = RefCell::new(Depot::in_memory());
        let changes = Rc::new(RefCell::new(Vec::new()));
        let sink = changes.clone();
        depot.borrow_mut().register_listener(
            KeyFilter::Exact(TRACKING_KEY.to_string()),
            move |_, change| sink.borrow_mut().push(change.kind),
        );

        let remote = FakeRemote::default();
        *remote.pull_result.borrow_mut() = Some(Ok(snapshot(&["car::b"])));
        let sync = RemoteSync::new(remote);

        let outcome = block_on(sync.reconcile_on_login(&depot, "t", DEFAULT_SYNC_TIMEOUT_MS));
        assert_eq!(outcome, ReconcileOutcome::Merged { remote_keys: 1 });

        let notifications = depot.borrow_mut().drain_due_notifications();
        for notification in notifications {
            notification();
        }
        assert_eq!(*changes.borrow(), vec![ChangeKind::Replaced]);
    }

    #[test]
    fn failed_pull_leaves_local_data_and_still_becomes_ready() {
        let depot = RefCell::new(Depot::in_memory());
        depot
            .borrow_mut()
            .set_car_tracking_data("car::a", &TrackingPatch::stars(2));

        let remote = FakeRemote::default();
        *remote.pull_result.borrow_mut() = Some(Err(ApiError::Request("offline".into())));
        let sync = RemoteSync::new(remote);

        let outcome = block_on(sync.reconcile_on_login(&depot, "t", DEFAULT_SYNC_TIMEOUT_MS));
        assert!(matches!(outcome, ReconcileOutcome::Failed { .. }));
        assert!(sync.is_ready());
        assert_eq!(depot.borrow().get_car_tracking_data("car::a").stars, 2);
    }

    #[test]
    fn not_ready_while_the_pull_is_in_flight() {
        let depot = RefCell::new(Depot::in_memory());
        let sync = RemoteSync::new(FakeRemote::default());

        block_on(async {
            // polled right after the reconciliation first suspends
            let observe = async { sync.is_ready() };
            let (_, ready_mid_pull) = futures::join!(
                sync.reconcile_on_login(&depot, "t", DEFAULT_SYNC_TIMEOUT_MS),
                observe
            );
            assert!(!ready_mid_pull);
        });
        assert!(sync.is_ready());
    }

    #[test]
    fn pull_finishing_after_logout_is_discarded() {
        let depot = RefCell::new(Depot::in_memory());
        let remote = FakeRemote::default();
        *remote.pull_result.borrow_mut() = Some(Ok(snapshot(&["car::b"])));
        let sync = RemoteSync::new(remote);

        let outcome = block_on(async {
            let logout = async { sync.end_session() };
            let (outcome, ()) = futures::join!(
                sync.reconcile_on_login(&depot, "t", DEFAULT_SYNC_TIMEOUT_MS),
                logout
            );
            outcome
        });

        assert_eq!(outcome, ReconcileOutcome::Stale);
        assert!(depot.borrow().get_all_car_tracking_data().is_empty());
    }

    #[test]
    fn ending_the_session_forgets_the_last_push() {
        let sync = RemoteSync::new(FakeRemote::default());
        block_on(sync.push_progress("t", snapshot(&["a::b"]), SyncOptions::default()));
        sync.end_session();
        let again = block_on(sync.push_progress("u", snapshot(&["a::b"]), SyncOptions::default()));
        assert_eq!(again, SyncResult::Pushed);
    }

    #[test]
    fn options_default_the_timeout() {
        let options: SyncOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(options.timeout_ms, DEFAULT_SYNC_TIMEOUT_MS);
    }
}
