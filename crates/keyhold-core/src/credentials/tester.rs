use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info};

use super::store::CredentialStore;
use super::verifiers::VerifierTable;
use crate::error::{Error, Result};
use crate::models::{CredentialRecord, PrincipalId, ServiceType, Verdict};

/// Default bound on a single verification.
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(15);

type Key = (PrincipalId, ServiceType);
type SharedVerdict = Shared<BoxFuture<'static, Verdict>>;

struct Inflight {
    id: u64,
    generation: u64,
    future: SharedVerdict,
}

enum Next {
    Join(u64, SharedVerdict),
    /// A test of an older generation is still running.
    Wait(SharedVerdict),
}

/// Runs connection tests, at most one per (owner, service type) at a time.
pub struct ConnectionTester {
    store: Arc<CredentialStore>,
    verifiers: Arc<VerifierTable>,
    timeout: Duration,
    inflight: Mutex<HashMap<Key, Inflight>>,
    next_id: AtomicU64,
}

impl ConnectionTester {
    pub fn new(store: Arc<CredentialStore>, verifiers: VerifierTable, timeout: Duration) -> Self {
        Self {
            store,
            verifiers: Arc::new(verifiers),
            timeout,
            inflight: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Key, Inflight>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Verify the stored credential and record the outcome on the record.
    ///
    /// A caller arriving while a test of the same record is running joins
    /// it. If the record was re-saved since that test started, the caller
    /// waits for the old test to finish and then tests the new payload.
    pub async fn test(&self, owner: PrincipalId, service_type: &ServiceType) -> Result<Verdict> {
        let key = (owner, service_type.clone());
        loop {
            let (record, generation) = self
                .store
                .snapshot(owner, service_type)
                .ok_or_else(|| Error::NotConfigured(service_type.to_string()))?;

            let next = {
                let mut inflight = self.lock();
                match inflight.get(&key) {
                    Some(running) if running.generation == generation => {
                        debug!(owner = owner, service = %service_type, "Joining running connection test");
                        Next::Join(running.id, running.future.clone())
                    }
                    Some(running) => Next::Wait(running.future.clone()),
                    None => {
                        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                        let future = self.spawn(owner, record, generation);
                        inflight.insert(
                            key.clone(),
                            Inflight {
                                id,
                                generation,
                                future: future.clone(),
                            },
                        );
                        Next::Join(id, future)
                    }
                }
            };

            match next {
                Next::Join(id, future) => return Ok(self.finish(&key, id, future).await),
                Next::Wait(stale) => {
                    stale.await;
                    let mut inflight = self.lock();
                    if inflight
                        .get(&key)
                        .is_some_and(|running| running.generation != generation)
                    {
                        inflight.remove(&key);
                    }
                }
            }
        }
    }

    async fn finish(&self, key: &Key, id: u64, future: SharedVerdict) -> Verdict {
        let verdict = future.await;
        let mut inflight = self.lock();
        if inflight.get(key).is_some_and(|running| running.id == id) {
            inflight.remove(key);
        }
        verdict
    }

    fn spawn(
        &self,
        owner: PrincipalId,
        record: CredentialRecord,
        generation: u64,
    ) -> SharedVerdict {
        let store = Arc::clone(&self.store);
        let verifiers = Arc::clone(&self.verifiers);
        let timeout = self.timeout;

        let handle = tokio::spawn(async move {
            let service_type = record.service_type.clone();
            let verifier = verifiers.get(&service_type);
            let verdict =
                match tokio::time::timeout(timeout, verifier.verify(&service_type, &record.payload)).await {
                    Ok(Ok(message)) => Verdict::success(message),
                    Ok(Err(e)) => Verdict::failed(format!("{:#}", e)),
                    Err(_) => Verdict::failed(format!(
                        "Connection test timed out after {}s",
                        timeout.as_secs()
                    )),
                };

            let applied = store.record_verdict(owner, &service_type, generation, &verdict);
            info!(
                owner = owner,
                service = %service_type,
                status = %verdict.test_status(),
                applied = applied,
                "Connection test finished"
            );
            verdict
        });

        async move {
            handle
                .await
                .unwrap_or_else(|e| Verdict::failed(format!("Connection test aborted: {}", e)))
        }
        .boxed()
        .shared()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::verifiers::Verifier;
    use crate::models::{SecretPayload, TestStatus};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    /// Counts calls and succeeds (or fails) after a delay.
    struct Scripted {
        calls: Arc<AtomicUsize>,
        delay: Duration,
        succeed: bool,
    }

    #[async_trait]
    impl Verifier for Scripted {
        async fn verify(&self, _: &ServiceType, payload: &SecretPayload) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.succeed {
                Ok(format!("ok {}", payload.field("bot_token").unwrap_or_default()))
            } else {
                Err(anyhow::anyhow!("Connection failed: invalid_auth"))
            }
        }
    }

    fn tester(delay: Duration, succeed: bool, timeout: Duration) -> (ConnectionTester, Arc<CredentialStore>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let verifier = Arc::new(Scripted {
            calls: Arc::clone(&calls),
            delay,
            succeed,
        });
        let store = Arc::new(CredentialStore::new());
        let tester = ConnectionTester::new(Arc::clone(&store), VerifierTable::new(verifier), timeout);
        (tester, store, calls)
    }

    fn slack(token: &str) -> SecretPayload {
        SecretPayload::from_value(json!({ "bot_token": token })).unwrap()
    }

    #[tokio::test]
    async fn test_absent_record_is_not_configured() {
        let (tester, _, calls) = tester(Duration::ZERO, true, DEFAULT_TEST_TIMEOUT);
        let err = tester.test(1, &ServiceType::MessagePlatform).await.unwrap_err();

        assert_eq!(err, Error::NotConfigured("slack".into()));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_success_is_recorded() {
        let (tester, store, _) = tester(Duration::ZERO, true, DEFAULT_TEST_TIMEOUT);
        store.save(1, ServiceType::MessagePlatform, slack("a")).unwrap();

        let verdict = tester.test(1, &ServiceType::MessagePlatform).await.unwrap();
        assert!(verdict.is_success());

        let record = store.get(1, &ServiceType::MessagePlatform).unwrap();
        assert_eq!(record.test_status, TestStatus::Success);
        assert_eq!(record.last_tested_at, Some(verdict.tested_at));
        assert_eq!(record.payload, slack("a"));
    }

    #[tokio::test]
    async fn test_failure_keeps_payload() {
        let (tester, store, _) = tester(Duration::ZERO, false, DEFAULT_TEST_TIMEOUT);
        store.save(1, ServiceType::MessagePlatform, slack("bad")).unwrap();

        let verdict = tester.test(1, &ServiceType::MessagePlatform).await.unwrap();
        assert!(!verdict.is_success());
        assert!(verdict.message.contains("invalid_auth"));

        let record = store.get(1, &ServiceType::MessagePlatform).unwrap();
        assert_eq!(record.test_status, TestStatus::Failed);
        assert_eq!(record.payload, slack("bad"));
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let (tester, store, _) = tester(Duration::from_secs(5), true, Duration::from_millis(20));
        store.save(1, ServiceType::MessagePlatform, slack("a")).unwrap();

        let verdict = tester.test(1, &ServiceType::MessagePlatform).await.unwrap();
        assert!(verdict.message.contains("timed out"));
        assert_eq!(
            store.get(1, &ServiceType::MessagePlatform).unwrap().test_status,
            TestStatus::Failed
        );
    }

    #[tokio::test]
    async fn test_concurrent_calls_share_one_verification() {
        let (tester, store, calls) = tester(Duration::from_millis(50), true, DEFAULT_TEST_TIMEOUT);
        store.save(1, ServiceType::MessagePlatform, slack("a")).unwrap();

        let service = ServiceType::MessagePlatform;
        let (a, b) = tokio::join!(tester.test(1, &service), tester.test(1, &service));

        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_save_during_test_wins() {
        let (tester, store, calls) = tester(Duration::from_millis(50), true, DEFAULT_TEST_TIMEOUT);
        let tester = Arc::new(tester);
        store.save(1, ServiceType::MessagePlatform, slack("old")).unwrap();

        let running = {
            let tester = Arc::clone(&tester);
            tokio::spawn(async move { tester.test(1, &ServiceType::MessagePlatform).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        store.save(1, ServiceType::MessagePlatform, slack("new")).unwrap();

        let old = running.await.unwrap().unwrap();
        assert_eq!(old.message, "ok old");
        let record = store.get(1, &ServiceType::MessagePlatform).unwrap();
        assert_eq!(record.test_status, TestStatus::Pending);
        assert_eq!(record.payload, slack("new"));

        let fresh = tester.test(1, &ServiceType::MessagePlatform).await.unwrap();
        assert_eq!(fresh.message, "ok new");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(
            store.get(1, &ServiceType::MessagePlatform).unwrap().test_status,
            TestStatus::Success
        );
    }

    #[tokio::test]
    async fn test_retest_after_completion_runs_again() {
        let (tester, store, calls) = tester(Duration::ZERO, true, DEFAULT_TEST_TIMEOUT);
        store.save(1, ServiceType::MessagePlatform, slack("a")).unwrap();

        tester.test(1, &ServiceType::MessagePlatform).await.unwrap();
        tester.test(1, &ServiceType::MessagePlatform).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
