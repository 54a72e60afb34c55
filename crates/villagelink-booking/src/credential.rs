//! # Credential Rotation Service
//!
//! Issues the rotating QR credential for a committed record and keeps it
//! fresh while the passenger has it on screen.
//!
//! ## Rotation
//! ```text
//!  get(record) ──► issue ──► spawn refresher ──┐
//!                                              │ sleep until refresh_at
//!                                              ▼
//!                                     issuer.issue(code, now + window)
//!                                        │                    │
//!                                     success               failure
//!                                        │                    │
//!                              new window, loop      stay NEAR_EXPIRY,
//!                                                    task ends (manual
//!                                                    refresh still works)
//! ```
//!
//! Once a credential has expired, the next `get` issues a fresh one and
//! starts a new refresher.
//!
//! One refresher task exists per tracked credential. `dismiss`, `retire` and
//! `shutdown` abort them; dropping the service aborts whatever is left.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use villagelink_core::{
    Clock, CommittedRecord, Credential, CredentialPhase, CredentialWindow, Presentation,
};

use crate::error::{BookingError, BookingResult};
use crate::services::CredentialIssuer;

struct Entry {
    credential: Credential,
    task: Option<JoinHandle<()>>,
}

impl Entry {
    fn stop(self) {
        if let Some(task) = self.task {
            task.abort();
        }
    }
}

type Entries = Arc<Mutex<HashMap<String, Entry>>>;

fn lock(entries: &Entries) -> MutexGuard<'_, HashMap<String, Entry>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Tracks one live credential per committed record.
pub struct CredentialService {
    issuer: Arc<dyn CredentialIssuer>,
    clock: Arc<dyn Clock>,
    window: CredentialWindow,
    entries: Entries,
}

impl CredentialService {
    pub fn new(
        issuer: Arc<dyn CredentialIssuer>,
        clock: Arc<dyn Clock>,
        window: CredentialWindow,
    ) -> Self {
        CredentialService {
            issuer,
            clock,
            window,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The credential bound to `record`, issuing one if none is tracked or
    /// the tracked one has expired.
    ///
    /// ## Errors
    /// `InvalidCredential` for records in a terminal status.
    pub async fn get(&self, record: &CommittedRecord) -> BookingResult<Credential> {
        if record.is_terminal() {
            return Err(BookingError::InvalidCredential(format!(
                "record {} is {}",
                record.code, record.status
            )));
        }

        let now = self.clock.now();
        let tracked = self.current(&record.id);
        if let Some(existing) = &tracked {
            if !existing.is_expired(now) {
                return Ok(existing.clone());
            }
            debug!(record_id = %record.id, "Tracked credential expired, reissuing");
        }

        let payload = self
            .issuer
            .issue(&record.code, now + self.window.window)
            .await?;
        let credential = match tracked {
            Some(expired) => expired.renewed(payload, now, self.window),
            None => Credential::issue(&record.id, &record.code, payload, now, self.window),
        };

        info!(
            record_id = %record.id,
            expires_at = %credential.expires_at,
            "Credential issued"
        );
        self.install(credential.clone());
        Ok(credential)
    }

    /// Renews a tracked credential immediately, starting a new window.
    pub async fn refresh(&self, record_id: &str) -> BookingResult<Credential> {
        let current = self.current(record_id).ok_or_else(|| {
            BookingError::InvalidCredential(format!("no credential for record {record_id}"))
        })?;

        let now = self.clock.now();
        let payload = self
            .issuer
            .issue(&current.code, now + self.window.window)
            .await?;
        let renewed = current.renewed(payload, now, self.window);

        info!(record_id = %record_id, expires_at = %renewed.expires_at, "Credential refreshed");
        self.install(renewed.clone());
        Ok(renewed)
    }

    pub fn current(&self, record_id: &str) -> Option<Credential> {
        lock(&self.entries)
            .get(record_id)
            .map(|e| e.credential.clone())
    }

    pub fn phase(&self, record_id: &str) -> Option<CredentialPhase> {
        self.current(record_id).map(|c| c.phase(self.clock.now()))
    }

    /// What the display layer may show right now.
    pub fn present(&self, record_id: &str) -> Option<Presentation> {
        self.current(record_id).map(|c| c.present(self.clock.now()))
    }

    /// Stops tracking because the view showing the credential went away.
    pub fn dismiss(&self, record_id: &str) -> bool {
        let removed = lock(&self.entries).remove(record_id);
        match removed {
            Some(entry) => {
                entry.stop();
                debug!(record_id = %record_id, "Credential dismissed");
                true
            }
            None => false,
        }
    }

    /// Stops tracking because the record reached a terminal status.
    pub fn retire(&self, record_id: &str) -> bool {
        let removed = lock(&self.entries).remove(record_id);
        match removed {
            Some(entry) => {
                entry.stop();
                info!(record_id = %record_id, "Credential retired");
                true
            }
            None => false,
        }
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }

    /// Aborts every refresher.
    pub fn shutdown(&self) {
        let drained: Vec<Entry> = lock(&self.entries).drain().map(|(_, e)| e).collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "Stopping credential refreshers");
        }
        for entry in drained {
            entry.stop();
        }
    }

    fn install(&self, credential: Credential) {
        let mut entries = lock(&self.entries);
        let task = self.spawn_refresher(&credential);
        let record_id = credential.record_id.clone();
        if let Some(previous) = entries.insert(
            record_id,
            Entry {
                credential,
                task: Some(task),
            },
        ) {
            previous.stop();
        }
    }

    fn spawn_refresher(&self, credential: &Credential) -> JoinHandle<()> {
        let issuer = Arc::clone(&self.issuer);
        let clock = Arc::clone(&self.clock);
        let entries = Arc::clone(&self.entries);
        let window = self.window;
        let record_id = credential.record_id.clone();
        let mut refresh_at = credential.refresh_at;

        tokio::spawn(async move {
            loop {
                let wait = (refresh_at - clock.now()).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                let tracked = lock(&entries).get(&record_id).map(|e| e.credential.clone());
                let Some(current) = tracked else {
                    return;
                };

                let now = clock.now();
                match issuer.issue(&current.code, now + window.window).await {
                    Ok(payload) => {
                        let renewed = current.renewed(payload, now, window);
                        refresh_at = renewed.refresh_at;
                        let mut guard = lock(&entries);
                        let Some(entry) = guard.get_mut(&record_id) else {
                            return;
                        };
                        debug!(record_id = %record_id, expires_at = %renewed.expires_at, "Credential rotated");
                        entry.credential = renewed;
                    }
                    Err(e) => {
                        warn!(
                            ?e,
                            record_id = %record_id,
                            expires_at = %current.expires_at,
                            "Credential refresh failed, left near expiry"
                        );
                        return;
                    }
                }
            }
        })
    }
}

impl Drop for CredentialService {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TokioClock;
    use crate::services::VerifiedPayload;
    use crate::signing::HmacCredentialIssuer;
    use crate::testkit::{record, TEST_KEY};
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use villagelink_core::{PaymentMethod, RecordKind, RecordStatus};

    /// Issues the first `allowed` payloads, then fails.
    struct FlakyIssuer {
        inner: HmacCredentialIssuer,
        allowed: usize,
        calls: AtomicUsize,
    }

    impl FlakyIssuer {
        fn new(allowed: usize) -> Self {
            FlakyIssuer {
                inner: HmacCredentialIssuer::new(TEST_KEY).unwrap(),
                allowed,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CredentialIssuer for FlakyIssuer {
        async fn issue(&self, code: &str, expires_at: DateTime<Utc>) -> BookingResult<String> {
            if self.calls.fetch_add(1, Ordering::SeqCst) >= self.allowed {
                return Err(BookingError::Collaborator("token source down".into()));
            }
            self.inner.issue(code, expires_at).await
        }

        fn verify(&self, payload: &str) -> BookingResult<VerifiedPayload> {
            self.inner.verify(payload)
        }
    }

    fn service(issuer: Arc<dyn CredentialIssuer>) -> (CredentialService, Arc<TokioClock>) {
        let clock = Arc::new(TokioClock::starting_at(DateTime::<Utc>::default()));
        let service = CredentialService::new(issuer, clock.clone(), CredentialWindow::default());
        (service, clock)
    }

    fn paid_ticket() -> CommittedRecord {
        record(RecordStatus::Paid, RecordKind::Ticket, PaymentMethod::Online)
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_reuses_tracked_credential() {
        let (service, _) = service(Arc::new(FlakyIssuer::new(10)));
        let ticket = paid_ticket();

        let first = service.get(&ticket).await.unwrap();
        let second = service.get(&ticket).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.tracked_ids(), vec![ticket.id.clone()]);
        assert_eq!(service.phase(&ticket.id), Some(CredentialPhase::Issued));
    }

    #[tokio::test]
    async fn test_terminal_records_get_no_credential() {
        let (service, _) = service(Arc::new(FlakyIssuer::new(10)));
        let done = record(RecordStatus::Completed, RecordKind::Pass, PaymentMethod::Online);

        assert!(matches!(
            service.get(&done).await,
            Err(BookingError::InvalidCredential(_))
        ));
        assert!(service.tracked_ids().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotates_at_near_expiry() {
        let (service, _) = service(Arc::new(FlakyIssuer::new(10)));
        let ticket = paid_ticket();
        let issued = service.get(&ticket).await.unwrap();

        tokio::time::sleep(Duration::from_secs(271)).await;

        let rotated = service.current(&ticket.id).unwrap();
        assert!(rotated.refreshed);
        assert_ne!(rotated.payload, issued.payload);
        assert_eq!((rotated.expires_at - issued.issued_at).num_seconds(), 570);
        assert_eq!(service.phase(&ticket.id), Some(CredentialPhase::Active));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_stays_near_expiry_then_expires() {
        let (service, _) = service(Arc::new(FlakyIssuer::new(1)));
        let ticket = paid_ticket();
        service.get(&ticket).await.unwrap();

        tokio::time::sleep(Duration::from_secs(275)).await;
        assert_eq!(service.phase(&ticket.id), Some(CredentialPhase::NearExpiry));
        assert!(matches!(
            service.present(&ticket.id),
            Some(Presentation::Show { .. })
        ));

        tokio::time::sleep(Duration::from_secs(26)).await;
        assert_eq!(service.phase(&ticket.id), Some(CredentialPhase::Expired));
        assert_eq!(
            service.present(&ticket.id),
            Some(Presentation::ExpiredRefreshing)
        );
        assert!(service.refresh(&ticket.id).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_after_expiry_reissues() {
        // First issue works, the automatic rotation fails, later calls work.
        struct SecondCallFails {
            inner: HmacCredentialIssuer,
            calls: AtomicUsize,
        }

        #[async_trait]
        impl CredentialIssuer for SecondCallFails {
            async fn issue(&self, code: &str, expires_at: DateTime<Utc>) -> BookingResult<String> {
                if self.calls.fetch_add(1, Ordering::SeqCst) == 1 {
                    return Err(BookingError::Collaborator("token source down".into()));
                }
                self.inner.issue(code, expires_at).await
            }

            fn verify(&self, payload: &str) -> BookingResult<VerifiedPayload> {
                self.inner.verify(payload)
            }
        }

        let issuer = Arc::new(SecondCallFails {
            inner: HmacCredentialIssuer::new(TEST_KEY).unwrap(),
            calls: AtomicUsize::new(0),
        });
        let (service, _) = service(issuer.clone());
        let ticket = paid_ticket();
        let first = service.get(&ticket).await.unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(service.phase(&ticket.id), Some(CredentialPhase::Expired));
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 2);

        let fresh = service.get(&ticket).await.unwrap();

        assert_eq!(issuer.calls.load(Ordering::SeqCst), 3);
        assert_ne!(fresh.payload, first.payload);
        assert!(matches!(
            service.present(&ticket.id),
            Some(Presentation::Show { .. })
        ));

        // The new refresher is armed again.
        tokio::time::sleep(Duration::from_secs(271)).await;
        assert_eq!(issuer.calls.load(Ordering::SeqCst), 4);
        assert_eq!(service.phase(&ticket.id), Some(CredentialPhase::Active));
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_refresh_recovers() {
        let (service, _) = service(Arc::new(FlakyIssuer::new(10)));
        let ticket = paid_ticket();
        service.get(&ticket).await.unwrap();

        tokio::time::sleep(Duration::from_secs(100)).await;
        let renewed = service.refresh(&ticket.id).await.unwrap();

        assert!(renewed.refreshed);
        assert_eq!(service.current(&ticket.id), Some(renewed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dismiss_stops_refreshing() {
        let issuer = Arc::new(FlakyIssuer::new(10));
        let (service, _) = service(issuer.clone());
        let ticket = paid_ticket();
        service.get(&ticket).await.unwrap();

        assert!(service.dismiss(&ticket.id));
        tokio::time::sleep(Duration::from_secs(600)).await;

        assert_eq!(issuer.calls.load(Ordering::SeqCst), 1);
        assert!(service.current(&ticket.id).is_none());
        assert!(!service.retire(&ticket.id));
    }
}
