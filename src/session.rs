//! Ephemeral session state
//!
//! Process-lifetime map from session id to enrolled template. Nothing
//! here is ever written to durable storage; entries carry a mandatory
//! expiry, are swept by a background worker, and zeroize their template
//! when removed. Mutation of a session (budget charges) happens under a
//! per-session lock so concurrent verifications cannot race.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::embedding::NoisedEmbedding;

/// Session store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds a session template stays valid
    pub ttl_secs: u64,
    /// Seconds between background sweeps
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 900,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session not found or expired: {0}")]
    NotFound(String),
}

/// Enrolled session state. The template is the noised embedding captured
/// at enrollment; the raw embedding never reaches this struct.
pub struct SessionTemplate {
    pub session_id: String,
    pub template: NoisedEmbedding,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Epsilon still spendable; never negative. At zero the session is
    /// rejected for further comparisons until re-enrollment.
    pub privacy_budget_remaining: f64,
}

impl SessionTemplate {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

type SharedTemplate = Arc<Mutex<SessionTemplate>>;

/// In-memory session map with per-session locking.
pub struct SessionStore {
    entries: RwLock<HashMap<String, SharedTemplate>>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    pub fn sweep_interval(&self) -> StdDuration {
        StdDuration::from_secs(self.config.sweep_interval_secs.max(1))
    }

    /// Enroll (or re-enroll) a session with a fresh template and budget.
    pub fn create(
        &self,
        session_id: &str,
        template: NoisedEmbedding,
        budget_remaining: f64,
    ) -> SharedTemplate {
        let now = Utc::now();
        let entry = Arc::new(Mutex::new(SessionTemplate {
            session_id: session_id.to_string(),
            template,
            created_at: now,
            expires_at: now + Duration::seconds(self.config.ttl_secs as i64),
            privacy_budget_remaining: budget_remaining,
        }));
        self.entries
            .write()
            .unwrap()
            .insert(session_id.to_string(), Arc::clone(&entry));
        log::info!(
            "session '{}' enrolled, expires in {}s",
            session_id,
            self.config.ttl_secs
        );
        entry
    }

    /// Look up a live session. Expired entries are removed on contact and
    /// reported as missing, independent of sweeper timing.
    pub fn get(&self, session_id: &str) -> Result<SharedTemplate, SessionError> {
        let entry = {
            let entries = self.entries.read().unwrap();
            entries.get(session_id).cloned()
        };

        let entry = entry.ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        let expired = entry.lock().unwrap().is_expired(Utc::now());
        if expired {
            self.entries.write().unwrap().remove(session_id);
            log::info!("session '{}' expired on access", session_id);
            return Err(SessionError::NotFound(session_id.to_string()));
        }

        Ok(entry)
    }

    /// Explicitly close a session, destroying its template.
    pub fn close(&self, session_id: &str) -> bool {
        let removed = self.entries.write().unwrap().remove(session_id).is_some();
        if removed {
            log::info!("session '{}' closed", session_id);
        }
        removed
    }

    /// Remove every expired entry; returns how many were dropped.
    pub fn sweep_once(&self) -> usize {
        let now = Utc::now();
        let expired: Vec<String> = {
            let entries = self.entries.read().unwrap();
            entries
                .iter()
                .filter(|(_, entry)| entry.lock().unwrap().is_expired(now))
                .map(|(id, _)| id.clone())
                .collect()
        };

        if expired.is_empty() {
            return 0;
        }

        let mut entries = self.entries.write().unwrap();
        let mut removed = 0;
        for id in expired {
            if entries.remove(&id).is_some() {
                removed += 1;
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Signal type for stopping the sweeper
#[derive(Debug, Clone, Copy)]
pub struct StopSignal;

/// Background worker that periodically sweeps expired sessions.
pub struct SweepWorker {
    stop_tx: Sender<StopSignal>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl SweepWorker {
    pub fn start(store: Arc<SessionStore>) -> Self {
        let (stop_tx, stop_rx) = bounded::<StopSignal>(1);
        let interval = store.sweep_interval();

        let handle = std::thread::spawn(move || {
            log::info!("session sweeper started (every {:?})", interval);
            loop {
                match stop_rx.recv_timeout(interval) {
                    Ok(StopSignal) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {
                        let removed = store.sweep_once();
                        if removed > 0 {
                            log::info!("session sweeper removed {} expired entries", removed);
                        }
                    }
                }
            }
            log::info!("session sweeper stopped");
        });

        Self {
            stop_tx,
            handle: Some(handle),
        }
    }

    /// Stop the sweeper gracefully.
    pub fn stop(mut self) {
        let _ = self.stop_tx.try_send(StopSignal);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SweepWorker {
    fn drop(&mut self) {
        let _ = self.stop_tx.try_send(StopSignal);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn template(dim: usize) -> NoisedEmbedding {
        NoisedEmbedding::new(vec![0.5; dim])
    }

    #[test]
    fn create_then_get_roundtrip() {
        let store = SessionStore::new(SessionConfig::default());
        store.create("alice", template(8), 10.0);
        let entry = store.get("alice").unwrap();
        let locked = entry.lock().unwrap();
        assert_eq!(locked.session_id, "alice");
        assert_eq!(locked.privacy_budget_remaining, 10.0);
        assert!(locked.expires_at > locked.created_at);
    }

    #[test]
    fn unknown_session_is_not_found() {
        let store = SessionStore::new(SessionConfig::default());
        assert!(matches!(
            store.get("nobody"),
            Err(SessionError::NotFound(_))
        ));
    }

    #[test]
    fn expired_session_is_rejected_on_access() {
        let store = SessionStore::new(SessionConfig {
            ttl_secs: 0,
            sweep_interval_secs: 60,
        });
        store.create("bob", template(8), 10.0);
        std::thread::sleep(StdDuration::from_millis(5));
        assert!(matches!(store.get("bob"), Err(SessionError::NotFound(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn sweep_removes_only_expired_entries() {
        let store = SessionStore::new(SessionConfig {
            ttl_secs: 0,
            sweep_interval_secs: 60,
        });
        store.create("old", template(8), 10.0);
        std::thread::sleep(StdDuration::from_millis(5));

        let fresh_store = SessionStore::new(SessionConfig::default());
        fresh_store.create("fresh", template(8), 10.0);

        assert_eq!(store.sweep_once(), 1);
        assert_eq!(fresh_store.sweep_once(), 0);
        assert_eq!(fresh_store.len(), 1);
    }

    #[test]
    fn close_destroys_the_session() {
        let store = SessionStore::new(SessionConfig::default());
        store.create("carol", template(8), 10.0);
        assert!(store.close("carol"));
        assert!(!store.close("carol"));
        assert!(store.get("carol").is_err());
    }

    #[test]
    fn re_enrollment_replaces_the_template() {
        let store = SessionStore::new(SessionConfig::default());
        store.create("dave", template(8), 2.0);
        {
            let entry = store.get("dave").unwrap();
            entry.lock().unwrap().privacy_budget_remaining = 0.0;
        }
        store.create("dave", template(8), 10.0);
        let entry = store.get("dave").unwrap();
        assert_eq!(entry.lock().unwrap().privacy_budget_remaining, 10.0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn budget_mutation_is_serialized_per_session() {
        let store = Arc::new(SessionStore::new(SessionConfig::default()));
        store.create("eve", template(8), 100.0);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for _ in 0..10 {
                    let entry = store.get("eve").unwrap();
                    let mut locked = entry.lock().unwrap();
                    locked.privacy_budget_remaining -= 1.0;
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let entry = store.get("eve").unwrap();
        assert_eq!(entry.lock().unwrap().privacy_budget_remaining, 20.0);
    }

    #[test]
    fn sweeper_worker_stops_cleanly() {
        let store = Arc::new(SessionStore::new(SessionConfig {
            ttl_secs: 0,
            sweep_interval_secs: 1,
        }));
        let worker = SweepWorker::start(Arc::clone(&store));
        store.create("fading", template(8), 10.0);
        worker.stop();
    }
}
