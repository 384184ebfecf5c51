use crate::alert::{AlertDispatcher, AlertError, AlertSink, AlertStats, DeliveryReport, DispatcherConfig};
use crate::config::{ConfigError, EngineConfig};
use chrono::{DateTime, Utc};
use facewatch_core::persist::{self, PersistError, StorePaths};
use facewatch_core::{
    Backend, BackendKind, Decision, Embedding, EnrollmentStore, Matcher, StoreError, Watchlist,
};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("persistence error: {0}")]
    Persist(#[from] PersistError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("alert dispatcher error: {0}")]
    Alert(#[from] AlertError),
}

/// Summary of one enrolled identity.
#[derive(Debug, Clone, Serialize)]
pub struct IdentitySummary {
    pub label: String,
    pub info: Option<String>,
    pub embeddings: usize,
    pub enrolled_at: DateTime<Utc>,
}

/// Point-in-time engine statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub identities: usize,
    pub embeddings: usize,
    pub dimension: Option<usize>,
    pub backend: BackendKind,
    pub index_stale: bool,
    pub index_lists: usize,
    pub watchlist_keywords: usize,
    pub alerts: AlertStats,
}

/// Identification engine: enrollment store + matcher + watchlist + alerts.
///
/// `identify` may be called concurrently. Mutations, and the lazy index
/// rebuild a read may trigger, take the store's write lock.
pub struct Engine {
    store: RwLock<EnrollmentStore>,
    matcher: Matcher,
    watchlist: Arc<Watchlist>,
    alerts: AlertDispatcher,
    paths: StorePaths,
}

impl Engine {
    /// Start with an empty store.
    pub fn new(config: &EngineConfig, sink: Arc<dyn AlertSink>) -> Result<Self, EngineError> {
        let store = EnrollmentStore::new(backend_for(config), config.embedding_dimension);
        Self::with_store(config, store, sink)
    }

    /// Load the persisted store from `config.data_dir` (empty if none yet).
    pub fn open(config: &EngineConfig, sink: Arc<dyn AlertSink>) -> Result<Self, EngineError> {
        let store = persist::load(
            &config.store_paths(),
            backend_for(config),
            config.embedding_dimension,
        )?;
        Self::with_store(config, store, sink)
    }

    /// Wrap an existing store. A configured `embedding_dimension` is pinned
    /// on the store; a store on a different backend than the configuration
    /// asks for is migrated once, here.
    pub fn with_store(
        config: &EngineConfig,
        mut store: EnrollmentStore,
        sink: Arc<dyn AlertSink>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        if let Some(dimension) = config.embedding_dimension {
            store.pin_dimension(dimension)?;
        }

        let store = if store.backend_kind() == config.backend {
            store
        } else {
            store.migrate(backend_for(config))
        };

        let watchlist = Arc::new(config.watchlist());
        let alerts = AlertDispatcher::spawn(
            sink,
            DispatcherConfig {
                destination: config.alert_destination.clone(),
                timeout: config.alert_timeout(),
                queue_capacity: config.alert_queue_capacity,
            },
        )?;

        tracing::info!(
            backend = %store.backend_kind(),
            identities = store.size(),
            detection_threshold = config.detection_threshold,
            recognition_threshold = config.recognition_threshold,
            watchlist = watchlist.keywords().len(),
            "engine ready"
        );

        Ok(Self {
            store: RwLock::new(store),
            matcher: Matcher::new(config.thresholds(), config.top_k),
            watchlist,
            alerts,
            paths: config.store_paths(),
        })
    }

    /// Identify one detected face.
    ///
    /// Never fails. When the matched identity is on the watchlist the
    /// returned decision has `alert` set and an alert is queued; delivery
    /// happens in the background and does not affect the decision.
    pub fn identify(&self, embedding: &Embedding, detection_score: f32) -> Decision {
        // Gate before locking: an undetected face never touches the store.
        if !self.matcher.passes_detection(detection_score) {
            tracing::debug!(detection_score, "below detection threshold");
            return Decision::unknown(detection_score);
        }
        let mut decision = {
            let store = self.fresh_store();
            self.matcher.identify(&store, embedding, detection_score)
        };

        if !decision.matched {
            return decision;
        }
        let keyword = decision
            .label
            .as_deref()
            .and_then(|label| self.watchlist.matching_keyword(label, decision.info.as_deref()))
            .map(str::to_string);

        if let Some(keyword) = keyword {
            decision.alert = true;
            tracing::warn!(
                label = decision.label.as_deref().unwrap_or_default(),
                score = decision.score,
                keyword = %keyword,
                "watchlist match"
            );
            self.alerts.dispatch(&decision, &keyword);
        } else {
            tracing::info!(
                label = decision.label.as_deref().unwrap_or_default(),
                score = decision.score,
                "identified"
            );
        }
        decision
    }

    /// Add one reference embedding under `label`.
    pub fn insert(&self, label: &str, embedding: Embedding) -> Result<(), EngineError> {
        self.store.write().insert(label, embedding)?;
        tracing::info!(label, "embedding enrolled");
        Ok(())
    }

    /// Enroll an identity with several embeddings and optional metadata.
    ///
    /// All-or-nothing: if any embedding is rejected nothing is stored.
    pub fn enroll(
        &self,
        label: &str,
        embeddings: Vec<Embedding>,
        info: Option<String>,
    ) -> Result<(), EngineError> {
        let mut store = self.store.write();
        let Some(first) = embeddings.first() else {
            return Err(StoreError::InvalidEmbedding(format!("no embeddings given for {label}")).into());
        };
        let expected = store.dimension().unwrap_or(first.dimension());
        for embedding in &embeddings {
            store.validate_insert(label, embedding)?;
            if embedding.dimension() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    actual: embedding.dimension(),
                }
                .into());
            }
        }
        for embedding in embeddings {
            store.insert(label, embedding)?;
        }
        if info.is_some() {
            store.set_info(label, info)?;
        }
        tracing::info!(
            label,
            embeddings = store.get(label).map_or(0, |i| i.embeddings.len()),
            "identity enrolled"
        );
        Ok(())
    }

    pub fn set_info(&self, label: &str, info: Option<String>) -> Result<(), EngineError> {
        self.store.write().set_info(label, info)?;
        Ok(())
    }

    /// Remove an identity; unknown labels are a no-op returning `false`.
    pub fn remove(&self, label: &str) -> bool {
        let removed = self.store.write().remove(label);
        if removed {
            tracing::info!(label, "identity removed");
        } else {
            tracing::debug!(label, "remove: no such identity");
        }
        removed
    }

    /// Remove one reference embedding; returns `true` if the identity went with it.
    pub fn remove_embedding(&self, label: &str, index: usize) -> Result<bool, EngineError> {
        let emptied = self.store.write().remove_embedding(label, index)?;
        tracing::info!(label, index, identity_removed = emptied, "embedding removed");
        Ok(emptied)
    }

    /// Rebuild the index now instead of on the next query.
    pub fn rebuild_index(&self) {
        let mut store = self.store.write();
        store.rebuild_index();
    }

    /// Persist the store to the configured data directory.
    pub fn save(&self) -> Result<(), EngineError> {
        let store = self.fresh_store();
        persist::save_snapshot(&store, &self.paths)?;
        Ok(())
    }

    pub fn identities(&self) -> Vec<IdentitySummary> {
        self.store
            .read()
            .identities()
            .map(|i| IdentitySummary {
                label: i.label.clone(),
                info: i.info.clone(),
                embeddings: i.embeddings.len(),
                enrolled_at: i.enrolled_at,
            })
            .collect()
    }

    pub fn stats(&self) -> EngineStats {
        let store = self.store.read();
        let index_lists = match store.backend() {
            Backend::Indexed(ix) => ix.list_count(),
            Backend::Linear(_) => 0,
        };
        EngineStats {
            identities: store.size(),
            embeddings: store.embedding_count(),
            dimension: store.dimension(),
            backend: store.backend_kind(),
            index_stale: store.needs_rebuild(),
            index_lists,
            watchlist_keywords: self.watchlist.keywords().len(),
            alerts: self.alerts.stats(),
        }
    }

    pub fn watchlist(&self) -> &Watchlist {
        &self.watchlist
    }

    /// Delivery reports for alerts dispatched from now on.
    pub fn subscribe_alerts(&self) -> broadcast::Receiver<DeliveryReport> {
        self.alerts.subscribe()
    }

    /// Stop the alert worker after it drains pending deliveries.
    pub fn shutdown(self) -> AlertStats {
        self.alerts.shutdown()
    }

    /// Read access to a store whose index is current. A stale index is
    /// rebuilt under the write lock first, then the guard is downgraded.
    fn fresh_store(&self) -> RwLockReadGuard<'_, EnrollmentStore> {
        let store = self.store.read();
        if !store.needs_rebuild() {
            return store;
        }
        drop(store);

        let mut store = self.store.write();
        // Another writer may have rebuilt while we waited.
        if store.needs_rebuild() {
            tracing::debug!("index stale; rebuilding before query");
            store.rebuild_index();
        }
        RwLockWriteGuard::downgrade(store)
    }
}

fn backend_for(config: &EngineConfig) -> Backend {
    Backend::new(config.backend, config.index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::tests::{FailingSink, RecordingSink, SlowSink};
    use crate::alert::LogSink;
    use facewatch_core::IndexParams;
    use std::time::{Duration, Instant};

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn config() -> EngineConfig {
        EngineConfig {
            data_dir: std::env::temp_dir().join("facewatch-engine-tests-unused"),
            ..EngineConfig::default()
        }
    }

    fn indexed_config() -> EngineConfig {
        EngineConfig {
            backend: BackendKind::Indexed,
            index: IndexParams {
                nlist: 2,
                nprobe: 2,
                ..IndexParams::default()
            },
            ..config()
        }
    }

    fn seeded(engine: &Engine) {
        engine.insert("john_killer_doe", emb(&[1.0, 0.0, 0.0, 0.0])).unwrap();
        engine.insert("jane_smith", emb(&[0.0, 1.0, 0.0, 0.0])).unwrap();
        engine.insert("bob_lee", emb(&[0.0, 0.0, 1.0, 0.0])).unwrap();
    }

    #[test]
    fn test_watchlist_match_raises_alert() {
        let sink = Arc::new(RecordingSink::default());
        let engine = Engine::new(&config(), sink.clone()).unwrap();
        seeded(&engine);

        let decision = engine.identify(&emb(&[0.95, 0.05, 0.0, 0.0]), 0.9);
        assert!(decision.matched);
        assert!(decision.alert);
        assert_eq!(decision.label.as_deref(), Some("john_killer_doe"));

        let stats = engine.shutdown();
        assert_eq!(stats.delivered, 1);
        let events = sink.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].label, "john_killer_doe");
        assert_eq!(events[0].keyword, "killer");
    }

    #[test]
    fn test_unflagged_match_no_alert() {
        let sink = Arc::new(RecordingSink::default());
        let engine = Engine::new(&config(), sink.clone()).unwrap();
        seeded(&engine);

        let decision = engine.identify(&emb(&[0.0, 1.0, 0.1, 0.0]), 0.9);
        assert!(decision.matched);
        assert!(!decision.alert);
        assert_eq!(decision.label.as_deref(), Some("jane_smith"));

        let stats = engine.shutdown();
        assert_eq!(stats.queued, 0);
        assert!(sink.events.lock().is_empty());
    }

    #[test]
    fn test_info_flags_identity() {
        let sink = Arc::new(RecordingSink::default());
        let engine = Engine::new(&config(), sink.clone()).unwrap();
        engine
            .enroll(
                "jane_smith",
                vec![emb(&[0.0, 1.0, 0.0, 0.0])],
                Some("convicted felon".into()),
            )
            .unwrap();

        let decision = engine.identify(&emb(&[0.0, 1.0, 0.0, 0.0]), 0.9);
        assert!(decision.alert);
        assert_eq!(decision.info.as_deref(), Some("convicted felon"));
        engine.shutdown();
        assert_eq!(sink.events.lock()[0].keyword, "felon");
    }

    #[test]
    fn test_detection_gate() {
        let sink = Arc::new(RecordingSink::default());
        let engine = Engine::new(&config(), sink.clone()).unwrap();
        seeded(&engine);

        let decision = engine.identify(&emb(&[1.0, 0.0, 0.0, 0.0]), 0.3);
        assert!(!decision.matched);
        assert!(!decision.alert);
        assert_eq!(decision.label, None);
        assert!((decision.score - 0.3).abs() < 1e-6);

        let decision = engine.identify(&emb(&[1.0, 0.0, 0.0, 0.0]), f32::NAN);
        assert!(!decision.matched);

        assert_eq!(engine.shutdown().queued, 0);
        assert!(sink.events.lock().is_empty());
    }

    #[test]
    fn test_empty_store_never_matches() {
        let engine = Engine::new(&config(), Arc::new(LogSink)).unwrap();
        let decision = engine.identify(&emb(&[1.0, 0.0, 0.0, 0.0]), 0.99);
        assert!(!decision.matched);
        assert_eq!(decision.label, None);
        assert!(decision.top_matches.is_empty());
    }

    #[test]
    fn test_below_recognition_threshold_is_unknown() {
        let engine = Engine::new(&config(), Arc::new(LogSink)).unwrap();
        seeded(&engine);
        let decision = engine.identify(&emb(&[0.0, 0.0, 0.0, 1.0]), 0.9);
        assert!(!decision.matched);
        assert_eq!(decision.label, None);
        assert!(!decision.top_matches.is_empty());
    }

    #[test]
    fn test_failing_sink_does_not_affect_decision() {
        let engine = Engine::new(&config(), Arc::new(FailingSink)).unwrap();
        seeded(&engine);
        let mut reports = engine.subscribe_alerts();

        let decision = engine.identify(&emb(&[1.0, 0.0, 0.0, 0.0]), 0.9);
        assert!(decision.matched);
        assert!(decision.alert);

        let stats = engine.shutdown();
        assert_eq!(stats.failed, 1);
        assert!(matches!(
            reports.try_recv().unwrap(),
            DeliveryReport::Failed { .. }
        ));
    }

    #[test]
    fn test_slow_sink_does_not_block_identify() {
        let config = EngineConfig {
            alert_timeout_ms: 100,
            ..config()
        };
        let sink = Arc::new(SlowSink {
            delay: Duration::from_secs(30),
        });
        let engine = Engine::new(&config, sink).unwrap();
        seeded(&engine);

        let started = Instant::now();
        let decision = engine.identify(&emb(&[1.0, 0.0, 0.0, 0.0]), 0.9);
        assert!(started.elapsed() < Duration::from_millis(250));
        assert!(decision.alert);

        let stats = engine.shutdown();
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let engine = Engine::new(&config(), Arc::new(LogSink)).unwrap();
        seeded(&engine);
        let err = engine.insert("carol", emb(&[1.0, 0.0])).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Store(StoreError::DimensionMismatch {
                expected: 4,
                actual: 2
            })
        ));
        assert_eq!(engine.stats().identities, 3);
    }

    #[test]
    fn test_configured_dimension_enforced() {
        let config = EngineConfig {
            embedding_dimension: Some(3),
            ..config()
        };
        let engine = Engine::new(&config, Arc::new(LogSink)).unwrap();
        assert!(engine.insert("carol", emb(&[1.0, 0.0, 0.0, 0.0])).is_err());
        engine.insert("carol", emb(&[1.0, 0.0, 0.0])).unwrap();
    }

    #[test]
    fn test_enroll_all_or_nothing() {
        let engine = Engine::new(&config(), Arc::new(LogSink)).unwrap();
        seeded(&engine);

        let err = engine.enroll(
            "carol",
            vec![emb(&[0.5, 0.5, 0.0, 0.0]), emb(&[1.0, 0.0])],
            Some("note".into()),
        );
        assert!(err.is_err());
        assert_eq!(engine.stats().identities, 3);
        assert!(engine.identities().iter().all(|i| i.label != "carol"));

        let err = engine.enroll("carol", vec![emb(&[0.5, f32::NAN, 0.0, 0.0])], None);
        assert!(matches!(err, Err(EngineError::Store(StoreError::InvalidEmbedding(_)))));
        assert!(engine.enroll("carol", Vec::new(), None).is_err());

        engine
            .enroll("carol", vec![emb(&[0.5, 0.5, 0.0, 0.0]), emb(&[0.4, 0.6, 0.0, 0.0])], None)
            .unwrap();
        let carol = engine
            .identities()
            .into_iter()
            .find(|i| i.label == "carol")
            .unwrap();
        assert_eq!(carol.embeddings, 2);
    }

    #[test]
    fn test_enroll_batch_fixes_dimension_consistently() {
        let engine = Engine::new(&config(), Arc::new(LogSink)).unwrap();
        let err = engine.enroll("carol", vec![emb(&[1.0, 0.0, 0.0]), emb(&[1.0, 0.0])], None);
        assert!(err.is_err());
        assert_eq!(engine.stats().dimension, None);
    }

    #[test]
    fn test_remove_is_idempotent() {
        let engine = Engine::new(&config(), Arc::new(LogSink)).unwrap();
        seeded(&engine);
        assert!(engine.remove("bob_lee"));
        assert!(!engine.remove("bob_lee"));
        assert!(!engine.remove("nobody"));
        assert_eq!(engine.stats().identities, 2);

        let decision = engine.identify(&emb(&[0.0, 0.0, 1.0, 0.0]), 0.9);
        assert_ne!(decision.label.as_deref(), Some("bob_lee"));
    }

    #[test]
    fn test_remove_embedding() {
        let engine = Engine::new(&config(), Arc::new(LogSink)).unwrap();
        engine
            .enroll("carol", vec![emb(&[1.0, 0.0, 0.0, 0.0]), emb(&[0.0, 1.0, 0.0, 0.0])], None)
            .unwrap();
        assert!(!engine.remove_embedding("carol", 0).unwrap());
        assert!(engine.remove_embedding("carol", 5).is_err());
        assert!(engine.remove_embedding("carol", 0).unwrap());
        assert_eq!(engine.stats().identities, 0);
        assert!(engine.remove_embedding("carol", 0).is_err());
    }

    #[test]
    fn test_indexed_rebuilds_lazily() {
        let engine = Engine::new(&indexed_config(), Arc::new(LogSink)).unwrap();
        seeded(&engine);
        assert!(engine.stats().index_stale);

        let decision = engine.identify(&emb(&[0.0, 0.9, 0.1, 0.0]), 0.9);
        assert_eq!(decision.label.as_deref(), Some("jane_smith"));
        let stats = engine.stats();
        assert!(!stats.index_stale);
        assert!(stats.index_lists > 0);

        engine.insert("dave", emb(&[0.0, 0.0, 0.0, 1.0])).unwrap();
        assert!(engine.stats().index_stale);
        let decision = engine.identify(&emb(&[0.0, 0.0, 0.1, 0.9]), 0.9);
        assert_eq!(decision.label.as_deref(), Some("dave"));

        engine.remove("dave");
        engine.rebuild_index();
        assert!(!engine.stats().index_stale);
    }

    #[test]
    fn test_backends_agree() {
        let linear = Engine::new(&config(), Arc::new(LogSink)).unwrap();
        let indexed = Engine::new(&indexed_config(), Arc::new(LogSink)).unwrap();
        seeded(&linear);
        seeded(&indexed);

        for probe in [
            [0.9, 0.1, 0.0, 0.0],
            [0.1, 0.8, 0.3, 0.0],
            [0.0, 0.2, 0.7, 0.1],
            [0.0, 0.0, 0.0, 1.0],
        ] {
            let a = linear.identify(&emb(&probe), 0.9);
            let b = indexed.identify(&emb(&probe), 0.9);
            assert_eq!(a.label, b.label);
            assert_eq!(a.matched, b.matched);
            assert!((a.score - b.score).abs() < 1e-6);
        }
    }

    #[test]
    fn test_concurrent_identify_and_insert() {
        let engine = Engine::new(&indexed_config(), Arc::new(LogSink)).unwrap();
        seeded(&engine);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..50 {
                        let decision = engine.identify(&emb(&[0.0, 1.0, 0.0, 0.0]), 0.9);
                        assert_eq!(decision.label.as_deref(), Some("jane_smith"));
                    }
                });
            }
            s.spawn(|| {
                for i in 0..20 {
                    let label = format!("visitor_{i}");
                    engine.insert(&label, emb(&[0.0, 0.0, 0.0, 1.0])).unwrap();
                }
            });
        });

        assert_eq!(engine.stats().identities, 23);
    }

    #[test]
    fn test_save_and_open_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            ..indexed_config()
        };

        let engine = Engine::open(&config, Arc::new(LogSink)).unwrap();
        assert_eq!(engine.stats().identities, 0);
        seeded(&engine);
        engine.set_info("bob_lee", Some("visitor".into())).unwrap();
        engine.save().unwrap();
        engine.shutdown();
        assert!(config.store_paths().index.exists());

        let reopened = Engine::open(&config, Arc::new(LogSink)).unwrap();
        let stats = reopened.stats();
        assert_eq!(stats.identities, 3);
        assert_eq!(stats.dimension, Some(4));
        assert!(!stats.index_stale);

        let decision = reopened.identify(&emb(&[0.0, 0.0, 1.0, 0.0]), 0.9);
        assert_eq!(decision.label.as_deref(), Some("bob_lee"));
        assert_eq!(decision.info.as_deref(), Some("visitor"));
    }

    #[test]
    fn test_open_migrates_backend() {
        let dir = tempfile::tempdir().unwrap();
        let linear = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            ..config()
        };
        let engine = Engine::open(&linear, Arc::new(LogSink)).unwrap();
        seeded(&engine);
        engine.save().unwrap();
        engine.shutdown();

        let indexed = EngineConfig {
            data_dir: dir.path().to_path_buf(),
            ..indexed_config()
        };
        let engine = Engine::open(&indexed, Arc::new(LogSink)).unwrap();
        assert_eq!(engine.stats().backend, BackendKind::Indexed);
        let decision = engine.identify(&emb(&[1.0, 0.0, 0.0, 0.0]), 0.9);
        assert_eq!(decision.label.as_deref(), Some("john_killer_doe"));
    }

    #[test]
    fn test_with_store_migrates_and_checks_dimension() {
        let mut store = EnrollmentStore::linear();
        store.insert("carol", emb(&[1.0, 0.0, 0.0])).unwrap();

        let engine = Engine::with_store(&indexed_config(), store.clone(), Arc::new(LogSink)).unwrap();
        assert_eq!(engine.stats().backend, BackendKind::Indexed);
        engine.shutdown();

        let pinned = EngineConfig {
            embedding_dimension: Some(4),
            ..config()
        };
        assert!(matches!(
            Engine::with_store(&pinned, store, Arc::new(LogSink)),
            Err(EngineError::Store(StoreError::DimensionMismatch {
                expected: 3,
                actual: 4
            }))
        ));

        let engine = Engine::with_store(&pinned, EnrollmentStore::linear(), Arc::new(LogSink)).unwrap();
        assert_eq!(engine.stats().dimension, Some(4));
        assert!(matches!(
            engine.insert("carol", emb(&[1.0, 0.0, 0.0])),
            Err(EngineError::Store(StoreError::DimensionMismatch {
                expected: 4,
                actual: 3
            }))
        ));
        engine.insert("carol", emb(&[1.0, 0.0, 0.0, 0.0])).unwrap();
        assert_eq!(engine.stats().dimension, Some(4));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            top_k: 0,
            ..config()
        };
        assert!(matches!(
            Engine::new(&config, Arc::new(LogSink)),
            Err(EngineError::Config(_))
        ));
    }
}
