use facewatch_core::{BackendKind, IndexParams, StorePaths, Thresholds, Watchlist};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_WATCHLIST: [&str; 10] = [
    "murder",
    "murderer",
    "killer",
    "homicide",
    "assassin",
    "terrorist",
    "rapist",
    "kidnapper",
    "abductor",
    "felon",
];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Engine configuration: TOML file, then `FACEWATCH_*` environment overrides.
///
/// Read once when the engine is built; there is no live reload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Minimum detector confidence for a region to be treated as a face.
    pub detection_threshold: f32,
    /// Minimum cosine similarity for a positive identification.
    pub recognition_threshold: f32,
    /// Search backend for the enrollment store.
    pub backend: BackendKind,
    /// Expected embedding size (e.g. 512). Unset: fixed by the first enrollment.
    pub embedding_dimension: Option<usize>,
    /// Ranked candidates reported with each decision.
    pub top_k: usize,
    /// Keyword fragments that flag an identity for alerting.
    pub watchlist: Vec<String>,
    /// Where alerts are addressed (e.g. a phone number).
    pub alert_destination: Option<String>,
    /// Upper bound on a single alert delivery.
    pub alert_timeout_ms: u64,
    /// Pending alerts held before new ones are dropped.
    pub alert_queue_capacity: usize,
    /// Directory holding the persisted enrollment store.
    pub data_dir: PathBuf,
    /// IVF index tuning (indexed backend only).
    pub index: IndexParams,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            detection_threshold: 0.5,
            recognition_threshold: 0.4,
            backend: BackendKind::Linear,
            embedding_dimension: None,
            top_k: 3,
            watchlist: DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
            alert_destination: None,
            alert_timeout_ms: 5_000,
            alert_queue_capacity: 64,
            data_dir: default_data_dir(),
            index: IndexParams::default(),
        }
    }
}

impl EngineConfig {
    /// Load from an optional TOML file, apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `FACEWATCH_*` overrides from `lookup`. Unparsable values are
    /// logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Overrides { lookup };
        env.parse("FACEWATCH_DETECTION_THRESHOLD", &mut self.detection_threshold);
        env.parse("FACEWATCH_RECOGNITION_THRESHOLD", &mut self.recognition_threshold);
        env.parse("FACEWATCH_BACKEND", &mut self.backend);
        env.parse("FACEWATCH_TOP_K", &mut self.top_k);
        env.parse("FACEWATCH_ALERT_TIMEOUT_MS", &mut self.alert_timeout_ms);
        env.parse("FACEWATCH_ALERT_QUEUE_CAPACITY", &mut self.alert_queue_capacity);
        env.parse("FACEWATCH_INDEX_NLIST", &mut self.index.nlist);
        env.parse("FACEWATCH_INDEX_NPROBE", &mut self.index.nprobe);

        if let Some(v) = env.get("FACEWATCH_EMBEDDING_DIMENSION") {
            match v.parse() {
                Ok(d) => self.embedding_dimension = Some(d),
                Err(_) => tracing::warn!(key = "FACEWATCH_EMBEDDING_DIMENSION", value = %v, "ignoring unparsable override"),
            }
        }
        if let Some(v) = env.get("FACEWATCH_WATCHLIST") {
            self.watchlist = v.split(',').map(|s| s.trim().to_string()).collect();
        }
        if let Some(v) = env.get("FACEWATCH_ALERT_DESTINATION") {
            self.alert_destination = Some(v).filter(|s| !s.trim().is_empty());
        }
        if let Some(v) = env.get("FACEWATCH_DATA_DIR") {
            self.data_dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.detection_threshold) {
            return Err(ConfigError::Invalid(format!(
                "detection_threshold {} must be within [0, 1]",
                self.detection_threshold
            )));
        }
        if !(-1.0..=1.0).contains(&self.recognition_threshold) {
            return Err(ConfigError::Invalid(format!(
                "recognition_threshold {} must be within [-1, 1]",
                self.recognition_threshold
            )));
        }
        if self.embedding_dimension == Some(0) {
            return Err(ConfigError::Invalid("embedding_dimension must be positive".into()));
        }
        if self.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be at least 1".into()));
        }
        if self.alert_timeout_ms == 0 {
            return Err(ConfigError::Invalid("alert_timeout_ms must be positive".into()));
        }
        if self.alert_queue_capacity == 0 {
            return Err(ConfigError::Invalid("alert_queue_capacity must be positive".into()));
        }
        if self.index.nprobe == 0 {
            return Err(ConfigError::Invalid("index.nprobe must be at least 1".into()));
        }
        Ok(())
    }

    pub fn thresholds(&self) -> Thresholds {
        Thresholds {
            detection: self.detection_threshold,
            recognition: self.recognition_threshold,
        }
    }

    pub fn watchlist(&self) -> Watchlist {
        Watchlist::new(&self.watchlist)
    }

    pub fn alert_timeout(&self) -> Duration {
        Duration::from_millis(self.alert_timeout_ms)
    }

    pub fn store_paths(&self) -> StorePaths {
        StorePaths::in_dir(&self.data_dir)
    }

    /// Outbox file used by the JSON-lines alert sink.
    pub fn alert_outbox(&self) -> PathBuf {
        self.data_dir.join("alerts.jsonl")
    }
}

struct Overrides<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Overrides<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, slot: &mut T) {
        let Some(v) = self.get(key) else {
            return;
        };
        match v.trim().parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!(key, value = %v, "ignoring unparsable override"),
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facewatch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_match_deployment_parameters() {
        let config = EngineConfig::default();
        assert_eq!(config.detection_threshold, 0.5);
        assert_eq!(config.recognition_threshold, 0.4);
        assert_eq!(config.backend, BackendKind::Linear);
        assert_eq!(config.watchlist.len(), 10);
        assert!(config.watchlist().is_flagged("the_assassin", None));
        config.validate().unwrap();
    }

    #[test]
    fn test_toml_partial_file() {
        let config: EngineConfig = toml::from_str(
            r#"
            recognition_threshold = 0.55
            backend = "indexed"
            embedding_dimension = 512
            watchlist = ["Smuggler"]
            alert_destination = "+15550100"

            [index]
            nprobe = 8
            "#,
        )
        .unwrap();
        assert_eq!(config.recognition_threshold, 0.55);
        assert_eq!(config.detection_threshold, 0.5);
        assert_eq!(config.backend, BackendKind::Indexed);
        assert_eq!(config.embedding_dimension, Some(512));
        assert_eq!(config.index.nprobe, 8);
        assert_eq!(config.index.kmeans_iterations, IndexParams::default().kmeans_iterations);
        assert_eq!(config.watchlist().keywords(), &["smuggler"]);
        assert_eq!(config.alert_destination.as_deref(), Some("+15550100"));
    }

    #[test]
    fn test_toml_rejects_unknown_field() {
        assert!(toml::from_str::<EngineConfig>("use_faiss = true").is_err());
    }

    #[test]
    fn test_from_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.toml");
        assert!(matches!(
            EngineConfig::from_file(&missing),
            Err(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "detection_threshold = \"high\"").unwrap();
        assert!(matches!(EngineConfig::from_file(&bad), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = EngineConfig::default();
        config.apply_overrides(lookup(&[
            ("FACEWATCH_DETECTION_THRESHOLD", "0.7"),
            ("FACEWATCH_BACKEND", "indexed"),
            ("FACEWATCH_EMBEDDING_DIMENSION", "128"),
            ("FACEWATCH_WATCHLIST", "arsonist, Poacher ,"),
            ("FACEWATCH_ALERT_DESTINATION", "ops@example.org"),
            ("FACEWATCH_DATA_DIR", "/var/lib/facewatch"),
            ("FACEWATCH_INDEX_NPROBE", "2"),
        ]));
        assert_eq!(config.detection_threshold, 0.7);
        assert_eq!(config.backend, BackendKind::Indexed);
        assert_eq!(config.embedding_dimension, Some(128));
        assert_eq!(config.watchlist().keywords(), &["arsonist", "poacher"]);
        assert_eq!(config.alert_destination.as_deref(), Some("ops@example.org"));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/facewatch"));
        assert_eq!(config.index.nprobe, 2);
    }

    #[test]
    fn test_env_unparsable_ignored() {
        let mut config = EngineConfig::default();
        config.apply_overrides(lookup(&[
            ("FACEWATCH_RECOGNITION_THRESHOLD", "high"),
            ("FACEWATCH_BACKEND", "faiss-gpu"),
        ]));
        assert_eq!(config.recognition_threshold, 0.4);
        assert_eq!(config.backend, BackendKind::Linear);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let cases: Vec<Box<dyn Fn(&mut EngineConfig)>> = vec![
            Box::new(|c: &mut EngineConfig| c.detection_threshold = 1.5),
            Box::new(|c: &mut EngineConfig| c.detection_threshold = f32::NAN),
            Box::new(|c: &mut EngineConfig| c.recognition_threshold = -1.1),
            Box::new(|c: &mut EngineConfig| c.embedding_dimension = Some(0)),
            Box::new(|c: &mut EngineConfig| c.top_k = 0),
            Box::new(|c: &mut EngineConfig| c.alert_timeout_ms = 0),
            Box::new(|c: &mut EngineConfig| c.alert_queue_capacity = 0),
            Box::new(|c: &mut EngineConfig| c.index.nprobe = 0),
        ];
        for mutate in cases {
            let mut config = EngineConfig::default();
            mutate(&mut config);
            assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        }
    }

    #[test]
    fn test_derived_paths() {
        let config = EngineConfig {
            data_dir: PathBuf::from("/srv/fw"),
            ..EngineConfig::default()
        };
        assert_eq!(config.store_paths().mapping, PathBuf::from("/srv/fw/face_db.json"));
        assert_eq!(config.alert_outbox(), PathBuf::from("/srv/fw/alerts.jsonl"));
        assert_eq!(config.alert_timeout(), Duration::from_secs(5));
    }
}
