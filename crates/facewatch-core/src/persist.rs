//! On-disk layout of an enrollment store.
//!
//! A store directory holds:
//! - `face_db.json`: the backend-agnostic label → embeddings mapping, enough
//!   to rebuild either backend;
//! - `face_db_index.json` + `face_db_labels.json`: the IVF index and its
//!   ordinal → label table, written only for the indexed backend.
//!
//! A missing, unreadable, or mismatched index artifact is never fatal: the
//! index is rebuilt from the mapping and a warning is logged.

use crate::store::{Backend, EnrollmentStore, IndexArtifact, StoreError};
use crate::types::Identity;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Format version of the mapping file.
pub const MAPPING_FORMAT_VERSION: u32 = 1;

const MAPPING_FILE: &str = "face_db.json";
const INDEX_FILE: &str = "face_db_index.json";
const LABELS_FILE: &str = "face_db_labels.json";

#[derive(Error, Debug)]
pub enum PersistError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{}: malformed store file: {source}", path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{}: unsupported format version {found} (expected {expected})", path.display())]
    UnsupportedVersion {
        path: PathBuf,
        found: u32,
        expected: u32,
    },
    #[error("stored identities are invalid: {0}")]
    Store(#[from] StoreError),
}

/// Serialized label → embeddings mapping.
#[derive(Debug, Serialize, Deserialize)]
struct Mapping {
    format_version: u32,
    dimension: Option<usize>,
    identities: Vec<Identity>,
}

/// File locations for one store directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub mapping: PathBuf,
    pub index: PathBuf,
    pub labels: PathBuf,
}

impl StorePaths {
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            mapping: dir.join(MAPPING_FILE),
            index: dir.join(INDEX_FILE),
            labels: dir.join(LABELS_FILE),
        }
    }
}

/// Write the store. Rebuilds a stale index first so the artifact always
/// matches the mapping.
pub fn save(store: &mut EnrollmentStore, paths: &StorePaths) -> Result<(), PersistError> {
    if store.needs_rebuild() {
        store.rebuild_index();
    }
    save_snapshot(store, paths)
}

/// Write an already-consistent store. A stale index artifact is skipped
/// (and any old one removed) rather than written out of date.
pub fn save_snapshot(store: &EnrollmentStore, paths: &StorePaths) -> Result<(), PersistError> {
    let mapping = Mapping {
        format_version: MAPPING_FORMAT_VERSION,
        dimension: store.dimension(),
        identities: store.identities().cloned().collect(),
    };
    write_json(&paths.mapping, &mapping)?;

    let artifact = match store.backend() {
        Backend::Indexed(ix) => ix.artifact(),
        Backend::Linear(_) => None,
    };
    match artifact {
        Some((artifact, labels)) => {
            write_json(&paths.index, &artifact)?;
            write_json(&paths.labels, &labels)?;
        }
        None => {
            remove_if_exists(&paths.index)?;
            remove_if_exists(&paths.labels)?;
        }
    }

    tracing::info!(
        path = %paths.mapping.display(),
        identities = store.size(),
        embeddings = store.embedding_count(),
        backend = %store.backend_kind(),
        "enrollment store saved"
    );
    Ok(())
}

/// Load a store into `backend`. A missing mapping file yields an empty store.
///
/// `expected_dimension`, when set, must agree with the persisted dimension.
pub fn load(
    paths: &StorePaths,
    backend: Backend,
    expected_dimension: Option<usize>,
) -> Result<EnrollmentStore, PersistError> {
    let mapping: Mapping = match read_json(&paths.mapping) {
        Ok(mapping) => mapping,
        Err(PersistError::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
            tracing::info!(path = %paths.mapping.display(), "no enrollment store yet; starting empty");
            return Ok(EnrollmentStore::new(backend, expected_dimension));
        }
        Err(err) => return Err(err),
    };

    if mapping.format_version != MAPPING_FORMAT_VERSION {
        return Err(PersistError::UnsupportedVersion {
            path: paths.mapping.clone(),
            found: mapping.format_version,
            expected: MAPPING_FORMAT_VERSION,
        });
    }
    if let (Some(expected), Some(actual)) = (expected_dimension, mapping.dimension) {
        if expected != actual {
            return Err(StoreError::DimensionMismatch { expected, actual }.into());
        }
    }

    let dimension = mapping.dimension.or(expected_dimension);
    let mut store = EnrollmentStore::from_identities(backend, dimension, mapping.identities)?;

    if matches!(store.backend(), Backend::Indexed(_)) {
        restore_index(&mut store, paths);
    }

    tracing::info!(
        path = %paths.mapping.display(),
        identities = store.size(),
        embeddings = store.embedding_count(),
        backend = %store.backend_kind(),
        "enrollment store loaded"
    );
    Ok(store)
}

/// Adopt the saved index if it is usable, otherwise rebuild from the mapping.
fn restore_index(store: &mut EnrollmentStore, paths: &StorePaths) {
    let attempt = read_json::<IndexArtifact>(&paths.index)
        .and_then(|artifact| Ok((artifact, read_json::<Vec<String>>(&paths.labels)?)));

    let reason = match attempt {
        Ok((artifact, labels)) => match store.restore_index(artifact, labels) {
            Ok(()) => {
                tracing::debug!(path = %paths.index.display(), "index artifact restored");
                return;
            }
            Err(err) => err.to_string(),
        },
        Err(err) => err.to_string(),
    };

    tracing::warn!(
        path = %paths.index.display(),
        reason = %reason,
        "index artifact unavailable; rebuilding from mapping"
    );
    store.rebuild_index();
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PersistError> {
    let bytes = fs::read(path).map_err(|source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| PersistError::Format {
        path: path.to_path_buf(),
        source,
    })
}

/// Write via a sibling temp file and rename, so readers never see a torn file.
fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PersistError> {
    let io_err = |source: io::Error| PersistError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let bytes = serde_json::to_vec(value).map_err(|source| PersistError::Format {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

fn remove_if_exists(path: &Path) -> Result<(), PersistError> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(PersistError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}
