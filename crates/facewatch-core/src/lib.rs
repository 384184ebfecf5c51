//! facewatch-core — Identity matching over enrolled face embeddings.
//!
//! Holds the enrollment store with its exact (linear) and approximate
//! (IVF-indexed) backends, the threshold-gated matcher, the keyword
//! watchlist, and the on-disk store format.

pub mod matcher;
pub mod persist;
pub mod store;
pub mod types;
pub mod watchlist;

pub use matcher::{Matcher, Thresholds};
pub use persist::{PersistError, StorePaths};
pub use store::{Backend, BackendKind, EnrollmentStore, IndexParams, StoreError};
pub use types::{cosine_similarity, Decision, Embedding, Identity, ScoredLabel};
pub use watchlist::Watchlist;
