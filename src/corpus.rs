//! Fortune corpus: a newline-delimited text file loaded once into memory.

use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use rand::Rng;
use tracing::{error, info};

use crate::error::CorpusError;

/// Shown when the corpus file does not exist.
pub const MISSING_FALLBACK: &str = "Looks like the cookie is empty... 🍪";

/// Shown when the corpus file exists but cannot be used.
pub const UNREADABLE_FALLBACK: &str = "Could not load fortunes. Try again later!";

/// Lazily loaded, immutable list of fortunes.
///
/// The first call to [`CorpusStore::load`] reads the file; every later call
/// (from any thread) observes the same entries. A load failure is logged and
/// replaced with a single fallback entry, so the corpus is never empty.
pub struct CorpusStore {
    path: PathBuf,
    entries: OnceLock<Arc<[String]>>,
}

impl CorpusStore {
    /// Create a store backed by `path`. Nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            entries: OnceLock::new(),
        }
    }

    /// Create an already-loaded store from in-memory entries.
    ///
    /// Blank entries are dropped the same way blank lines are; an empty
    /// result falls back to [`UNREADABLE_FALLBACK`].
    pub fn from_entries<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entries: Vec<String> = entries
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let entries = if entries.is_empty() {
            vec![UNREADABLE_FALLBACK.to_string()]
        } else {
            entries
        };

        let store = Self::new("<memory>");
        let _ = store.entries.set(entries.into());
        store
    }

    /// Load the corpus, reading the file at most once per store.
    pub fn load(&self) -> Arc<[String]> {
        Arc::clone(self.entries.get_or_init(|| {
            match read_entries(&self.path) {
                Ok(entries) => {
                    info!(path = %self.path.display(), count = entries.len(), "Loaded fortunes");
                    entries.into()
                }
                Err(e) => {
                    error!(error = %e, "Falling back to placeholder fortune");
                    let fallback = match e {
                        CorpusError::NotFound { .. } => MISSING_FALLBACK,
                        _ => UNREADABLE_FALLBACK,
                    };
                    vec![fallback.to_string()].into()
                }
            }
        }))
    }

    /// Number of entries. Always at least one.
    pub fn len(&self) -> usize {
        self.load().len()
    }

    /// Never true; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.load().is_empty()
    }

    /// Uniformly pick one entry using the thread-local RNG.
    pub fn random_entry(&self) -> String {
        self.random_entry_with(&mut rand::thread_rng())
    }

    /// Uniformly pick one entry using the given RNG.
    pub fn random_entry_with<R: Rng + ?Sized>(&self, rng: &mut R) -> String {
        let entries = self.load();
        let idx = rng.gen_range(0..entries.len());
        entries[idx].clone()
    }

    /// Look up an entry by its 1-based position.
    pub fn entry_at(&self, index: i64) -> Result<String, CorpusError> {
        let entries = self.load();
        let len = entries.len();
        usize::try_from(index)
            .ok()
            .filter(|i| (1..=len).contains(i))
            .map(|i| entries[i - 1].clone())
            .ok_or(CorpusError::IndexOutOfRange { index, len })
    }
}

/// Read non-blank, trimmed lines from the corpus file.
fn read_entries(path: &Path) -> Result<Vec<String>, CorpusError> {
    if !path.exists() {
        return Err(CorpusError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let raw = std::fs::read_to_string(path).map_err(|source| CorpusError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;

    let entries: Vec<String> = raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();

    if entries.is_empty() {
        return Err(CorpusError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok(entries)
}
