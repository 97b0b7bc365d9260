//! Instrument Directory
//!
//! Bidirectional mapping between human-readable symbols (`BTCUSD`) and
//! venue instrument identifiers. Loaded once at startup from a flat JSON
//! object and read concurrently afterwards.
//!
//! Forward and reverse maps are always updated under the same write lock,
//! so `lookup_symbol(lookup_id(s)) == s` holds for every loaded symbol.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;

use parking_lot::RwLock;

/// Venue instrument identifier.
pub type InstrumentId = i64;

/// Errors raised while loading the directory.
#[derive(Debug, thiserror::Error)]
pub enum InstrumentError {
    /// The mapping source does not exist.
    #[error("instrument mapping not found: {0}")]
    NotFound(String),

    /// The mapping source is not a flat `symbol -> id` object.
    #[error("malformed instrument mapping: {0}")]
    Format(#[from] serde_json::Error),

    /// The mapping source could not be read.
    #[error("failed to read instrument mapping {path}: {source}")]
    Io {
        /// Source path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },
}

#[derive(Debug, Default)]
struct Mappings {
    by_symbol: HashMap<String, InstrumentId>,
    by_id: HashMap<InstrumentId, String>,
}

/// Symbol and instrument id lookup table.
#[derive(Debug, Default)]
pub struct InstrumentDirectory {
    mappings: RwLock<Mappings>,
}

impl InstrumentDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load mappings from a JSON file.
    ///
    /// Returns the number of entries read.
    ///
    /// # Errors
    ///
    /// `NotFound` if the file is missing, `Io` if it cannot be read and
    /// `Format` if the contents are not a `symbol -> id` object.
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> Result<usize, InstrumentError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == ErrorKind::NotFound {
                InstrumentError::NotFound(path.display().to_string())
            } else {
                InstrumentError::Io {
                    path: path.display().to_string(),
                    source,
                }
            }
        })?;

        let count = self.load_from_str(&contents)?;
        tracing::info!(path = %path.display(), count, "Instrument mappings loaded");
        Ok(count)
    }

    /// Load mappings from a JSON document such as `{"BTCUSD":1,"ETHUSD":2}`.
    ///
    /// Existing entries for the same symbol or id are replaced.
    ///
    /// # Errors
    ///
    /// Returns `Format` if the document is malformed. Nothing is applied in
    /// that case.
    pub fn load_from_str(&self, json: &str) -> Result<usize, InstrumentError> {
        let parsed: HashMap<String, InstrumentId> = serde_json::from_str(json)?;
        let count = parsed.len();

        let mut mappings = self.mappings.write();
        for (symbol, id) in parsed {
            mappings.insert(symbol, id);
        }
        Ok(count)
    }

    /// Instrument id for a symbol.
    #[must_use]
    pub fn lookup_id(&self, symbol: &str) -> Option<InstrumentId> {
        self.mappings.read().by_symbol.get(symbol).copied()
    }

    /// Symbol for an instrument id.
    #[must_use]
    pub fn lookup_symbol(&self, id: InstrumentId) -> Option<String> {
        self.mappings.read().by_id.get(&id).cloned()
    }

    /// Add or replace a single mapping.
    pub fn add_mapping(&self, symbol: impl Into<String>, id: InstrumentId) {
        self.mappings.write().insert(symbol.into(), id);
    }

    /// Copy of the forward map.
    #[must_use]
    pub fn all_mappings(&self) -> HashMap<String, InstrumentId> {
        self.mappings.read().by_symbol.clone()
    }

    /// Number of symbols.
    #[must_use]
    pub fn len(&self) -> usize {
        self.mappings.read().by_symbol.len()
    }

    /// Whether the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Mappings {
    fn insert(&mut self, symbol: String, id: InstrumentId) {
        // Drop stale pairs on either side so the maps stay inverse.
        if let Some(previous_id) = self.by_symbol.get(&symbol).copied()
            && previous_id != id
        {
            self.by_id.remove(&previous_id);
        }
        if let Some(previous_symbol) = self.by_id.get(&id)
            && *previous_symbol != symbol
        {
            let previous_symbol = previous_symbol.clone();
            self.by_symbol.remove(&previous_symbol);
        }

        self.by_id.insert(id, symbol.clone());
        self.by_symbol.insert(symbol, id);
    }
}
