//! Need filtering against an external progress store.
//!
//! A spot is suppressed only when the store confirms its entity is already
//! complete on its band. Unresolved entities, unknown bands and store
//! failures all let the spot through.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use crate::band::Band;
use crate::spot::ResolvedSpot;

/// Errors a progress store can report.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Progress store unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to read progress file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid progress file: {0}")]
    Format(#[from] serde_json::Error),

    #[error("Unknown band '{band}' for {entity}")]
    UnknownBand { entity: String, band: String },
}

/// Read-only view of which (entity, band) pairs are already confirmed.
///
/// The band arrives as the typed [`Band`] rather than its label. A store
/// keyed by label strings looks it up with [`Band::as_str`], the same label
/// spot events carry.
pub trait ProgressStore {
    /// Whether `entity` is already confirmed on `band`.
    fn is_complete(&self, entity: &str, band: Band) -> Result<bool, StoreError>;
}

impl<S: ProgressStore + ?Sized> ProgressStore for &S {
    fn is_complete(&self, entity: &str, band: Band) -> Result<bool, StoreError> {
        (**self).is_complete(entity, band)
    }
}

impl<S: ProgressStore + ?Sized> ProgressStore for std::sync::Arc<S> {
    fn is_complete(&self, entity: &str, band: Band) -> Result<bool, StoreError> {
        (**self).is_complete(entity, band)
    }
}

/// In-memory progress store.
///
/// Loads from a JSON object mapping entity names to band labels:
///
/// ```json
/// { "SLOVAK REPUBLIC": ["20", "40m"], "YEMEN": [] }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryProgress {
    complete: HashSet<(String, Band)>,
}

impl MemoryProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an entity as confirmed on a band.
    pub fn mark_complete(&mut self, entity: &str, band: Band) {
        if band.is_known() {
            self.complete.insert((entity.trim().to_ascii_uppercase(), band));
        }
    }

    /// Parse the JSON progress format.
    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        let raw: HashMap<String, Vec<String>> = serde_json::from_str(text)?;
        let mut store = Self::new();
        for (entity, bands) in raw {
            for label in bands {
                let band = Band::from_label(&label).ok_or_else(|| StoreError::UnknownBand {
                    entity: entity.clone(),
                    band: label.clone(),
                })?;
                store.mark_complete(&entity, band);
            }
        }
        Ok(store)
    }

    /// Load the JSON progress format from a file.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn len(&self) -> usize {
        self.complete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.complete.is_empty()
    }
}

impl ProgressStore for MemoryProgress {
    fn is_complete(&self, entity: &str, band: Band) -> Result<bool, StoreError> {
        Ok(self
            .complete
            .contains(&(entity.trim().to_ascii_uppercase(), band)))
    }
}

/// Decides whether a resolved spot is still needed.
#[derive(Debug, Clone)]
pub struct NeedFilter<S> {
    store: S,
}

impl<S: ProgressStore> NeedFilter<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Whether `(entity, band)` should be shown.
    ///
    /// Fails open: only a confirmed "complete" from the store hides a spot.
    pub fn is_needed(&self, entity: &str, band: Band) -> bool {
        if entity.is_empty() || !band.is_known() {
            return true;
        }
        match self.store.is_complete(entity, band) {
            Ok(complete) => !complete,
            Err(e) => {
                warn!("Progress lookup for {} on {}m failed: {}", entity, band, e);
                true
            }
        }
    }

    /// Pass a spot through, or drop it if already complete.
    pub fn filter(&self, spot: ResolvedSpot) -> Option<ResolvedSpot> {
        if self.is_needed(&spot.entity, spot.band()) {
            Some(spot)
        } else {
            debug!(
                "Suppressed {} ({} on {}m already confirmed)",
                spot.dx_call(),
                spot.entity,
                spot.band()
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spot::SpotRecord;
    use std::cell::Cell;

    /// Store that always answers the same way and counts queries.
    struct FixedStore {
        answer: Result<bool, ()>,
        queries: Cell<usize>,
    }

    impl FixedStore {
        fn new(answer: Result<bool, ()>) -> Self {
            Self {
                answer,
                queries: Cell::new(0),
            }
        }
    }

    impl ProgressStore for FixedStore {
        fn is_complete(&self, _entity: &str, _band: Band) -> Result<bool, StoreError> {
            self.queries.set(self.queries.get() + 1);
            self.answer
                .map_err(|_| StoreError::Unavailable("database locked".to_string()))
        }
    }

    fn make_spot(freq: f64, entity: Option<&str>) -> ResolvedSpot {
        SpotRecord {
            spotter: "OG3Z".to_string(),
            frequency_khz: freq,
            frequency_text: freq.to_string(),
            dx_call: "OM5AY".to_string(),
            message: String::new(),
            time_utc: "1234".to_string(),
        }
        .classify()
        .resolve(entity.map(str::to_string))
    }

    /// Store keyed by (entity, band label) strings.
    struct LabelStore(std::collections::HashSet<(String, String)>);

    impl ProgressStore for LabelStore {
        fn is_complete(&self, entity: &str, band: Band) -> Result<bool, StoreError> {
            Ok(self.0.contains(&(entity.to_string(), band.as_str().to_string())))
        }
    }

    #[test]
    fn test_label_keyed_store() {
        let store = LabelStore(
            [("SLOVAK REPUBLIC".to_string(), "20".to_string())]
                .into_iter()
                .collect(),
        );
        let filter = NeedFilter::new(store);
        let spot = make_spot(14074.0, Some("SLOVAK REPUBLIC"));
        assert_eq!(spot.event().band.as_str(), "20");
        assert!(filter.filter(spot).is_none());
        assert!(filter.filter(make_spot(7074.0, Some("SLOVAK REPUBLIC"))).is_some());
    }

    #[test]
    fn test_emit_when_not_complete() {
        let filter = NeedFilter::new(FixedStore::new(Ok(false)));
        assert!(filter.filter(make_spot(14074.0, Some("SLOVAK REPUBLIC"))).is_some());
    }

    #[test]
    fn test_suppress_when_complete() {
        let filter = NeedFilter::new(FixedStore::new(Ok(true)));
        assert!(filter.filter(make_spot(14074.0, Some("SLOVAK REPUBLIC"))).is_none());
    }

    #[test]
    fn test_unresolved_always_emitted() {
        let filter = NeedFilter::new(FixedStore::new(Ok(true)));
        assert!(filter.filter(make_spot(14074.0, None)).is_some());
        assert_eq!(filter.store().queries.get(), 0);
    }

    #[test]
    fn test_unknown_band_always_emitted() {
        let filter = NeedFilter::new(FixedStore::new(Ok(true)));
        assert!(filter.filter(make_spot(5357.0, Some("SLOVAK REPUBLIC"))).is_some());
        assert_eq!(filter.store().queries.get(), 0);
    }

    #[test]
    fn test_store_failure_fails_open() {
        let filter = NeedFilter::new(FixedStore::new(Err(())));
        assert!(filter.filter(make_spot(14074.0, Some("SLOVAK REPUBLIC"))).is_some());
        assert_eq!(filter.store().queries.get(), 1);
    }

    #[test]
    fn test_memory_progress() {
        let mut store = MemoryProgress::new();
        store.mark_complete("Slovak Republic", Band::B20);
        store.mark_complete("YEMEN", Band::Unknown);

        assert_eq!(store.len(), 1);
        assert!(store.is_complete("SLOVAK REPUBLIC", Band::B20).unwrap());
        assert!(!store.is_complete("SLOVAK REPUBLIC", Band::B40).unwrap());
        assert!(!store.is_complete("YEMEN", Band::B20).unwrap());

        let filter = NeedFilter::new(&store);
        assert!(!filter.is_needed("SLOVAK REPUBLIC", Band::B20));
        assert!(filter.is_needed("SLOVAK REPUBLIC", Band::B15));
    }

    #[test]
    fn test_memory_progress_from_json() {
        let store =
            MemoryProgress::from_json(r#"{ "Slovak Republic": ["20", "40m"], "YEMEN": [] }"#)
                .unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.is_complete("SLOVAK REPUBLIC", Band::B40).unwrap());
    }

    #[test]
    fn test_memory_progress_bad_json() {
        assert!(matches!(
            MemoryProgress::from_json("not json"),
            Err(StoreError::Format(_))
        ));
        assert!(matches!(
            MemoryProgress::from_json(r#"{ "YEMEN": ["60m"] }"#),
            Err(StoreError::UnknownBand { .. })
        ));
    }

    #[test]
    fn test_memory_progress_load_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("progress.json");
        std::fs::write(&path, r#"{ "YEMEN": ["17"] }"#).unwrap();

        let store = MemoryProgress::load_json(&path).unwrap();
        assert!(store.is_complete("yemen", Band::B17).unwrap());

        assert!(matches!(
            MemoryProgress::load_json(dir.path().join("missing.json")),
            Err(StoreError::Io { .. })
        ));
    }
}
