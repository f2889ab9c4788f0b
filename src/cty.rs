//! Entity database loaded from a `cty.dat` prefix file.
//!
//! # File Format
//!
//! Each record is terminated by `;`. The first line is a colon-separated
//! header, the remaining lines are comma-separated prefix tokens:
//!
//! ```text
//! Slovak Republic:          15:  28:  EU:   49.00:   -20.00:    -1.0:  OM:
//!     OM,=OM5AY;
//! ```
//!
//! Header fields are: name, CQ zone, ITU zone, continent, latitude,
//! longitude, UTC offset, primary prefix. A primary prefix starting with
//! `*` marks an entry that is not a real entity; such records are skipped.
//!
//! A token starting with `=` is an exact callsign. Bracketed suffixes such
//! as `(14)`, `[28]`, `<lat/lon>`, `{EU}` and `~1.0~` carry zone overrides
//! and are stripped.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::resolver::{Resolution, Resolver};

/// Errors that can occur while fetching database text.
///
/// Parsing itself never fails; malformed records are skipped.
#[derive(Debug, Error)]
pub enum CtyError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to download cty.dat: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Download returned status {0}")]
    Status(u16),
}

/// Number of colon-separated header fields a record must carry.
const HEADER_FIELDS: usize = 8;

/// One entity from the database.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityRecord {
    /// Entity name, uppercase.
    pub name: String,
    pub cq_zone: Option<u8>,
    pub itu_zone: Option<u8>,
    /// Continent code (EU, NA, ...).
    pub continent: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub utc_offset: Option<f64>,
    pub primary_prefix: String,
    /// Additional prefixes in file order.
    pub prefixes: Vec<String>,
    /// Callsigns pinned to this entity regardless of prefix.
    pub call_exceptions: Vec<String>,
}

/// Lookup tables from uppercase keys to an entity slot.
#[derive(Debug, Clone, Default)]
pub struct ResolutionIndex {
    exact: HashMap<String, usize>,
    prefix: HashMap<String, usize>,
    longest_prefix: usize,
}

impl ResolutionIndex {
    fn build(entities: &[EntityRecord]) -> Self {
        let mut index = ResolutionIndex::default();
        for (slot, entity) in entities.iter().enumerate() {
            index.insert_prefix(&entity.primary_prefix, slot);
            for prefix in &entity.prefixes {
                index.insert_prefix(prefix, slot);
            }
            for call in &entity.call_exceptions {
                index.exact.insert(call.clone(), slot);
            }
        }
        index
    }

    fn insert_prefix(&mut self, prefix: &str, slot: usize) {
        if prefix.is_empty() {
            return;
        }
        self.longest_prefix = self.longest_prefix.max(prefix.len());
        self.prefix.insert(prefix.to_string(), slot);
    }

    /// Slot for an exact callsign exception.
    pub fn exact(&self, call: &str) -> Option<usize> {
        self.exact.get(call).copied()
    }

    /// Slot for the longest indexed prefix of `call`.
    ///
    /// Keys are unique, so at most one key of each length can match and
    /// the longest match is unambiguous.
    pub fn longest_prefix(&self, call: &str) -> Option<usize> {
        let max = self.longest_prefix.min(call.len());
        (1..=max)
            .rev()
            .filter(|&len| call.is_char_boundary(len))
            .find_map(|len| self.prefix.get(&call[..len]).copied())
    }

    pub fn exact_len(&self) -> usize {
        self.exact.len()
    }

    pub fn prefix_len(&self) -> usize {
        self.prefix.len()
    }

    pub fn contains_prefix(&self, prefix: &str) -> bool {
        self.prefix.contains_key(prefix)
    }
}

/// Immutable entity database with its resolution index.
///
/// Reloading builds a new value; holders swap the whole database, so
/// readers never see a partially built index.
#[derive(Debug, Clone, Default)]
pub struct EntityDatabase {
    entities: Vec<EntityRecord>,
    index: ResolutionIndex,
}

impl EntityDatabase {
    /// Parse database text. Malformed records are skipped.
    ///
    /// # Example
    ///
    /// ```
    /// use dxspot::cty::EntityDatabase;
    ///
    /// let text = "Slovak Republic: 15: 28: EU: 49.00: -20.00: -1.0: OM:\n    OM,=OM5AY;";
    /// let db = EntityDatabase::load(text);
    /// assert_eq!(db.len(), 1);
    /// assert_eq!(db.entities()[0].name, "SLOVAK REPUBLIC");
    /// ```
    pub fn load(text: &str) -> Self {
        let mut entities = Vec::new();
        let mut skipped = 0usize;

        for block in text.split(';') {
            if block.trim().is_empty() {
                continue;
            }
            match parse_record(block) {
                Some(record) => entities.push(record),
                None => skipped += 1,
            }
        }

        let index = ResolutionIndex::build(&entities);
        info!(
            "Loaded {} entities ({} prefixes, {} exact calls, {} records skipped)",
            entities.len(),
            index.prefix_len(),
            index.exact_len(),
            skipped
        );

        Self { entities, index }
    }

    /// Read and parse a database file.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, CtyError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| CtyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::load(&String::from_utf8_lossy(&bytes)))
    }

    pub fn entities(&self) -> &[EntityRecord] {
        &self.entities
    }

    /// Find an entity by its (uppercase) database name.
    pub fn entity(&self, name: &str) -> Option<&EntityRecord> {
        self.entities
            .iter()
            .find(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Resolve a callsign to its canonical name and record.
    pub fn lookup(&self, call: &str) -> Option<Resolution<'_>> {
        Resolver::new(self).resolve_entity(call)
    }

    pub fn index(&self) -> &ResolutionIndex {
        &self.index
    }

    pub(crate) fn slot(&self, slot: usize) -> Option<&EntityRecord> {
        self.entities.get(slot)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Download database text over HTTP.
pub async fn download_cty(url: &str, timeout: Duration) -> Result<String, CtyError> {
    info!("Downloading cty.dat from {}", url);
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    let response = client.get(url).send().await?;
    if !response.status().is_success() {
        return Err(CtyError::Status(response.status().as_u16()));
    }
    let text = response.text().await?;
    info!("Downloaded {} bytes", text.len());
    Ok(text)
}

fn parse_record(block: &str) -> Option<EntityRecord> {
    let block = block.trim();
    let mut lines = block.lines().map(str::trim).filter(|l| !l.is_empty());

    let header = lines.next()?;
    let fields: Vec<&str> = header
        .split(':')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .collect();
    if fields.len() < HEADER_FIELDS {
        debug!("Skipping cty record with short header: {}", header);
        return None;
    }

    let primary_prefix = fields[7].to_ascii_uppercase();
    if primary_prefix.starts_with('*') {
        debug!("Skipping non-entity {} ({})", fields[0], primary_prefix);
        return None;
    }

    let mut prefixes = Vec::new();
    let mut call_exceptions = Vec::new();
    for token in lines.flat_map(|line| line.split(',')) {
        let token = token.trim();
        let (is_call, token) = match token.strip_prefix('=') {
            Some(rest) => (true, rest),
            None => (false, token),
        };
        let token = strip_annotations(token).to_ascii_uppercase();
        if token.is_empty() {
            continue;
        }
        if is_call {
            call_exceptions.push(token);
        } else {
            prefixes.push(token);
        }
    }

    Some(EntityRecord {
        name: fields[0].to_ascii_uppercase(),
        cq_zone: fields[1].parse().ok(),
        itu_zone: fields[2].parse().ok(),
        continent: fields[3].to_ascii_uppercase(),
        latitude: fields[4].parse().ok(),
        longitude: fields[5].parse().ok(),
        utc_offset: fields[6].parse().ok(),
        primary_prefix,
        prefixes,
        call_exceptions,
    })
}

/// Remove `(..)`, `[..]`, `<..>`, `{..}` and `~..~` annotations from a token.
fn strip_annotations(token: &str) -> String {
    let mut out = String::with_capacity(token.len());
    let mut closer: Option<char> = None;

    for c in token.chars() {
        match closer {
            Some(end) if c == end => closer = None,
            Some(_) => {}
            None => match c {
                '(' => closer = Some(')'),
                '[' => closer = Some(']'),
                '<' => closer = Some('>'),
                '{' => closer = Some('}'),
                '~' => closer = Some('~'),
                c if c.is_whitespace() => {}
                c => out.push(c),
            },
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
Slovak Republic:          15:  28:  EU:   49.00:   -20.00:    -1.0:  OM:\r
    OM,=OM5AY;\r
Yemen:                    21:  39:  AS:   15.65:   -48.12:    -3.0:  7O:\r
    7O;\r
Fed. Rep. of Germany:     14:  28:  EU:   51.00:   -10.00:    -1.0:  DL:\r
    DA,DB,DC,DD,DE,DF,DG,DH,DI,DJ,DK,DL,DM,DN,DO,DP,DQ,DR,Y2,Y3,Y4,Y5,Y6,Y7,Y8,Y9,\r
    =DL0ABC(15)[29];\r
European Turkey:          20:  39:  EU:   41.02:   -28.97:    -2.0:  *TA1:\r
    TA1,=TA1ZZZ;\r
";

    #[test]
    fn test_load_sample() {
        let db = EntityDatabase::load(SAMPLE);
        assert_eq!(db.len(), 3);

        let slovakia = db.entity("Slovak Republic").unwrap();
        assert_eq!(slovakia.name, "SLOVAK REPUBLIC");
        assert_eq!(slovakia.continent, "EU");
        assert_eq!(slovakia.cq_zone, Some(15));
        assert_eq!(slovakia.itu_zone, Some(28));
        assert_eq!(slovakia.latitude, Some(49.0));
        assert_eq!(slovakia.longitude, Some(-20.0));
        assert_eq!(slovakia.utc_offset, Some(-1.0));
        assert_eq!(slovakia.primary_prefix, "OM");
        assert_eq!(slovakia.prefixes, vec!["OM"]);
        assert_eq!(slovakia.call_exceptions, vec!["OM5AY"]);
    }

    #[test]
    fn test_non_entity_excluded() {
        let db = EntityDatabase::load(SAMPLE);
        assert!(db.entity("European Turkey").is_none());
        assert!(!db.index().contains_prefix("TA1"));
        assert!(!db.index().contains_prefix("*TA1"));
        assert!(db.index().exact("TA1ZZZ").is_none());
    }

    #[test]
    fn test_annotations_stripped() {
        let db = EntityDatabase::load(SAMPLE);
        let germany = db.entity("FED. REP. OF GERMANY").unwrap();
        assert_eq!(germany.call_exceptions, vec!["DL0ABC"]);
        assert!(db.index().exact("DL0ABC").is_some());
        assert_eq!(germany.prefixes.len(), 26);
    }

    #[test]
    fn test_strip_annotations() {
        assert_eq!(strip_annotations("AA1(5)[8]"), "AA1");
        assert_eq!(strip_annotations("KH6<21.3/157.8>{OC}~10.0~"), "KH6");
        assert_eq!(strip_annotations(" W1AW "), "W1AW");
        assert_eq!(strip_annotations("(5)"), "");
    }

    #[test]
    fn test_malformed_records_skipped() {
        let text = "Garbage without fields\n  AB,CD;\n\
                    Slovak Republic: 15: 28: EU: 49.00: -20.00: -1.0: OM:\n OM;\n\
                    ;;;\n\
                    Short: 1: 2: EU:\n XX;";
        let db = EntityDatabase::load(text);
        assert_eq!(db.len(), 1);
        assert!(db.index().contains_prefix("OM"));
        assert!(!db.index().contains_prefix("XX"));
        assert!(!db.index().contains_prefix("AB"));
    }

    #[test]
    fn test_bad_numeric_fields_are_kept() {
        let text = "Somewhere: xx: 28: EU: north: -20.00: -1.0: S0:\n S0;";
        let db = EntityDatabase::load(text);
        let entity = db.entity("SOMEWHERE").unwrap();
        assert_eq!(entity.cq_zone, None);
        assert_eq!(entity.latitude, None);
        assert_eq!(entity.itu_zone, Some(28));
    }

    #[test]
    fn test_empty_input() {
        let db = EntityDatabase::load("");
        assert!(db.is_empty());
        assert_eq!(db.index().prefix_len(), 0);
    }

    #[test]
    fn test_duplicate_exact_last_writer_wins() {
        let text = "Alpha: 1: 1: EU: 0: 0: 0: AA:\n =X1Y;\nBravo: 1: 1: EU: 0: 0: 0: BB:\n =X1Y;";
        let db = EntityDatabase::load(text);
        let slot = db.index().exact("X1Y").unwrap();
        assert_eq!(db.slot(slot).unwrap().name, "BRAVO");
    }

    #[test]
    fn test_longest_prefix() {
        let text = "Usa: 5: 8: NA: 0: 0: 0: K:\n K,W;\nHawaii: 31: 61: OC: 0: 0: 0: KH6:\n KH6,KH7;";
        let db = EntityDatabase::load(text);
        let slot = db.index().longest_prefix("KH6ABC").unwrap();
        assert_eq!(db.slot(slot).unwrap().name, "HAWAII");
        let slot = db.index().longest_prefix("K1ABC").unwrap();
        assert_eq!(db.slot(slot).unwrap().name, "USA");
        assert!(db.index().longest_prefix("ZZ9").is_none());
    }

    #[test]
    fn test_lookup() {
        let db = EntityDatabase::load(SAMPLE);
        let hit = db.lookup("dl0abc").unwrap();
        assert_eq!(hit.name, "FEDERAL REPUBLIC OF GERMANY");
        assert_eq!(hit.record.primary_prefix, "DL");
        assert!(db.lookup("TA1ZZZ").is_none());
    }

    #[test]
    fn test_load_file_missing() {
        let err = EntityDatabase::load_file("/nonexistent/cty.dat").unwrap_err();
        assert!(matches!(err, CtyError::Io { .. }));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cty.dat");
        std::fs::write(&path, SAMPLE).unwrap();
        let db = EntityDatabase::load_file(&path).unwrap();
        assert_eq!(db.len(), 3);
    }
}
