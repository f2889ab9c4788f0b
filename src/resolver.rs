//! Callsign to entity resolution.
//!
//! Resolution order:
//! 1. exact callsign exceptions,
//! 2. the longest indexed prefix of the whole call,
//! 3. for portable calls (`7O/DL7ZM`, `W4I/M`), steps 1-2 on each
//!    `/`-separated segment in order, first hit wins.
//!
//! Names are translated from the database spelling to the names operators
//! track progress under (see [`canonical_name`]).

use crate::cty::{EntityDatabase, EntityRecord};

/// Database names that differ from the operator-facing entity names.
const NAME_ALIASES: &[(&str, &str)] = &[
    ("UNITED STATES", "UNITED STATES OF AMERICA"),
    ("FIJI", "FIJI ISLANDS"),
    ("FED. REP. OF GERMANY", "FEDERAL REPUBLIC OF GERMANY"),
    ("PEOPLE'S REP. OF CHINA", "CHINA"),
    ("DPR OF KOREA", "DEMOCRATIC PEOPLE'S REPUBLIC OF KOREA"),
    ("REPUBLIC OF KOREA", "SOUTH KOREA"),
    ("MICRONESIA", "FEDERATED STATES OF MICRONESIA"),
    ("VIETNAM", "VIET NAM"),
    ("THE GAMBIA", "GAMBIA"),
    ("ANTIGUA & BARBUDA", "ANTIGUA AND BARBUDA"),
    ("TRINIDAD & TOBAGO", "TRINIDAD AND TOBAGO"),
    ("ST. KITTS & NEVIS", "ST. KITTS AND NEVIS"),
    ("SAO TOME & PRINCIPE", "SAO TOME AND PRINCIPE"),
    ("TURKS & CAICOS ISLANDS", "TURKS AND CAICOS ISLANDS"),
    ("BOSNIA-HERZEGOVINA", "BOSNIA AND HERZEGOVINA"),
    ("ST. VINCENT", "ST. VINCENT AND THE GRENADINES"),
    ("HEARD ISLAND", "HEARD AND MCDONALD ISLANDS"),
];

/// Translate a database entity name to its canonical name.
pub fn canonical_name(name: &str) -> &str {
    NAME_ALIASES
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
        .unwrap_or(name)
}

/// A resolved entity together with its database record.
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    /// Canonical entity name.
    pub name: &'a str,
    pub record: &'a EntityRecord,
}

/// Resolves callsigns against a borrowed entity database.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    db: &'a EntityDatabase,
}

impl<'a> Resolver<'a> {
    pub fn new(db: &'a EntityDatabase) -> Self {
        Self { db }
    }

    /// Resolve a callsign to its canonical entity name.
    ///
    /// Case-insensitive. `None` is the normal outcome for garbage input.
    ///
    /// # Example
    ///
    /// ```
    /// use dxspot::{cty::EntityDatabase, resolver::Resolver};
    ///
    /// let db = EntityDatabase::load("Yemen: 21: 39: AS: 15.65: -48.12: -3.0: 7O:\n 7O;");
    /// let resolver = Resolver::new(&db);
    /// assert_eq!(resolver.resolve("7o/dl7zm").as_deref(), Some("YEMEN"));
    /// ```
    pub fn resolve(&self, call: &str) -> Option<String> {
        self.resolve_entity(call).map(|r| r.name.to_string())
    }

    /// Resolve a callsign to its entity record.
    pub fn resolve_entity(&self, call: &str) -> Option<Resolution<'a>> {
        let call = call.trim().to_ascii_uppercase();
        if call.is_empty() {
            return None;
        }

        let slot = self.lookup(&call).or_else(|| {
            if call.contains('/') {
                call.split('/')
                    .filter(|segment| !segment.is_empty())
                    .find_map(|segment| self.lookup(segment))
            } else {
                None
            }
        })?;

        let record = self.db.slot(slot)?;
        Some(Resolution {
            name: canonical_name(&record.name),
            record,
        })
    }

    fn lookup(&self, call: &str) -> Option<usize> {
        let index = self.db.index();
        index.exact(call).or_else(|| index.longest_prefix(call))
    }
}
