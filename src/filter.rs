//! Display filters for selective output.
//!
//! Applied after the need filter, these let the operator narrow the feed by
//! callsign patterns, bands, modes, entities or continents.

use serde::Deserialize;
use serde::de::{self, Deserializer, Visitor};
use std::fmt;

use crate::band::{Band, Mode};
use crate::spot::ResolvedSpot;

/// A list of patterns that deserializes from either a string or array.
///
/// Used for dx_call and spotter fields to allow both:
/// - `dx_call = "VP8*"` (single pattern)
/// - `dx_call = ["VP8*", "*/P"]` (multiple patterns with OR logic)
#[derive(Debug, Clone, Default)]
pub struct PatternList(Vec<String>);

impl PatternList {
    /// Get the patterns as a slice.
    pub fn patterns(&self) -> &[String] {
        &self.0
    }

    /// Check if any pattern matches the value.
    pub fn matches_any(&self, value: &str) -> bool {
        self.0.iter().any(|p| matches_wildcard(p, value))
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'de> Deserialize<'de> for PatternList {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PatternListVisitor;

        impl<'de> Visitor<'de> for PatternListVisitor {
            type Value = PatternList;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a string or array of strings")
            }

            fn visit_str<E>(self, value: &str) -> Result<PatternList, E>
            where
                E: de::Error,
            {
                Ok(PatternList(vec![value.to_string()]))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<PatternList, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut patterns = Vec::new();
                while let Some(value) = seq.next_element::<String>()? {
                    patterns.push(value);
                }
                Ok(PatternList(patterns))
            }
        }

        deserializer.deserialize_any(PatternListVisitor)
    }
}

/// A filter for matching spots.
///
/// All specified fields must match (AND logic).
/// Use multiple filters for OR logic.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SpotFilter {
    /// Optional name for this filter (used in logs).
    pub name: Option<String>,

    /// DX callsign patterns (supports `*` wildcard for prefix/suffix).
    pub dx_call: Option<PatternList>,

    /// Spotter callsign patterns (supports `*` wildcard for prefix/suffix).
    pub spotter: Option<PatternList>,

    /// Bands to match (e.g., "20", "40m").
    pub bands: Option<Vec<String>>,

    /// Modes to match.
    pub modes: Option<Vec<Mode>>,

    /// Canonical entity names to match (case-insensitive).
    pub entities: Option<Vec<String>>,

    /// Continent codes to match (EU, NA, ...).
    pub continents: Option<Vec<String>>,
}

impl SpotFilter {
    /// Check if a spot matches this filter.
    ///
    /// `continent` is the continent of the spot's entity, if resolved.
    pub fn matches(&self, spot: &ResolvedSpot, continent: Option<&str>) -> bool {
        if let Some(ref patterns) = self.dx_call
            && !patterns.is_empty()
            && !patterns.matches_any(spot.dx_call())
        {
            return false;
        }

        if let Some(ref patterns) = self.spotter
            && !patterns.is_empty()
            && !patterns.matches_any(spot.spotter())
        {
            return false;
        }

        if let Some(ref bands) = self.bands
            && !bands
                .iter()
                .any(|b| Band::from_label(b) == Some(spot.band()))
        {
            return false;
        }

        if let Some(ref modes) = self.modes
            && !modes.contains(&spot.mode())
        {
            return false;
        }

        if let Some(ref entities) = self.entities
            && !entities.iter().any(|e| e.eq_ignore_ascii_case(&spot.entity))
        {
            return false;
        }

        if let Some(ref continents) = self.continents {
            match continent {
                Some(c) if continents.iter().any(|x| x.eq_ignore_ascii_case(c)) => {}
                _ => return false,
            }
        }

        true
    }

    /// Validate the filter configuration.
    ///
    /// Returns an error if any patterns or band labels are invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref patterns) = self.dx_call {
            for pattern in patterns.patterns() {
                validate_wildcard_pattern(pattern)?;
            }
        }
        if let Some(ref patterns) = self.spotter {
            for pattern in patterns.patterns() {
                validate_wildcard_pattern(pattern)?;
            }
        }
        if let Some(ref bands) = self.bands {
            for band in bands {
                if Band::from_label(band).is_none() {
                    return Err(format!("Unknown band '{}'", band));
                }
            }
        }
        Ok(())
    }
}

/// Check if a spot passes a list of filters.
///
/// Returns `true` if the list is empty or at least one filter matches.
pub fn passes_filters(filters: &[SpotFilter], spot: &ResolvedSpot, continent: Option<&str>) -> bool {
    filters.is_empty() || filters.iter().any(|f| f.matches(spot, continent))
}

/// Match a string against a wildcard pattern.
///
/// Supports `*` as prefix or suffix wildcard (not both).
/// Matching is case-insensitive.
fn matches_wildcard(pattern: &str, value: &str) -> bool {
    let pattern_upper = pattern.to_ascii_uppercase();
    let value_upper = value.to_ascii_uppercase();

    if let Some(suffix) = pattern_upper.strip_prefix('*') {
        value_upper.ends_with(suffix)
    } else if let Some(prefix) = pattern_upper.strip_suffix('*') {
        value_upper.starts_with(prefix)
    } else {
        pattern_upper == value_upper
    }
}

/// Validate a wildcard pattern.
///
/// Returns an error if the pattern has wildcards in invalid positions.
fn validate_wildcard_pattern(pattern: &str) -> Result<(), String> {
    let wildcard_count = pattern.chars().filter(|&c| c == '*').count();

    if wildcard_count > 1 {
        return Err(format!(
            "Pattern '{}' has multiple wildcards; only one is allowed",
            pattern
        ));
    }

    if wildcard_count == 1 && !pattern.starts_with('*') && !pattern.ends_with('*') {
        return Err(format!(
            "Pattern '{}' has wildcard in middle; only prefix (*ABC) or suffix (ABC*) allowed",
            pattern
        ));
    }

    Ok(())
}
