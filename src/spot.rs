//! Data structures representing cluster spots as they move through the pipeline.
//!
//! A raw line becomes a [`SpotRecord`], gains a band and mode as a
//! [`ClassifiedSpot`], and an entity name as a [`ResolvedSpot`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::band::{self, Band, Mode};

/// A spot as extracted from one line of the cluster feed.
///
/// # Example
///
/// A raw spot like:
/// ```text
/// DX de OG3Z: 14074.0 OM5AY    FT8 25dB  1234Z
/// ```
///
/// Would be parsed into a `SpotRecord` with:
/// - `spotter`: "OG3Z"
/// - `frequency_khz`: 14074.0
/// - `frequency_text`: "14074.0"
/// - `dx_call`: "OM5AY"
/// - `message`: "FT8 25dB"
/// - `time_utc`: "1234"
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotRecord {
    /// The station that reported the spot.
    pub spotter: String,

    /// Frequency in kHz. MHz reports are scaled, see [`band::to_khz`].
    pub frequency_khz: f64,

    /// Frequency text with internal whitespace removed.
    pub frequency_text: String,

    /// The spotted station, exactly as it appeared on the line.
    pub dx_call: String,

    /// Free-text comment, may carry mode hints.
    pub message: String,

    /// UTC time as four zero-padded digits, e.g. "0915".
    pub time_utc: String,
}

impl SpotRecord {
    /// Attach band and mode to this spot.
    pub fn classify(self) -> ClassifiedSpot {
        let band = band::frequency_to_band(self.frequency_khz);
        let mode = band::infer_mode(&self.message, self.frequency_khz, band);
        ClassifiedSpot {
            spot: self,
            band,
            mode,
        }
    }
}

impl fmt::Display for SpotRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DX de {}: {:>8} {} {} {}Z",
            self.spotter, self.frequency_text, self.dx_call, self.message, self.time_utc
        )
    }
}

/// A spot with its band and inferred mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedSpot {
    #[serde(flatten)]
    pub spot: SpotRecord,
    pub band: Band,
    pub mode: Mode,
}

impl ClassifiedSpot {
    /// Attach the resolved entity name. An empty name means unresolved.
    pub fn resolve(self, entity: Option<String>) -> ResolvedSpot {
        ResolvedSpot {
            spot: self,
            entity: entity.unwrap_or_default(),
        }
    }
}

/// A fully classified spot, ready for the need filter and presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedSpot {
    #[serde(flatten)]
    pub spot: ClassifiedSpot,

    /// Canonical entity name, empty when the call did not resolve.
    pub entity: String,
}

impl ResolvedSpot {
    pub fn spotter(&self) -> &str {
        &self.spot.spot.spotter
    }

    pub fn dx_call(&self) -> &str {
        &self.spot.spot.dx_call
    }

    pub fn band(&self) -> Band {
        self.spot.band
    }

    pub fn mode(&self) -> Mode {
        self.spot.mode
    }

    pub fn time_utc(&self) -> &str {
        &self.spot.spot.time_utc
    }

    pub fn is_resolved(&self) -> bool {
        !self.entity.is_empty()
    }

    /// The event handed to the presentation layer.
    pub fn event(&self) -> SpotEvent {
        SpotEvent {
            spotter: self.spot.spot.spotter.clone(),
            frequency_text: self.spot.spot.frequency_text.clone(),
            callsign: self.spot.spot.dx_call.clone(),
            band: self.spot.band,
            mode: self.spot.mode,
            entity_name: self.entity.clone(),
            time_utc: self.spot.spot.time_utc.clone(),
        }
    }
}

impl fmt::Display for ResolvedSpot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entity = if self.entity.is_empty() {
            "?"
        } else {
            self.entity.as_str()
        };
        write!(
            f,
            "{}Z {:>9} {:<12} {:>4}m {:<9} {:<28} de {}",
            self.time_utc(),
            self.spot.spot.frequency_text,
            self.dx_call(),
            self.band(),
            self.mode(),
            entity,
            self.spotter()
        )
    }
}

/// Actionable spot as delivered to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotEvent {
    pub spotter: String,
    pub frequency_text: String,
    pub callsign: String,
    pub band: Band,
    pub mode: Mode,
    pub entity_name: String,
    pub time_utc: String,
}
