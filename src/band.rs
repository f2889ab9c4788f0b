//! Band and mode classification for spot frequencies.
//!
//! Cluster servers report frequencies in kHz most of the time, but some
//! feeds use MHz. Values above 1000 are treated as kHz, anything else as
//! MHz. This misreads a VHF spot given in MHz above 1000 (e.g. 1296.2),
//! which none of the classified bands cover anyway.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Amateur band bucket a spot falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "160")]
    B160,
    #[serde(rename = "80")]
    B80,
    #[serde(rename = "40")]
    B40,
    #[serde(rename = "30")]
    B30,
    #[serde(rename = "20")]
    B20,
    #[serde(rename = "17")]
    B17,
    #[serde(rename = "15")]
    B15,
    #[serde(rename = "12")]
    B12,
    #[serde(rename = "10")]
    B10,
    #[serde(rename = "6")]
    B6,
    #[serde(rename = "2")]
    B2,
    #[serde(rename = "unknown")]
    Unknown,
}

/// Band windows in MHz, inclusive lower edge and exclusive upper edge.
const BAND_WINDOWS: &[(f64, f64, Band)] = &[
    (1.8, 2.0, Band::B160),
    (3.5, 4.0, Band::B80),
    (7.0, 7.3, Band::B40),
    (10.1, 10.15, Band::B30),
    (14.0, 14.35, Band::B20),
    (18.068, 18.168, Band::B17),
    (21.0, 21.45, Band::B15),
    (24.89, 24.99, Band::B12),
    (28.0, 29.7, Band::B10),
    (50.0, 54.0, Band::B6),
    (144.0, 148.0, Band::B2),
];

impl Band {
    /// All known bands, lowest frequency first.
    pub const ALL: [Band; 11] = [
        Band::B160,
        Band::B80,
        Band::B40,
        Band::B30,
        Band::B20,
        Band::B17,
        Band::B15,
        Band::B12,
        Band::B10,
        Band::B6,
        Band::B2,
    ];

    /// Label used by the progress store and in emitted spots ("20", "160", ...).
    pub fn as_str(self) -> &'static str {
        match self {
            Band::B160 => "160",
            Band::B80 => "80",
            Band::B40 => "40",
            Band::B30 => "30",
            Band::B20 => "20",
            Band::B17 => "17",
            Band::B15 => "15",
            Band::B12 => "12",
            Band::B10 => "10",
            Band::B6 => "6",
            Band::B2 => "2",
            Band::Unknown => "unknown",
        }
    }

    /// Parse a band label, accepting "20", "20m" and "20M".
    pub fn from_label(label: &str) -> Option<Band> {
        let label = label.trim();
        let digits = label
            .strip_suffix('m')
            .or_else(|| label.strip_suffix('M'))
            .unwrap_or(label);
        Band::ALL.into_iter().find(|b| b.as_str() == digits)
    }

    /// Lower edge of the band in kHz, `None` for `Unknown`.
    pub fn lower_edge_khz(self) -> Option<f64> {
        BAND_WINDOWS
            .iter()
            .find(|(_, _, band)| *band == self)
            .map(|(low, _, _)| low * 1000.0)
    }

    pub fn is_known(self) -> bool {
        self != Band::Unknown
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Operating mode inferred for a spot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    #[serde(rename = "CW")]
    Cw,
    Phone,
    Digital,
    Satellite,
    Unknown,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            Mode::Cw => "CW",
            Mode::Phone => "Phone",
            Mode::Digital => "Digital",
            Mode::Satellite => "Satellite",
            Mode::Unknown => "Unknown",
        })
    }
}

/// FT8 and FT4 dial frequencies in kHz.
pub const DIGITAL_CALLING_KHZ: &[f64] = &[
    // FT8
    1840.0, 3573.0, 7074.0, 10136.0, 14074.0, 18100.0, 21074.0, 24915.0, 28074.0, 50313.0,
    144174.0,
    // FT4
    3575.0, 7047.5, 10140.0, 14080.0, 18104.0, 21140.0, 24919.0, 28180.0, 50318.0, 144170.0,
];

/// How far below a dial frequency a digital signal may be reported.
const DIAL_TOLERANCE_BELOW_KHZ: f64 = 0.5;

/// Width of the audio passband above the dial frequency.
const DIAL_PASSBAND_KHZ: f64 = 3.0;

/// Width of the conventional CW segment at the bottom of each band.
const CW_SEGMENT_KHZ: f64 = 100.0;

/// Normalize a reported frequency to MHz.
///
/// Values above 1000 are assumed to be kHz.
pub fn to_mhz(value: f64) -> f64 {
    if value > 1000.0 { value / 1000.0 } else { value }
}

/// Normalize a reported frequency to kHz.
///
/// Values above 1000 are already kHz and pass through unchanged.
pub fn to_khz(value: f64) -> f64 {
    if value > 1000.0 { value } else { value * 1000.0 }
}

/// Map a reported frequency (kHz or MHz) to its band.
///
/// # Example
///
/// ```
/// use dxspot::band::{Band, frequency_to_band};
///
/// assert_eq!(frequency_to_band(14074.0), Band::B20);
/// assert_eq!(frequency_to_band(14.074), Band::B20);
/// ```
pub fn frequency_to_band(value: f64) -> Band {
    if !value.is_finite() || value <= 0.0 {
        return Band::Unknown;
    }
    let mhz = to_mhz(value);
    BAND_WINDOWS
        .iter()
        .find(|(low, high, _)| mhz >= *low && mhz < *high)
        .map(|(_, _, band)| *band)
        .unwrap_or(Band::Unknown)
}

/// Check whether a frequency sits on a known FT8/FT4 calling frequency.
pub fn is_digital_calling_frequency(value: f64) -> bool {
    let khz = to_khz(value);
    DIGITAL_CALLING_KHZ
        .iter()
        .any(|dial| khz >= dial - DIAL_TOLERANCE_BELOW_KHZ && khz <= dial + DIAL_PASSBAND_KHZ)
}

/// Infer the operating mode of a spot.
///
/// Keywords in the message win, checked in the order SAT, CW, digital
/// (RTTY/FT8/FT4/DATA), phone (SSB/PHONE). Without a keyword the digital
/// calling table is consulted, then the band plan: the first 100 kHz of a
/// band is CW, the rest phone.
pub fn infer_mode(message: &str, frequency: f64, band: Band) -> Mode {
    if let Some(mode) = mode_from_message(message) {
        return mode;
    }

    if is_digital_calling_frequency(frequency) {
        return Mode::Digital;
    }

    match band.lower_edge_khz() {
        Some(edge) if to_khz(frequency) < edge + CW_SEGMENT_KHZ => Mode::Cw,
        Some(_) => Mode::Phone,
        None => Mode::Unknown,
    }
}

fn mode_from_message(message: &str) -> Option<Mode> {
    let upper = message.to_ascii_uppercase();

    if upper.contains("SAT") {
        Some(Mode::Satellite)
    } else if upper.contains("CW") {
        Some(Mode::Cw)
    } else if ["RTTY", "FT8", "FT4", "DATA"].iter().any(|k| upper.contains(k)) {
        Some(Mode::Digital)
    } else if ["SSB", "PHONE"].iter().any(|k| upper.contains(k)) {
        Some(Mode::Phone)
    } else {
        None
    }
}
