//! Statistics tracking for the spot pipeline.
//!
//! Counts every stage a line passes through (parsed, resolved, suppressed,
//! emitted) and keeps breakdowns of emitted spots by band, mode and entity.

use hdrhistogram::Histogram;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::band::{Band, Mode};
use crate::spot::ResolvedSpot;

/// Thread-safe statistics collector for the spot pipeline.
#[derive(Debug)]
pub struct SpotStats {
    /// Total lines received from the feed
    pub lines: AtomicU64,

    /// Total bytes of raw input processed
    pub bytes_processed: AtomicU64,

    /// Lines without the spot sentinel
    pub non_spot_lines: AtomicU64,

    /// Spot lines that failed to parse
    pub parse_failures: AtomicU64,

    /// Spots parsed successfully
    pub parsed_spots: AtomicU64,

    /// Parsed spots whose callsign did not resolve
    pub unresolved: AtomicU64,

    /// Spots hidden because the entity is complete on the band
    pub suppressed: AtomicU64,

    /// Spots hidden by display filters
    pub filtered: AtomicU64,

    /// Spots handed to the output
    pub emitted: AtomicU64,

    /// Histogram of line lengths
    line_histogram: Option<RwLock<Histogram<u64>>>,

    /// Emitted spots per band
    spots_by_band: RwLock<HashMap<Band, u64>>,

    /// Emitted spots per mode
    spots_by_mode: RwLock<HashMap<Mode, u64>>,

    /// Emitted spots per entity
    top_entities: RwLock<HashMap<String, u64>>,

    /// When stats collection started
    start_time: Instant,
}

impl SpotStats {
    /// Create a new statistics collector.
    pub fn new() -> Self {
        Self {
            lines: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
            non_spot_lines: AtomicU64::new(0),
            parse_failures: AtomicU64::new(0),
            parsed_spots: AtomicU64::new(0),
            unresolved: AtomicU64::new(0),
            suppressed: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            emitted: AtomicU64::new(0),
            // Line length: 1 byte to 4KB, 3 significant figures
            line_histogram: Histogram::new_with_bounds(1, 4_096, 3).ok().map(RwLock::new),
            spots_by_band: RwLock::new(HashMap::new()),
            spots_by_mode: RwLock::new(HashMap::new()),
            top_entities: RwLock::new(HashMap::new()),
            start_time: Instant::now(),
        }
    }

    /// Record a line received from the feed.
    pub fn record_line(&self, line: &str) {
        let len = line.len() as u64;
        self.lines.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed.fetch_add(len, Ordering::Relaxed);

        if let Some(ref hist) = self.line_histogram
            && let Ok(mut hist) = hist.write()
        {
            let _ = hist.record(len.clamp(1, 4_096));
        }
    }

    /// Record a non-spot line.
    pub fn record_non_spot(&self) {
        self.non_spot_lines.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a parse failure.
    pub fn record_parse_failure(&self) {
        self.parse_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a parsed spot and whether its callsign resolved.
    pub fn record_parsed(&self, resolved: bool) {
        self.parsed_spots.fetch_add(1, Ordering::Relaxed);
        if !resolved {
            self.unresolved.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a spot hidden by the need filter.
    pub fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a spot hidden by display filters.
    pub fn record_filtered(&self) {
        self.filtered.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a spot handed to the output.
    pub fn record_emitted(&self, spot: &ResolvedSpot) {
        self.emitted.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut map) = self.spots_by_band.write() {
            *map.entry(spot.band()).or_insert(0) += 1;
        }

        if let Ok(mut map) = self.spots_by_mode.write() {
            *map.entry(spot.mode()).or_insert(0) += 1;
        }

        if spot.is_resolved()
            && let Ok(mut map) = self.top_entities.write()
        {
            *map.entry(spot.entity.clone()).or_insert(0) += 1;
        }
    }

    /// Get the elapsed time since stats collection started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get the current parsed spots per second rate.
    pub fn spots_per_second(&self) -> f64 {
        let elapsed = self.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.parsed_spots.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Generate a summary report.
    pub fn summary(&self) -> StatsSummary {
        let line_percentiles = self
            .line_histogram
            .as_ref()
            .and_then(|h| h.read().ok())
            .filter(|h| h.len() > 0)
            .map(|h| HistogramPercentiles {
                p50: h.value_at_quantile(0.50),
                p90: h.value_at_quantile(0.90),
                p99: h.value_at_quantile(0.99),
                min: h.min(),
                max: h.max(),
                mean: h.mean(),
            });

        let spots_by_band = self
            .spots_by_band
            .read()
            .map(|m| m.iter().map(|(k, v)| (k.to_string(), *v)).collect())
            .unwrap_or_default();

        let spots_by_mode = self
            .spots_by_mode
            .read()
            .map(|m| m.iter().map(|(k, v)| (k.to_string(), *v)).collect())
            .unwrap_or_default();

        // Get top 10 entities
        let top_entities = self
            .top_entities
            .read()
            .map(|m| {
                let mut vec: Vec<_> = m.iter().map(|(k, v)| (k.clone(), *v)).collect();
                vec.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                vec.truncate(10);
                vec
            })
            .unwrap_or_default();

        StatsSummary {
            elapsed_secs: self.elapsed().as_secs_f64(),
            lines: self.lines.load(Ordering::Relaxed),
            bytes_processed: self.bytes_processed.load(Ordering::Relaxed),
            non_spot_lines: self.non_spot_lines.load(Ordering::Relaxed),
            parse_failures: self.parse_failures.load(Ordering::Relaxed),
            parsed_spots: self.parsed_spots.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            filtered: self.filtered.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            spots_per_second: self.spots_per_second(),
            line_percentiles,
            spots_by_band,
            spots_by_mode,
            top_entities,
        }
    }
}

impl Default for SpotStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile values from a histogram.
#[derive(Debug, Clone, Serialize)]
pub struct HistogramPercentiles {
    pub p50: u64,
    pub p90: u64,
    pub p99: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Summary of collected statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StatsSummary {
    pub elapsed_secs: f64,
    pub lines: u64,
    pub bytes_processed: u64,
    pub non_spot_lines: u64,
    pub parse_failures: u64,
    pub parsed_spots: u64,
    pub unresolved: u64,
    pub suppressed: u64,
    pub filtered: u64,
    pub emitted: u64,
    pub spots_per_second: f64,
    pub line_percentiles: Option<HistogramPercentiles>,
    pub spots_by_band: HashMap<String, u64>,
    pub spots_by_mode: HashMap<String, u64>,
    pub top_entities: Vec<(String, u64)>,
}

impl StatsSummary {
    /// Percentage of parsed spots that resolved to an entity.
    pub fn resolved_percent(&self) -> f64 {
        if self.parsed_spots > 0 {
            (self.parsed_spots - self.unresolved) as f64 / self.parsed_spots as f64 * 100.0
        } else {
            0.0
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f, "                  DX SPOT STATISTICS")?;
        writeln!(f, "═══════════════════════════════════════════════════════")?;
        writeln!(f)?;
        writeln!(f, "Runtime: {:.1}s", self.elapsed_secs)?;
        writeln!(f, "Lines: {}", self.lines)?;
        writeln!(f, "Bytes processed: {} KB", self.bytes_processed / 1024)?;
        writeln!(f, "Non-spot lines: {}", self.non_spot_lines)?;
        writeln!(f, "Parse failures: {}", self.parse_failures)?;
        writeln!(
            f,
            "Parsed spots: {} ({:.1}% resolved)",
            self.parsed_spots,
            self.resolved_percent()
        )?;
        writeln!(f, "Suppressed (complete): {}", self.suppressed)?;
        writeln!(f, "Filtered: {}", self.filtered)?;
        writeln!(f, "Emitted: {}", self.emitted)?;
        writeln!(f, "Rate: {:.1} spots/sec", self.spots_per_second)?;
        writeln!(f)?;

        if let Some(ref p) = self.line_percentiles {
            writeln!(f, "Line Length (bytes):")?;
            writeln!(f, "  Min: {}, Max: {}, Mean: {:.1}", p.min, p.max, p.mean)?;
            writeln!(f, "  P50: {}, P90: {}, P99: {}", p.p50, p.p90, p.p99)?;
            writeln!(f)?;
        }

        if !self.spots_by_band.is_empty() {
            writeln!(f, "Spots by Band:")?;
            let mut bands: Vec<_> = self.spots_by_band.iter().collect();
            bands.sort_by(|a, b| b.1.cmp(a.1));
            for (band, count) in bands {
                writeln!(f, "  {}m: {}", band, count)?;
            }
            writeln!(f)?;
        }

        if !self.spots_by_mode.is_empty() {
            writeln!(f, "Spots by Mode:")?;
            let mut modes: Vec<_> = self.spots_by_mode.iter().collect();
            modes.sort_by(|a, b| b.1.cmp(a.1));
            for (mode, count) in modes {
                writeln!(f, "  {}: {}", mode, count)?;
            }
            writeln!(f)?;
        }

        if !self.top_entities.is_empty() {
            writeln!(f, "Top 10 Entities:")?;
            for (i, (entity, count)) in self.top_entities.iter().enumerate() {
                writeln!(f, "  {}. {}: {}", i + 1, entity, count)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spot::SpotRecord;

    fn make_test_spot(freq: f64, entity: Option<&str>) -> ResolvedSpot {
        SpotRecord {
            spotter: "OG3Z".to_string(),
            frequency_khz: freq,
            frequency_text: freq.to_string(),
            dx_call: "OM5AY".to_string(),
            message: "FT8".to_string(),
            time_utc: "1200".to_string(),
        }
        .classify()
        .resolve(entity.map(str::to_string))
    }

    #[test]
    fn test_record_emitted() {
        let stats = SpotStats::new();
        stats.record_emitted(&make_test_spot(14074.0, Some("SLOVAK REPUBLIC")));

        let summary = stats.summary();
        assert_eq!(summary.emitted, 1);
        assert_eq!(summary.spots_by_band.get("20"), Some(&1));
        assert_eq!(summary.spots_by_mode.get("Digital"), Some(&1));
        assert_eq!(summary.top_entities, vec![("SLOVAK REPUBLIC".to_string(), 1)]);
    }

    #[test]
    fn test_unresolved_not_in_top_entities() {
        let stats = SpotStats::new();
        stats.record_parsed(false);
        stats.record_emitted(&make_test_spot(14074.0, None));

        let summary = stats.summary();
        assert_eq!(summary.unresolved, 1);
        assert!(summary.top_entities.is_empty());
        assert_eq!(summary.resolved_percent(), 0.0);
    }

    #[test]
    fn test_spots_per_second() {
        let stats = SpotStats::new();

        for _ in 0..100 {
            stats.record_parsed(true);
        }

        // Rate should be positive after recording spots
        assert!(stats.spots_per_second() > 0.0);
    }

    #[test]
    fn test_summary_generation() {
        let stats = SpotStats::new();

        stats.record_line("DX de OG3Z: 14074.0 OM5AY    FT8 25dB  1234Z");
        stats.record_line("Welcome to the cluster");
        for _ in 0..4 {
            stats.record_parsed(true);
        }
        stats.record_parse_failure();
        stats.record_non_spot();
        stats.record_suppressed();
        stats.record_filtered();

        let summary = stats.summary();

        assert_eq!(summary.lines, 2);
        assert_eq!(summary.bytes_processed, 66);
        assert_eq!(summary.parsed_spots, 4);
        assert_eq!(summary.parse_failures, 1);
        assert_eq!(summary.non_spot_lines, 1);
        assert_eq!(summary.suppressed, 1);
        assert_eq!(summary.filtered, 1);
        assert_eq!(summary.resolved_percent(), 100.0);

        let lines = summary.line_percentiles.as_ref().unwrap();
        assert_eq!(lines.min, 22);
        assert!(summary.to_string().contains("Parsed spots: 4"));
    }

    #[test]
    fn test_empty_summary_has_no_percentiles() {
        let summary = SpotStats::new().summary();
        assert!(summary.line_percentiles.is_none());
    }
}
