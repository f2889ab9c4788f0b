//! The spot pipeline: line → parse → classify → resolve → need → display.
//!
//! Every stage runs synchronously for one line before the next line is
//! looked at, so emitted spots keep the order they arrived in.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::client::ClientEvent;
use crate::cty::EntityDatabase;
use crate::filter::{SpotFilter, passes_filters};
use crate::need::{NeedFilter, ProgressStore};
use crate::parser;
use crate::spot::ResolvedSpot;
use crate::stats::SpotStats;

/// Turns raw feed lines into actionable spots.
#[derive(Debug)]
pub struct SpotPipeline<S> {
    db: Arc<EntityDatabase>,
    need: NeedFilter<S>,
    filters: Vec<SpotFilter>,
    stats: Arc<SpotStats>,
    show_unresolved: bool,
}

impl<S: ProgressStore> SpotPipeline<S> {
    /// Create a pipeline that resolves against `db` and checks `store`.
    pub fn new(db: Arc<EntityDatabase>, store: S) -> Self {
        Self {
            db,
            need: NeedFilter::new(store),
            filters: Vec::new(),
            stats: Arc::new(SpotStats::new()),
            show_unresolved: true,
        }
    }

    /// Only emit spots matching at least one of these filters.
    pub fn with_filters(mut self, filters: Vec<SpotFilter>) -> Self {
        self.filters = filters;
        self
    }

    /// Record into a shared statistics collector.
    pub fn with_stats(mut self, stats: Arc<SpotStats>) -> Self {
        self.stats = stats;
        self
    }

    /// Whether spots with an unresolved callsign are emitted.
    pub fn show_unresolved(mut self, show: bool) -> Self {
        self.show_unresolved = show;
        self
    }

    pub fn stats(&self) -> &Arc<SpotStats> {
        &self.stats
    }

    pub fn database(&self) -> &EntityDatabase {
        &self.db
    }

    /// Swap in a freshly loaded database.
    pub fn set_database(&mut self, db: Arc<EntityDatabase>) {
        self.db = db;
    }

    /// Run one line through every stage.
    ///
    /// Returns the spot if it should be shown. Non-spot and malformed lines
    /// are counted and dropped quietly.
    pub fn process_line(&self, line: &str) -> Option<ResolvedSpot> {
        self.stats.record_line(line);

        if !parser::looks_like_spot(line) {
            self.stats.record_non_spot();
            debug!("Non-spot line: {}", line);
            return None;
        }

        let record = match parser::parse_spot(line) {
            Ok(record) => record,
            Err(e) => {
                self.stats.record_parse_failure();
                debug!("Dropped line ({}): {}", e, line);
                return None;
            }
        };

        let classified = record.classify();
        let resolution = self.db.lookup(&classified.spot.dx_call);
        let continent = resolution.map(|r| r.record.continent.as_str());
        let spot = classified.resolve(resolution.map(|r| r.name.to_string()));
        self.stats.record_parsed(spot.is_resolved());

        if !spot.is_resolved() && !self.show_unresolved {
            debug!("Unresolved callsign {}", spot.dx_call());
            self.stats.record_filtered();
            return None;
        }

        let Some(spot) = self.need.filter(spot) else {
            self.stats.record_suppressed();
            return None;
        };

        if !passes_filters(&self.filters, &spot, continent) {
            self.stats.record_filtered();
            return None;
        }

        self.stats.record_emitted(&spot);
        Some(spot)
    }

    /// Consume client events until the feed ends or `sink` is dropped.
    ///
    /// Returns the number of spots sent.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<ClientEvent>,
        sink: mpsc::Sender<ResolvedSpot>,
    ) -> u64 {
        let mut emitted = 0;
        while let Some(event) = events.recv().await {
            match event {
                ClientEvent::Line(line) => {
                    if let Some(spot) = self.process_line(&line) {
                        if sink.send(spot).await.is_err() {
                            debug!("Spot receiver dropped");
                            break;
                        }
                        emitted += 1;
                    }
                }
                ClientEvent::State(state) => debug!("Feed {}", state),
                ClientEvent::Error(e) => warn!("Feed error: {}", e),
            }
        }
        emitted
    }
}
