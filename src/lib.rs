//! dxspot - DX cluster spot engine.
//!
//! This crate provides:
//! - A `cty.dat` entity database with exact-call and longest-prefix resolution
//! - An async telnet client for DX cluster and Reverse Beacon Network feeds
//! - A tolerant spot line parser (fixed columns with a nom fallback)
//! - Band and mode classification of spot frequencies
//! - Need filtering against a store of already-confirmed entity/band pairs
//! - Statistics tracking with HDR histograms and a Prometheus endpoint
//!
//! # Example
//!
//! ```rust
//! use dxspot::{EntityDatabase, MemoryProgress, SpotPipeline};
//! use std::sync::Arc;
//!
//! let db = EntityDatabase::load("Slovak Republic: 15: 28: EU: 49.00: -20.00: -1.0: OM:\n    OM,=OM5AY;");
//! let pipeline = SpotPipeline::new(Arc::new(db), MemoryProgress::new());
//!
//! let spot = pipeline
//!     .process_line("DX de OG3Z: 14074.0 OM5AY    FT8 25dB  1234Z")
//!     .expect("spot should be emitted");
//! assert_eq!(spot.entity, "SLOVAK REPUBLIC");
//! assert_eq!(spot.band().as_str(), "20");
//!
//! println!("{}", pipeline.stats().summary());
//! ```

pub mod band;
pub mod client;
pub mod config;
pub mod cty;
pub mod filter;
pub mod metrics;
pub mod need;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod spot;
pub mod stats;

pub use band::{Band, Mode, frequency_to_band, infer_mode};
pub use client::{ClientEvent, ClientHandle, ClientState, SpotClient, SpotClientConfig, SpotSession};
pub use config::Config;
pub use cty::{CtyError, EntityDatabase, EntityRecord, ResolutionIndex};
pub use filter::{SpotFilter, passes_filters};
pub use need::{MemoryProgress, NeedFilter, ProgressStore, StoreError};
pub use parser::{ParseError, looks_like_spot, parse_line, parse_spot};
pub use pipeline::SpotPipeline;
pub use resolver::{Resolution, Resolver};
pub use spot::{ClassifiedSpot, ResolvedSpot, SpotEvent, SpotRecord};
pub use stats::{SpotStats, StatsSummary};
