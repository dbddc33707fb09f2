//! `docket-engine` — evidence-index matching engine.
//!
//! Pure engine crate: fuzzy scoring, series detection, selection state,
//! batched auto-matching and import-merge reconciliation. No CLI or IO
//! dependencies.

pub mod config;
pub mod error;
pub mod merge;
pub mod model;
pub mod pipeline;
pub mod scorer;
pub mod series;
pub mod state;

pub use config::MatchConfig;
pub use error::MatchError;
pub use model::{Match, MatchMethod, Reference, Series, SeriesItem, SeriesType};
pub use series::SeriesDetector;
pub use state::SessionState;
