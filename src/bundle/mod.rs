//! Adapters around the bundler's emitted output: reference relocation and stats loading.

pub mod base_href;
pub mod stats;

pub use base_href::{BaseHref, apply_base};
pub use stats::{BundleStats, StatsFileBundler, load_stats};
