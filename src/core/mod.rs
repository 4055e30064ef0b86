pub mod charging;
pub mod cleaner;
pub mod etl;
pub mod matcher;

pub use cleaner::{Cleaner, CleanerOptions, OutOfBoundsPolicy};
pub use etl::{EtlEngine, RunOutput};
pub use matcher::{GeoMatcher, MatcherOptions};
