// Adapters layer: concrete implementations for external systems (source APIs, http, output sink).

pub mod google_places;
pub mod http;
pub mod open_charge_map;
pub mod sink;

pub use google_places::{GooglePlacesAdapter, GooglePlacesOptions};
pub use http::{HttpFetcher, RetryPolicy};
pub use open_charge_map::{OpenChargeMapAdapter, OpenChargeMapOptions};
pub use sink::{FileSink, OutputFormat, SinkOptions};
