//! Order pricing and quoting for pool packages and equipment.
//!
//! The engine itself (`engine`, `calculators`, `geo`, `queue`) is pure and
//! synchronous. `services` is the host layer that loads reference data from
//! Postgres and the cache, runs the engine and persists the result.

pub mod calculators;
pub mod engine;
pub mod error;
pub mod geo;
pub mod models;
pub mod queries;
pub mod queue;
pub mod requests;
pub mod responses;
pub mod routes;
pub mod services;

// Re-export commonly used items
pub use calculators::round_money;
pub use engine::{apply_pricing, Catalog, CatalogSnapshot, PricingContext, PricingOutcome};
pub use error::PricingError;
pub use geo::{haversine_miles, resolve_distance};
pub use queue::{assign_queue_position, InstallQueue, QueueSequence};
pub use routes::router;
