//! Silver-layer conformance for the Olist e-commerce warehouse.
//!
//! Reads raw Bronze extracts, repairs and deduplicates them, and replaces the
//! Silver tables that the Gold views read from. Every transform is
//! deterministic: the same Bronze snapshot gives the same Silver tables.

pub mod bronze;
pub mod calendar;
pub mod catalog;
pub mod config;
pub mod dedup;
pub mod error;
pub mod loader;
pub mod location;
pub mod parse;
pub mod pipeline;
pub mod rules;
pub mod silver;
pub mod store;
pub mod timeline;

pub use config::Config;
pub use error::LoadError;
pub use loader::{LoadReport, Loader, StepReport};
pub use pipeline::Stage;
