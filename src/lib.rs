// src/lib.rs
pub mod api;
pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod query;
pub mod store;

pub use api::{ErrorResponse, RelatedRef, Resource, ResourceResponse, ResourceSerializer, ShapingRequest};
pub use config::*;
pub use engine::{ApiHelper, ApiHelperBuilder};
pub use error::*;
pub use store::{LoadedRelation, MemoryStore, Record, RecordLoader};
