//! Input boundary: raw activity records, ingestion and log preparation
//!
//! Raw records come from the learning platform's exports (JSON array or
//! NDJSON). They are validated into typed [`Event`](crate::types::Event)s and
//! grouped into an [`EventLog`](crate::types::EventLog).

mod raw_event;
mod adapter;
mod filter;

pub use raw_event::*;
pub use adapter::*;
pub use filter::*;
