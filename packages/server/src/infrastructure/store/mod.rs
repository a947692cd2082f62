//! Store implementations.
//!
//! - `inmemory`: process-local tables, used by the binary and the tests
//! - a relational implementation plugs in behind the same trait

pub mod inmemory;

pub use inmemory::InMemoryStore;
