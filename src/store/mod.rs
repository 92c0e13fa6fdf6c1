//! Remote graph store backends
//!
//! The synchronization engine talks to the store only through the
//! `RemoteStore` trait. `HttpStore` is the production client; `MemoryStore`
//! keeps the graph in process and records calls.

mod http;
mod memory;
mod traits;

pub use http::HttpStore;
pub use memory::{MemoryStore, StoreCall};
pub use traits::{RemoteStore, StoreError, StoreOp, StoreResult};
