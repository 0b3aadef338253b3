//! Storage seam for the triage pipeline: the `TaskStore` trait plus an
//! in-memory implementation used by pipeline tests. The sqlite-backed store
//! lives in `triage-storage-sqlite`.

pub mod memory;
pub mod traits;

pub use memory::*;
pub use traits::*;
