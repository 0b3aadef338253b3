//! Pure domain core for the transcript-to-task triage pipeline: data model,
//! grounding snapshot, draft validation, reference resolution, normalization,
//! QA policy engine, and priority scoring. No I/O lives here; the storage and
//! extraction crates feed this core and the pipeline crate sequences it.

pub mod lineage;
pub mod model;
pub mod normalize;
pub mod policy;
pub mod qa;
pub mod scoring;
pub mod snapshot;
pub mod time;
pub mod validate;

pub use lineage::*;
pub use model::*;
pub use normalize::*;
pub use policy::*;
pub use qa::*;
pub use scoring::*;
pub use snapshot::*;
pub use time::*;
pub use validate::*;
