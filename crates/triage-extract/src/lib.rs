//! Extraction capability: turns a transcript plus a grounding context into
//! candidate task JSON. The model output is untrusted; structural and
//! referential checks happen downstream.

pub mod context;
pub mod extractor;
pub mod http;

pub use context::{CategoryRef, ExtractionContext, NamedRef};
pub use extractor::{CannedExtractor, ExtractError, Extractor, FailingExtractor};
pub use http::HttpExtractor;
