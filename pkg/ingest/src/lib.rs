//! Reading and decoding audit-event and RBAC-object sources.
//!
//! Sources are files, http(s) URLs, or stdin. Each source is decoded as
//! either a stream of JSON objects or a multi-document YAML stream, `List`
//! wrappers are flattened, and the documents are narrowed to audit events or
//! RBAC objects. Per-source and per-document failures are collected rather
//! than aborting the run.

pub mod decode;
pub mod filter;
pub mod source;

pub use decode::{decode_documents, events_from_documents, flatten_documents, rbac_from_documents};
pub use filter::{events_to_attributes, filter_events};
pub use source::{open_sources, NamedSource};
