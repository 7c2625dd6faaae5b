//! JSON encoding for the files the client keeps on disk.
//!
//! Output is pretty-printed with 2-space indentation and a trailing newline,
//! and map keys come out sorted when the source type uses `BTreeMap`.

mod json;

pub use json::{SerializationError, from_json_bytes, to_json_stable, to_json_stable_bytes};
