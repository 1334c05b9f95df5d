//! Internal utilities for the Sairyne plugin bridge.
//!
//! Text crosses the content/host boundary in two encodings: percent-escaped
//! inside custom-scheme URLs, and as string literals inside scripts and
//! hand-built JSON. Every escape is applied in a single pass, so one
//! escape rule can never re-interpret the output of another.

pub mod literal;
pub mod percent;

pub use literal::{escape_js_single_quoted, escape_json_string};
pub use percent::{decode_from_transport, encode_for_transport, query_param};
