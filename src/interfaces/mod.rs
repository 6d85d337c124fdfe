//! Boundary codecs: gateway webhook payloads, the JSONL replay stream, and
//! the CSV wallet summary.

pub mod csv;
pub mod replay;
pub mod webhook;
