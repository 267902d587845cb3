//! Deterministic Record Canonicalization
//!
//! Turns a record's field mapping into a reproducible byte string and a
//! fixed-width fingerprint. The canonical form is what gets hashed and
//! anchored; any ambiguity here silently breaks tamper-evidence.

pub mod fingerprint;
pub mod serialize;

pub use fingerprint::{Fingerprint, FINGERPRINT_HEX_LEN, FINGERPRINT_PREFIX};
pub use serialize::Canonicalizer;
