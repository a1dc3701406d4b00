//! QARMA-64 tweakable block cipher.
//!
//! Pure functions only: the pointer-authentication device treats this crate as an opaque,
//! deterministic primitive and never looks at the round structure.

pub mod cipher;
pub mod tables;

pub use cipher::{qarma64_dec, qarma64_enc, Cells};
pub use tables::MAX_ROUNDS;
