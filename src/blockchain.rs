// Thin re-export module: implementation is in `blockchain/core.rs`, split into
// block construction, integrity checks and head state.

pub mod core;
pub use core::*;
