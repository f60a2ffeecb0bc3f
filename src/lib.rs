// ===================================================================================================
// Rivault - Encrypted Cloud-Drive Backend
// ===================================================================================================
//
// Module map, leaves-first:
//   crypto    (C1) - envelope encryption primitives, no I/O
//   blob      (C2) - opaque byte-bag storage, two interchangeable backends
//   metadata  (C3) - the hierarchical node store and its invariants
//   actor     (C5) - one serializing actor per user, owning its MetadataEngine
//   api       (C4) - the stateless HTTP dispatcher
//   commands  - the CLI's client-side half of envelope encryption
//
// `config`, `logging`, and `error` are the ambient stack shared by all of
// the above.
// ===================================================================================================

pub mod actor;
pub mod api;
pub mod blob;
pub mod commands;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod metadata;
