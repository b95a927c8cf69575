//! Core data model.
//!
//! Work items carry traversal state between handlers; records are what the
//! handlers persist.

pub mod record;
pub mod work;
