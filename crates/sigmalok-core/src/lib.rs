//! sigmalok-core: Shared types, errors, and configuration
//!
//! Foundational types used across the sigmalok workspace: box and token
//! identifiers, the candidate-box representation consumed from the node,
//! query vocabulary shared by the client and the selector, and the error
//! taxonomy.

pub mod config;
pub mod errors;
pub mod types;

pub use config::*;
pub use errors::*;
pub use types::*;
