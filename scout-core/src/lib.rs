//! SCOUT Core - Entity Types
//!
//! Pure data structures shared by every SCOUT crate: model configuration rows,
//! consumer requests, upgrade operations, research jobs, errors and config.
//! This crate contains no coordination logic.

pub mod config;
pub mod error;
pub mod identity;
pub mod job;
pub mod model;
pub mod request;
pub mod research;
pub mod upgrade;

pub use config::*;
pub use error::*;
pub use identity::*;
pub use job::*;
pub use model::*;
pub use request::*;
pub use research::*;
pub use upgrade::*;
