//! Frame graph
//!
//! Stages declare which named buffers they read and write. Compilation checks
//! that every same-frame read has an earlier producer, so the submission order
//! of the deferred pipeline is validated rather than assumed.

pub mod executor;
pub mod graph;
pub mod pass;
pub mod resource;

pub use executor::*;
pub use graph::*;
pub use pass::*;
pub use resource::*;
