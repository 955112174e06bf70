//! Backend abstraction layer
//!
//! Provides the [`GraphicsBackend`] trait the pipeline drives and a software
//! implementation that executes it on the CPU.

pub mod raster;
pub mod software;
pub mod traits;
pub mod types;

pub use software::{DrawRecord, SoftwareBackend, SoftwareStats};
pub use traits::*;
pub use types::*;
