//! Deferred Engine - a chunked-world deferred renderer
//!
//! The world is split into square chunks, each holding its models, lights,
//! line models and an optional terrain patch, with an octree over the models.
//! Every frame runs a fixed deferred pipeline against a [`GraphicsBackend`]:
//!
//! - Geometry into a G-buffer, opaque models front-to-back then terrain
//! - Shadow map from the directional light
//! - SSAO and SSR, each optional
//! - Directional light plus stencil light volumes for point lights
//! - Bloom, forward blended models and debug lines
//! - Post-processing to the screen
//!
//! [`backend::SoftwareBackend`] is a reference rasterizer implementing the
//! same fixed-function contract a GPU backend would.
//!
//! [`GraphicsBackend`]: backend::GraphicsBackend

pub mod backend;
pub mod bounds;
pub mod engine;
pub mod error;
pub mod level;
pub mod pipeline;
pub mod render_graph;
pub mod resources;
pub mod scene;
pub mod spatial;

pub use engine::{Engine, EngineConfig};
pub use error::{EngineError, EngineResult};
