//! Raster processing stages: masking, compositing, band math, feature stack,
//! pipeline orchestration, resampling, rendering and export.
pub mod composite;
pub mod features;
pub mod mask;
pub mod ops;
pub mod pipeline;
pub mod render;
pub mod resize;
pub mod save;
