//! Core processing building blocks: raster and collection model, region,
//! compositing and feature derivation, classification, legend, and the
//! stage pipeline. These are internal primitives consumed by the high-level
//! `api` module.
pub mod classify;
pub mod collection;
pub mod legend;
pub mod params;
pub mod processing;
pub mod raster;
pub mod region;
