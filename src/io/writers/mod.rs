//! Output writers: GeoTIFF, world/projection files, JSON sidecars and JPEG quicklooks.
pub mod jpeg;
pub mod metadata;
pub mod tiff;
pub mod worldfile;
