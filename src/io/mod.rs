//! I/O layer: scene catalogs backed by GeoTIFF bands, the GeoJSON region,
//! reference CSV tables, and `writers` for GeoTIFF/JPEG outputs and sidecars.
pub mod catalog;
pub use catalog::{Catalog, SceneEntry};

pub mod geotiff;
pub use geotiff::{BandRead, read_band};

pub mod reference;
pub use reference::{read_reference_csv, write_reference_csv};

pub mod region;
pub use region::read_region;

pub mod writers;
