#![doc = r#"
covermap: multi-sensor land-cover mapping.

This crate turns a stack of optical (Sentinel-2 style) and radar (Sentinel-1 GRD style)
scenes into a land-cover map: it masks clouds, builds temporal composites, derives
spectral indices, trains a random forest on a labelled reference table, validates it
with an error matrix, and exports u8 GeoTIFFs with legends and confidence quicklooks.
It powers the `covermap` CLI and can be embedded in your own Rust applications.

Stability
---------
The public library API is experimental in initial releases and may evolve.
Breaking changes can occur.

Inputs
------
- Two scene catalogs (JSON manifests listing per-band GeoTIFF files, dates and properties).
- A GeoJSON region of interest.
- A reference CSV with `x`, `y`, the label column and optionally `random` and band values.

Quick start: run the whole pipeline
-----------------------------------
```rust,no_run
use std::path::Path;
use covermap::{PipelineConfig, run_pipeline};

fn main() -> covermap::Result<()> {
    let mut config = PipelineConfig::load(Path::new("covermap.json"))?;
    config.split_seed = Some(7);
    config.classifier.seed = Some(7);

    let report = run_pipeline(&config)?;
    println!(
        "overall accuracy {:.3}, kappa {:.3}",
        report.classification.accuracy.overall_accuracy,
        report.classification.accuracy.kappa,
    );
    Ok(())
}
```

Train and apply a forest yourself
---------------------------------
```rust,no_run
use covermap::{Classifier, ForestParams, RandomForest, ReferenceSet, classify_image};
use covermap::core::raster::Image;

fn classify(reference: &ReferenceSet, stack: &Image, bands: &[String]) -> covermap::Result<Image> {
    let forest = RandomForest::new(ForestParams {
        number_of_trees: 50,
        seed: Some(1),
        ..ForestParams::default()
    });
    let model = forest.train(reference, "class", bands)?;
    classify_image(&model, stack)
}
```

Accuracy from label pairs
-------------------------
```rust
use covermap::ErrorMatrix;

let pairs = vec![(0, 0), (0, 1), (1, 1), (1, 1)];
let matrix = ErrorMatrix::from_pairs(pairs, 2).unwrap();
assert_eq!(matrix.overall_accuracy(), 0.75);
```

Error handling
--------------
All public functions return `covermap::Result<T>`; match on `covermap::Error` to handle
specific cases, e.g. a missing feature band or an export over the pixel ceiling.

```rust,no_run
use covermap::{Error, PipelineConfig, run_pipeline};

fn main() {
    match run_pipeline(&PipelineConfig::default()) {
        Ok(_) => {}
        Err(Error::MissingFeature { band, .. }) => eprintln!("no band {band} in the stack"),
        Err(Error::ExportTooLarge { description, .. }) => eprintln!("{description} is too large"),
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`]: high-level entry points (`run_pipeline`, `build_composite`, `validate_table`).
- [`core`]: rasters, collections, masking, compositing, the forest and accuracy.
- [`io`]: catalogs, GeoTIFF bands, regions, reference tables and writers.
- [`types`]: small shared enums (`Reducer`, `OutputMode`, `ConfidenceBand`).
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

// Curated public API surface
// Types
pub use core::classify::accuracy::{AccuracySummary, ErrorMatrix};
pub use core::classify::forest::{RandomForest, RandomForestModel};
pub use core::classify::reference::{ReferencePoint, ReferenceSet};
pub use core::classify::{Classifier, Model};
pub use core::legend::{ConfidenceThresholds, Legend};
pub use core::params::{ForestParams, PipelineConfig};
pub use error::{Error, Result};
pub use types::{ConfidenceBand, ExportKind, OutputMode, Reducer};

// Stage helpers
pub use core::classify::apply::classify_image;

// High-level API re-exports
pub use api::{
    Inputs, RunReport, build_composite, load_inputs, run_pipeline, run_with_inputs,
    validate_table, write_image_bands,
};
