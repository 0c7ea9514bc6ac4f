//! Stage orchestration without I/O: composites, feature stack, reference
//! preparation, training, validation and per-pixel classification. Every
//! stage takes its inputs and configuration explicitly and returns values.
use ndarray::Array2;
use tracing::{info, warn};

use crate::core::classify::accuracy::ErrorMatrix;
use crate::core::classify::apply::{classify_image, to_class_u8, to_percent_u8};
use crate::core::classify::forest::{RandomForest, RandomForestModel};
use crate::core::classify::reference::{CLASSIFICATION_COLUMN, ReferenceSet};
use crate::core::classify::{Classifier, classify_points};
use crate::core::collection::ImageCollection;
use crate::core::params::PipelineConfig;
use crate::core::processing::composite::{optical_composite, radar_composite};
use crate::core::processing::features::feature_stack;
use crate::core::raster::{Grid, Image};
use crate::core::region::RegionOfInterest;
use crate::error::{Error, Result};
use crate::types::OutputMode;

/// Composite both collections and assemble the configured feature stack.
pub fn build_feature_stack(
    optical: ImageCollection,
    radar: ImageCollection,
    region: &RegionOfInterest,
    config: &PipelineConfig,
) -> Result<Image> {
    let optical = optical_composite(optical, region, &config.optical)?;
    let radar = radar_composite(radar, region, &config.radar)?;
    optical.grid.ensure_same(&radar.grid)?;
    feature_stack(optical, &radar, &config.feature_bands)
}

/// Reference points with the partition key assigned and feature values
/// sampled from the stack when the table does not carry them.
pub fn prepare_reference(reference: ReferenceSet, stack: &Image, config: &PipelineConfig) -> Result<ReferenceSet> {
    if reference.is_empty() {
        return Err(Error::EmptyInput("reference table has no points".to_string()));
    }
    let keyed = reference.random_column(config.split_seed);
    if keyed.has_features(&config.feature_bands) {
        Ok(keyed)
    } else {
        info!("Sampling {} feature bands at reference points", config.feature_bands.len());
        Ok(keyed.sample(stack))
    }
}

/// Training and validation partitions of one labelling of the reference.
#[derive(Debug, Clone)]
pub struct Partition {
    pub training: ReferenceSet,
    pub validation: ReferenceSet,
}

impl Partition {
    pub fn split(reference: &ReferenceSet, split: f64) -> Result<Self> {
        let (training, validation) = reference.partition(split)?;
        if training.is_empty() {
            return Err(Error::EmptyInput(format!(
                "training partition is empty ({} points, split {})",
                reference.len(),
                split
            )));
        }
        if validation.is_empty() {
            warn!("Validation partition is empty; accuracy figures will be undefined");
        }
        Ok(Self {
            training,
            validation,
        })
    }
}

#[derive(Debug, Clone)]
pub struct TrainedModels {
    /// Multi-class model on the original labels.
    pub classifier: RandomForestModel,
    /// Binary probability model on the remapped labels.
    pub probability: RandomForestModel,
    pub classes: Partition,
    pub binary: Partition,
}

/// Train both forests. The binary labelling reuses the partition key, so both
/// models see the same training points.
pub fn train_models(reference: &ReferenceSet, config: &PipelineConfig) -> Result<TrainedModels> {
    let classes = Partition::split(reference, config.split)?;
    let binary = Partition::split(&reference.remap(&config.remap)?, config.split)?;

    let classifier = RandomForest::new(config.classifier.clone()).train(
        &classes.training,
        &config.label_column,
        &config.feature_bands,
    )?;
    let probability = RandomForest::new(config.probability_classifier.clone())
        .with_output_mode(OutputMode::Probability)
        .train(&binary.training, &config.label_column, &config.feature_bands)?;

    Ok(TrainedModels {
        classifier,
        probability,
        classes,
        binary,
    })
}

/// Validation table with predictions and the error matrices of both models.
#[derive(Debug, Clone)]
pub struct Validation {
    pub table: ReferenceSet,
    pub matrix: ErrorMatrix,
    /// Probability model thresholded at 0.5 against the binary labels.
    pub binary_matrix: ErrorMatrix,
}

fn predicted_pairs(table: &ReferenceSet, label: &str, threshold: Option<f64>) -> Vec<(i64, i64)> {
    table
        .points
        .iter()
        .filter_map(|p| {
            let actual = p.label(label)?;
            let predicted = p.properties.get(CLASSIFICATION_COLUMN)?;
            let predicted = match threshold {
                Some(t) => i64::from(*predicted >= t),
                None => predicted.round() as i64,
            };
            Some((actual, predicted))
        })
        .collect()
}

pub fn validate(models: &TrainedModels, config: &PipelineConfig) -> Result<Validation> {
    let table = classify_points(&models.classifier, &models.classes.validation);
    let pairs = predicted_pairs(&table, &config.label_column, None);
    let unclassified = table.len() - pairs.len();
    if unclassified > 0 {
        warn!("{} validation points could not be classified", unclassified);
    }
    let matrix = ErrorMatrix::from_pairs(pairs, config.class_count)?;

    let binary_table = classify_points(&models.probability, &models.binary.validation);
    let binary_matrix = ErrorMatrix::from_pairs(predicted_pairs(&binary_table, &config.label_column, Some(0.5)), 2)?;

    info!(
        "Validation: overall accuracy {:.4}, kappa {:.4} ({} right, {} wrong); binary accuracy {:.4}",
        matrix.overall_accuracy(),
        matrix.kappa(),
        matrix.correct(),
        matrix.total() - matrix.correct(),
        binary_matrix.overall_accuracy()
    );
    Ok(Validation {
        table,
        matrix,
        binary_matrix,
    })
}

/// 8-bit class and probability-percent rasters on the stack grid.
#[derive(Debug, Clone)]
pub struct ClassifiedRasters {
    pub grid: Grid,
    pub classes: Array2<u8>,
    pub percent: Array2<u8>,
}

pub fn classify_stack(models: &TrainedModels, stack: &Image, nodata: u8) -> Result<ClassifiedRasters> {
    let classes = classify_image(&models.classifier, stack)?;
    let probability = classify_image(&models.probability, stack)?;
    Ok(ClassifiedRasters {
        grid: stack.grid.clone(),
        classes: to_class_u8(classes.band("classification")?, nodata),
        percent: to_percent_u8(probability.band("probability")?, nodata),
    })
}

/// Everything the pipeline computes, before anything is written.
#[derive(Debug, Clone)]
pub struct PipelineOutputs {
    pub stack: Image,
    pub models: TrainedModels,
    pub validation: Validation,
    pub rasters: ClassifiedRasters,
}

pub fn execute(
    optical: ImageCollection,
    radar: ImageCollection,
    region: &RegionOfInterest,
    reference: ReferenceSet,
    config: &PipelineConfig,
) -> Result<PipelineOutputs> {
    config.validate()?;
    let stack = build_feature_stack(optical, radar, region, config)?;
    let reference = prepare_reference(reference, &stack, config)?;
    let models = train_models(&reference, config)?;
    let validation = validate(&models, config)?;
    let rasters = classify_stack(&models, &stack, config.export.nodata)?;
    Ok(PipelineOutputs {
        stack,
        models,
        validation,
        rasters,
    })
}
