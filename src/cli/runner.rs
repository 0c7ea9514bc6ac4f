use std::path::Path;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use covermap::api::{build_composite, run_pipeline, validate_table, write_image_bands};
use covermap::core::classify::accuracy::AccuracySummary;
use covermap::PipelineConfig;

use super::args::{CliArgs, Command};
use super::errors::AppError;

fn init_logging(args: &CliArgs) -> Result<(), AppError> {
    if !args.log && !args.verbose {
        return Ok(());
    }
    let default = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .map_err(|e| AppError::LogFilter(e.to_string()))?;
    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, AppError> {
    match path {
        Some(p) => {
            info!("Loading configuration from {:?}", p);
            Ok(PipelineConfig::load(p)?)
        }
        None => {
            warn!("No --config given; using built-in defaults");
            Ok(PipelineConfig::default())
        }
    }
}

fn fmt_ratio(v: f64) -> String {
    if v.is_nan() { "n/a".to_string() } else { format!("{:.4}", v) }
}

fn print_accuracy(title: &str, summary: &AccuracySummary) {
    println!("{title}");
    println!("  error matrix (rows = reference, columns = predicted):");
    for (i, row) in summary.matrix.iter().enumerate() {
        let cells: Vec<String> = row.iter().map(|c| format!("{c:>5}")).collect();
        println!("  {i:>3} |{}", cells.join(""));
    }
    println!("  overall accuracy: {}", fmt_ratio(summary.overall_accuracy));
    println!("  kappa:            {}", fmt_ratio(summary.kappa));
    println!("  right / wrong:    {} / {}", summary.right, summary.wrong);
    for (i, (p, c)) in summary
        .producers_accuracy
        .iter()
        .zip(&summary.consumers_accuracy)
        .enumerate()
    {
        println!("  class {i:>2}: producer's {}  consumer's {}", fmt_ratio(*p), fmt_ratio(*c));
    }
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(&args)?;

    match &args.command {
        Command::Run {
            seed,
            prefix,
            no_quicklooks,
        } => {
            let mut config = load_config(args.config.as_deref())?;
            if let Some(seed) = *seed {
                config.split_seed = Some(seed);
                config.classifier.seed = Some(seed);
                config.probability_classifier.seed = Some(seed.wrapping_add(1));
            }
            if let Some(prefix) = prefix {
                config.storage.prefix = prefix.clone();
            }
            if *no_quicklooks {
                config.write_quicklooks = false;
            }
            let report = run_pipeline(&config)?;
            print_accuracy("Classification", &report.classification.accuracy);
            print_accuracy("Oil palm probability (threshold 0.5)", &report.probability.accuracy);
            for export in &report.exports {
                println!("{}: {}", export.description, export.destination.display());
            }
            println!("Validation table: {}", report.validation_table.display());
        }
        Command::Composite { output, reducer } => {
            let mut config = load_config(args.config.as_deref())?;
            if let Some(reducer) = *reducer {
                config.optical.reducer = reducer;
            }
            let stack = build_composite(&config)?;
            let written = write_image_bands(&stack, output)?;
            info!("Wrote {} bands to {:?}", written.len(), output);
            for path in written {
                println!("{}", path.display());
            }
        }
        Command::Validate { input } => {
            let config = load_config(args.config.as_deref())?;
            let summary = validate_table(input, &config.label_column, config.class_count)?;
            print_accuracy("Classification", &summary);
        }
        Command::Legend => {
            let config = load_config(args.config.as_deref())?;
            print!("{}", config.legend.render_text());
        }
        Command::InitConfig { output, force } => {
            if output.exists() && !force {
                return Err(AppError::WouldOverwrite { path: output.clone() }.into());
            }
            PipelineConfig::default().save(output)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }
    Ok(())
}
