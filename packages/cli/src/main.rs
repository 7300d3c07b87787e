#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line runner for local spatial association analyses.
//!
//! ```text
//! lisa_map local-moran --input tracts.geojson --attribute rate [--permutations 999]
//! lisa_map getis-ord --input tracts.geojson --attribute count --radius 1500 [--variant g]
//! lisa_map global-moran --input tracts.geojson --attribute rate [--contiguity rook]
//! lisa_map run --config batch.toml
//! ```
//!
//! Single analyses write to `--output` or stdout. `run` executes every
//! `[[analysis]]` of a TOML batch and writes one file per analysis.

mod config;
mod input;
mod output;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use lisa_map_cli_utils::{IndicatifProgress, ProgressCallback};
use lisa_map_stats::{
    ConcentrationOptions, ConcentrationType, GetisOrdVariant, LocalMoranOptions, NullModel,
    Significance, correction::DEFAULT_ALPHA, getis_ord, global_moran, local_moran,
    permutation::DEFAULT_SEED,
};

use crate::config::{
    AnalysisConfig, BatchConfig, GetisOrdConfig, GlobalMoranConfig, LocalMoranConfig,
};
use crate::input::{Dataset, WeightsSpec};
use crate::output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "lisa_map",
    about = "Local spatial association statistics over GeoJSON features"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Local Moran's I with quadrant clusters
    LocalMoran {
        #[command(flatten)]
        common: CommonArgs,
        /// Null model for the analytical moments
        #[arg(long, value_enum, default_value_t = NullArg::Randomization)]
        null: NullArg,
        /// Conditional permutations per unit (0 skips them)
        #[arg(long, default_value_t = 0)]
        permutations: usize,
        /// Seed for the permutation RNG
        #[arg(long, default_value_t = DEFAULT_SEED)]
        seed: u64,
    },
    /// Getis-Ord G*/G hot and cold spots
    GetisOrd {
        #[command(flatten)]
        common: CommonArgs,
        /// Self-inclusive G* or self-exclusive G
        #[arg(long, value_enum, default_value_t = VariantArg::GStar)]
        variant: VariantArg,
        /// Classify against the nominal level instead of the Bonferroni threshold
        #[arg(long)]
        no_bonferroni: bool,
    },
    /// Global Moran's I
    GlobalMoran {
        #[command(flatten)]
        common: CommonArgs,
        /// Null model for the moments
        #[arg(long, value_enum, default_value_t = NullArg::Randomization)]
        null: NullArg,
    },
    /// Run every analysis in a TOML batch config
    Run {
        /// Path to the batch config
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// `GeoJSON` feature collection to analyze
    #[arg(long)]
    input: PathBuf,
    /// Feature property holding the unit key
    #[arg(long, default_value = "GEOID")]
    key: String,
    /// Numeric feature property to analyze
    #[arg(long)]
    attribute: String,
    /// Contiguity rule for polygon features
    #[arg(long, value_enum, default_value_t = ContiguityArg::Queen)]
    contiguity: ContiguityArg,
    /// Distance-band radius in coordinate units (overrides --contiguity)
    #[arg(long)]
    radius: Option<f64>,
    /// Nominal significance level
    #[arg(long, default_value_t = DEFAULT_ALPHA)]
    alpha: f64,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,
    /// Output file (defaults to stdout)
    #[arg(long)]
    output: Option<PathBuf>,
}

impl CommonArgs {
    fn weights(&self) -> WeightsSpec {
        match (self.radius, self.contiguity) {
            (Some(radius), _) => WeightsSpec::DistanceBand { radius },
            (None, ContiguityArg::Queen) => WeightsSpec::Queen,
            (None, ContiguityArg::Rook) => WeightsSpec::Rook,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ContiguityArg {
    Queen,
    Rook,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum NullArg {
    Randomization,
    Normality,
}

impl From<NullArg> for NullModel {
    fn from(value: NullArg) -> Self {
        match value {
            NullArg::Randomization => Self::Randomization,
            NullArg::Normality => Self::Normality,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum VariantArg {
    GStar,
    G,
}

impl From<VariantArg> for GetisOrdVariant {
    fn from(value: VariantArg) -> Self {
        match value {
            VariantArg::GStar => Self::GStar,
            VariantArg::G => Self::G,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = lisa_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let (common, analysis) = match cli.command {
        Commands::LocalMoran {
            common,
            null,
            permutations,
            seed,
        } => {
            let analysis = AnalysisConfig::LocalMoran(LocalMoranConfig {
                name: None,
                attribute: common.attribute.clone(),
                weights: common.weights(),
                null_model: null.into(),
                permutations,
                seed,
            });
            (common, analysis)
        }
        Commands::GetisOrd {
            common,
            variant,
            no_bonferroni,
        } => {
            let analysis = AnalysisConfig::GetisOrd(GetisOrdConfig {
                name: None,
                attribute: common.attribute.clone(),
                weights: common.weights(),
                variant: variant.into(),
                bonferroni: !no_bonferroni,
            });
            (common, analysis)
        }
        Commands::GlobalMoran { common, null } => {
            let analysis = AnalysisConfig::GlobalMoran(GlobalMoranConfig {
                name: None,
                attribute: common.attribute.clone(),
                weights: common.weights(),
                null_model: null.into(),
            });
            (common, analysis)
        }
        Commands::Run { config } => {
            let config = BatchConfig::load(&config)?;
            let progress = IndicatifProgress::batch_bar(&multi, "Running analyses");
            return run_batch(&config, progress.as_ref());
        }
    };

    let dataset = Dataset::from_path(&common.input, &common.key)?;
    let writer: Box<dyn Write> = match &common.output {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    execute(&dataset, &analysis, common.alpha, common.format, writer)?;

    if let Some(path) = &common.output {
        log::info!("Wrote {}", path.display());
    }

    Ok(())
}

/// Runs every analysis of a batch, one output file each.
fn run_batch(
    config: &BatchConfig,
    progress: &dyn ProgressCallback,
) -> Result<(), Box<dyn std::error::Error>> {
    let dataset = Dataset::from_path(&config.input, &config.key)?;
    std::fs::create_dir_all(&config.output_dir)?;

    progress.set_total(config.analyses.len() as u64);

    for analysis in &config.analyses {
        let name = analysis.name();
        progress.set_message(name.clone());

        let path = config
            .output_dir
            .join(format!("{name}.{}", config.format.extension()));
        let writer = BufWriter::new(File::create(&path)?);
        execute(&dataset, analysis, config.alpha, config.format, writer)?;

        log::info!("Wrote {}", path.display());
        progress.inc(1);
    }

    progress.finish(format!(
        "{} analyses written to {}",
        config.analyses.len(),
        config.output_dir.display()
    ));

    Ok(())
}

/// Computes one analysis over `dataset` and writes its table.
fn execute<W: Write>(
    dataset: &Dataset,
    analysis: &AnalysisConfig,
    alpha: f64,
    format: OutputFormat,
    writer: W,
) -> Result<(), Box<dyn std::error::Error>> {
    let attribute = dataset.attribute(analysis.attribute())?;
    let weights = dataset.weights(analysis.weights())?;
    let values = weights.align(&attribute)?;

    log::info!(
        "{} over '{}' with {} ({} units, {} islands)",
        analysis.name(),
        analysis.attribute(),
        analysis.weights(),
        weights.len(),
        weights.islands().len()
    );

    match analysis {
        AnalysisConfig::LocalMoran(c) => {
            let options = LocalMoranOptions {
                null_model: c.null_model,
                permutations: c.permutations,
                seed: c.seed,
            };
            let result = local_moran(&values, &weights.row_standardized(), &options)?;
            let significance = Significance::bonferroni(alpha, result.len())?;

            log::info!(
                "I = {:.4}; {} units significant at {alpha}, {} at Bonferroni {:.3e}",
                result.total(),
                result.significant(significance.alpha).count(),
                result.significant(significance.corrected).count(),
                significance.corrected
            );

            output::write_local_moran(&result, &significance, format, writer)?;
        }
        AnalysisConfig::GetisOrd(c) => {
            let options = ConcentrationOptions {
                variant: c.variant,
                alpha,
                bonferroni: c.bonferroni,
                tests: None,
            };
            let result = getis_ord(&values, &weights.binary(), &options)?;

            log::info!(
                "{}: {} hot spots, {} cold spots at {:.3e}",
                c.variant,
                result.of_type(ConcentrationType::High).count(),
                result.of_type(ConcentrationType::Low).count(),
                result.threshold
            );

            output::write_concentration(&result, format, writer)?;
        }
        AnalysisConfig::GlobalMoran(c) => {
            let result = global_moran(&values, &weights.row_standardized(), c.null_model)?;

            log::info!(
                "I = {:.4} (E = {:.4}, z = {:.3}, p = {:.3e})",
                result.i,
                result.expected,
                result.z_score,
                result.p_value
            );

            output::write_global_moran(&result, format, writer)?;
        }
    }

    Ok(())
}
