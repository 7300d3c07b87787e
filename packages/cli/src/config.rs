//! TOML batch configuration for the `run` subcommand.
//!
//! ```toml
//! input = "data/tracts.geojson"
//! key = "GEOID"
//! output_dir = "out"
//! format = "csv"
//! alpha = 0.05
//!
//! [[analysis]]
//! kind = "local_moran"
//! attribute = "violent_rate"
//! weights = "queen"
//! permutations = 999
//!
//! [[analysis]]
//! kind = "getis_ord"
//! name = "violent-hot-spots"
//! attribute = "violent_count"
//! weights = { distance_band = { radius = 1500.0 } }
//! variant = "g-star"
//! ```

use std::path::{Path, PathBuf};

use lisa_map_stats::{
    GetisOrdVariant, NullModel, correction::DEFAULT_ALPHA, permutation::DEFAULT_SEED,
};
use serde::Deserialize;
use thiserror::Error;

use crate::input::WeightsSpec;
use crate::output::OutputFormat;

/// Errors loading a batch configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading the config file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Config is not valid TOML for this schema.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Config parsed but lists nothing to run.
    #[error("Config at {0} defines no [[analysis]] entries")]
    Empty(String),
}

/// A batch of analyses over one input file.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    /// `GeoJSON` feature collection to analyze.
    pub input: PathBuf,
    /// Feature property holding the unit key.
    pub key: String,
    /// Directory that receives one output file per analysis.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Output format for every analysis.
    #[serde(default)]
    pub format: OutputFormat,
    /// Nominal significance level.
    #[serde(default = "default_alpha")]
    pub alpha: f64,
    /// Analyses to run, in order.
    #[serde(rename = "analysis", default)]
    pub analyses: Vec<AnalysisConfig>,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

const fn default_alpha() -> f64 {
    DEFAULT_ALPHA
}

const fn default_seed() -> u64 {
    DEFAULT_SEED
}

const fn default_true() -> bool {
    true
}

/// One analysis in a batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalysisConfig {
    /// Local Moran's I.
    LocalMoran(LocalMoranConfig),
    /// Getis-Ord concentration.
    GetisOrd(GetisOrdConfig),
    /// Global Moran's I.
    GlobalMoran(GlobalMoranConfig),
}

/// Settings for a local Moran run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocalMoranConfig {
    /// Output file stem. Defaults to `local_moran_<attribute>`.
    pub name: Option<String>,
    /// Attribute to analyze.
    pub attribute: String,
    /// Neighbor definition.
    pub weights: WeightsSpec,
    /// Null model for the analytical moments.
    #[serde(default)]
    pub null_model: NullModel,
    /// Conditional permutations per unit; zero skips them.
    #[serde(default)]
    pub permutations: usize,
    /// Seed for the permutation RNG.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

/// Settings for a Getis-Ord run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetisOrdConfig {
    /// Output file stem. Defaults to `getis_ord_<attribute>`.
    pub name: Option<String>,
    /// Attribute to analyze. Should be a count or other non-negative
    /// extensive quantity.
    pub attribute: String,
    /// Neighbor definition.
    pub weights: WeightsSpec,
    /// `g-star` (self-inclusive) or `g`.
    #[serde(default)]
    pub variant: GetisOrdVariant,
    /// Apply the Bonferroni threshold to the classification.
    #[serde(default = "default_true")]
    pub bonferroni: bool,
}

/// Settings for a global Moran run.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GlobalMoranConfig {
    /// Output file stem. Defaults to `global_moran_<attribute>`.
    pub name: Option<String>,
    /// Attribute to analyze.
    pub attribute: String,
    /// Neighbor definition.
    pub weights: WeightsSpec,
    /// Null model for the moments.
    #[serde(default)]
    pub null_model: NullModel,
}

impl AnalysisConfig {
    /// Attribute the analysis reads.
    #[must_use]
    pub fn attribute(&self) -> &str {
        match self {
            Self::LocalMoran(c) => &c.attribute,
            Self::GetisOrd(c) => &c.attribute,
            Self::GlobalMoran(c) => &c.attribute,
        }
    }

    /// Neighbor definition the analysis runs over.
    #[must_use]
    pub const fn weights(&self) -> WeightsSpec {
        match self {
            Self::LocalMoran(c) => c.weights,
            Self::GetisOrd(c) => c.weights,
            Self::GlobalMoran(c) => c.weights,
        }
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::LocalMoran(_) => "local_moran",
            Self::GetisOrd(_) => "getis_ord",
            Self::GlobalMoran(_) => "global_moran",
        }
    }

    /// Output file stem, explicit or derived from kind and attribute.
    #[must_use]
    pub fn name(&self) -> String {
        let explicit = match self {
            Self::LocalMoran(c) => c.name.as_ref(),
            Self::GetisOrd(c) => c.name.as_ref(),
            Self::GlobalMoran(c) => c.name.as_ref(),
        };
        explicit.map_or_else(
            || format!("{}_{}", self.kind(), self.attribute()),
            Clone::clone,
        )
    }
}

impl BatchConfig {
    /// Loads and parses a batch config file.
    ///
    /// # Errors
    ///
    /// * If the file cannot be read or parsed
    /// * [`ConfigError::Empty`] if it lists no analyses
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        if config.analyses.is_empty() {
            return Err(ConfigError::Empty(path.display().to_string()));
        }
        Ok(config)
    }
}
