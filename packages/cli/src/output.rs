//! CSV and JSON writers for analysis results.
//!
//! Non-finite numbers (islands, degenerate variances) become empty CSV
//! cells and JSON `null`s. Local Moran rows carry the cluster label at both
//! the nominal and the Bonferroni threshold so that callers can pick one.

use std::io::Write;

use lisa_map_stats::{
    Concentration, ConcentrationType, GlobalMoranResult, LocalMoran, LocalStatus, Quadrant,
    Significance,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors writing results.
#[derive(Debug, Error)]
pub enum OutputError {
    /// I/O error on the destination.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV serialization failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    /// JSON serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialization format for result tables.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One header row plus one row per unit.
    #[default]
    Csv,
    /// Pretty-printed array of objects.
    Json,
}

impl OutputFormat {
    /// File extension for this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

#[derive(Debug, Serialize)]
struct LocalMoranRow<'a> {
    key: &'a str,
    value: f64,
    centered: f64,
    lag: Option<f64>,
    i: Option<f64>,
    expected: Option<f64>,
    variance: Option<f64>,
    z_score: Option<f64>,
    p_value: Option<f64>,
    p_sim: Option<f64>,
    quadrant: Option<Quadrant>,
    cluster: Option<Quadrant>,
    cluster_corrected: Option<Quadrant>,
    status: LocalStatus,
}

#[derive(Debug, Serialize)]
struct ConcentrationRow<'a> {
    key: &'a str,
    value: f64,
    statistic: Option<f64>,
    expected: Option<f64>,
    variance: Option<f64>,
    z_score: Option<f64>,
    p_value: Option<f64>,
    concentration: ConcentrationType,
    status: LocalStatus,
}

#[derive(Debug, Serialize)]
struct GlobalMoranRow {
    i: f64,
    expected: f64,
    variance: Option<f64>,
    z_score: Option<f64>,
    p_value: Option<f64>,
    null_model: lisa_map_stats::NullModel,
}

fn write_rows<T: Serialize, W: Write>(
    rows: &[T],
    format: OutputFormat,
    mut writer: W,
) -> Result<(), OutputError> {
    match format {
        OutputFormat::Csv => {
            let mut csv = csv::Writer::from_writer(writer);
            for row in rows {
                csv.serialize(row)?;
            }
            csv.flush()?;
        }
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut writer, rows)?;
            writeln!(writer)?;
        }
    }
    Ok(())
}

/// Writes one row per unit of a local Moran run.
///
/// # Errors
///
/// * If serialization or the underlying writer fails
pub fn write_local_moran<W: Write>(
    result: &LocalMoran,
    significance: &Significance,
    format: OutputFormat,
    writer: W,
) -> Result<(), OutputError> {
    let rows: Vec<LocalMoranRow<'_>> = result
        .iter()
        .map(|r| LocalMoranRow {
            key: &r.key,
            value: r.value,
            centered: r.centered,
            lag: finite(r.lag),
            i: finite(r.i),
            expected: finite(r.expected),
            variance: finite(r.variance),
            z_score: finite(r.z_score),
            p_value: finite(r.p_value),
            p_sim: r.p_sim,
            quadrant: r.quadrant,
            cluster: r.cluster(significance.alpha),
            cluster_corrected: r.cluster(significance.corrected),
            status: r.status,
        })
        .collect();
    write_rows(&rows, format, writer)
}

/// Writes one row per unit of a Getis-Ord run.
///
/// # Errors
///
/// * If serialization or the underlying writer fails
pub fn write_concentration<W: Write>(
    result: &Concentration,
    format: OutputFormat,
    writer: W,
) -> Result<(), OutputError> {
    let rows: Vec<ConcentrationRow<'_>> = result
        .iter()
        .map(|r| ConcentrationRow {
            key: &r.key,
            value: r.value,
            statistic: finite(r.statistic),
            expected: finite(r.expected),
            variance: finite(r.variance),
            z_score: finite(r.z_score),
            p_value: finite(r.p_value),
            concentration: r.concentration,
            status: r.status,
        })
        .collect();
    write_rows(&rows, format, writer)
}

/// Writes a single-row table for a global Moran run.
///
/// # Errors
///
/// * If serialization or the underlying writer fails
pub fn write_global_moran<W: Write>(
    result: &GlobalMoranResult,
    format: OutputFormat,
    writer: W,
) -> Result<(), OutputError> {
    let row = GlobalMoranRow {
        i: result.i,
        expected: result.expected,
        variance: finite(result.variance),
        z_score: finite(result.z_score),
        p_value: finite(result.p_value),
        null_model: result.null_model,
    };
    write_rows(&[row], format, writer)
}

#[cfg(test)]
mod tests {
    use lisa_map_stats::{
        ConcentrationOptions, GetisOrdVariant, LocalMoranOptions, NullModel, getis_ord,
        global_moran, local_moran,
    };
    use lisa_map_weights::SpatialWeights;

    use super::*;

    fn pair_and_island() -> SpatialWeights {
        SpatialWeights::from_adjacency(
            vec!["A".to_string(), "B".to_string(), "C".to_string()],
            &[vec![1], vec![0], vec![]],
        )
        .unwrap()
    }

    fn render<F: FnOnce(&mut Vec<u8>) -> Result<(), OutputError>>(f: F) -> String {
        let mut buffer = Vec::new();
        f(&mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn local_moran_csv_blanks_island_cells() {
        let weights = pair_and_island().row_standardized();
        let result =
            local_moran(&[10.0, 10.0, 5.0], &weights, &LocalMoranOptions::default()).unwrap();
        let significance = Significance::bonferroni(0.05, 3).unwrap();

        let text = render(|out| write_local_moran(&result, &significance, OutputFormat::Csv, out));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("key,value,centered,lag,i,"));
        assert!(lines[0].ends_with(",quadrant,cluster,cluster_corrected,status"));
        assert!(lines[1].starts_with("A,10.0,"));
        assert!(lines[1].contains(",HH,"));
        assert!(lines[3].starts_with("C,5.0,"));
        assert!(lines[3].ends_with(",,,,undefined"));
    }

    #[test]
    fn concentration_json_uses_nulls() {
        let weights = pair_and_island();
        let options = ConcentrationOptions {
            variant: GetisOrdVariant::G,
            ..ConcentrationOptions::default()
        };
        let result = getis_ord(&[4.0, 6.0, 10.0], &weights, &options).unwrap();

        let text = render(|out| write_concentration(&result, OutputFormat::Json, out));
        let rows: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(rows.as_array().unwrap().len(), 3);
        assert_eq!(rows[0]["key"], "A");
        assert!(rows[0]["z_score"].is_number());
        assert_eq!(rows[0]["status"], "valid");

        // C has no neighbors once its own value is excluded
        assert!(rows[2]["statistic"].is_null());
        assert!(rows[2]["z_score"].is_null());
        assert_eq!(rows[2]["status"], "undefined");
    }

    #[test]
    fn global_moran_is_one_row() {
        let weights = pair_and_island().row_standardized();
        let result = global_moran(&[10.0, 10.0, 5.0], &weights, NullModel::Normality).unwrap();

        let text = render(|out| write_global_moran(&result, OutputFormat::Csv, out));
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "i,expected,variance,z_score,p_value,null_model");
        assert!(lines[1].ends_with(",normality"));
    }
}
