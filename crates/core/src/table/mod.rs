use serde::{Deserialize, Serialize};

use crate::{timing::Diagnostic, CodecError, Result};

/// One row of encoded performance parameters, matching one score event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRow {
    /// Alignment id of the score event this row describes.
    pub id: String,
    pub onset_beat: f64,
    /// Performed onset in seconds.
    pub onset_sec: f64,
    /// Seconds per beat of the fitted tempo curve at this onset.
    pub beat_period: f64,
    /// `beat_period` relative to the mean beat period of the piece.
    pub ioi_ratio: f64,
    /// Deviation of the performed onset from the tempo curve, in seconds.
    pub timing: f64,
    /// log2 of performed duration over the duration implied by the tempo.
    pub articulation_log: f64,
    pub local_dynamics: f64,
    pub residual_dynamics: f64,
}

impl ParameterRow {
    fn values(&self) -> [f64; 8] {
        [
            self.onset_beat,
            self.onset_sec,
            self.beat_period,
            self.ioi_ratio,
            self.timing,
            self.articulation_log,
            self.local_dynamics,
            self.residual_dynamics,
        ]
    }
}

/// Encoded performance: one row per score event, in score order, plus the
/// tempo normalisation needed to decode it again.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterTable {
    pub rows: Vec<ParameterRow>,
    /// Performance time of the first score onset.
    pub origin_sec: f64,
    /// Mean seconds per beat over the unique onsets; scales `ioi_ratio`.
    pub mean_beat_period: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl ParameterTable {
    /// Numeric column schema, in the order produced by [`Self::to_matrix`].
    pub const COLUMNS: [&'static str; 8] = [
        "onset_beat",
        "onset_sec",
        "beat_period",
        "ioi_ratio",
        "timing",
        "articulation_log",
        "local_dynamics",
        "residual_dynamics",
    ];

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Extracts a single numeric column by name.
    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        let index = Self::COLUMNS
            .iter()
            .position(|column| *column == name)
            .ok_or_else(|| CodecError::input(format!("unknown parameter column `{name}`")))?;

        Ok(self.rows.iter().map(|row| row.values()[index]).collect())
    }

    /// Row-major numeric view of the table, columns as in [`Self::COLUMNS`].
    pub fn to_matrix(&self) -> Vec<Vec<f64>> {
        self.rows.iter().map(|row| row.values().to_vec()).collect()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: &str, onset_beat: f64) -> ParameterRow {
        ParameterRow {
            id: id.to_string(),
            onset_beat,
            onset_sec: onset_beat * 0.5,
            beat_period: 0.5,
            ioi_ratio: 1.0,
            timing: 0.0,
            articulation_log: -1.0,
            local_dynamics: 4.0,
            residual_dynamics: 60.0,
        }
    }

    #[test]
    fn extracts_columns_by_name() {
        let table = ParameterTable {
            rows: vec![row("a", 0.0), row("b", 1.0)],
            origin_sec: 0.0,
            mean_beat_period: 0.5,
            diagnostics: Vec::new(),
        };

        assert_eq!(table.column("onset_sec").unwrap(), vec![0.0, 0.5]);
        assert_eq!(table.column("residual_dynamics").unwrap(), vec![60.0, 60.0]);
        assert!(table.column("velocity").is_err());
    }

    #[test]
    fn matrix_follows_column_schema() {
        let table = ParameterTable {
            rows: vec![row("a", 2.0)],
            ..Default::default()
        };

        let matrix = table.to_matrix();
        assert_eq!(matrix.len(), 1);
        assert_eq!(matrix[0].len(), ParameterTable::COLUMNS.len());
        assert_eq!(matrix[0][0], 2.0);
        assert_eq!(matrix[0][6], 4.0);
    }

    #[test]
    fn json_omits_empty_diagnostics() {
        let table = ParameterTable {
            rows: vec![row("a", 0.0)],
            origin_sec: 1.0,
            mean_beat_period: 0.5,
            diagnostics: Vec::new(),
        };

        let text = table.to_json().unwrap();
        assert!(!text.contains("diagnostics"));
        assert_eq!(ParameterTable::from_json_str(&text).unwrap(), table);
    }
}
