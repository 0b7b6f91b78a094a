use serde::{Deserialize, Serialize};

use crate::{
    config::validate_window_width,
    score::{OnsetAggregate, UniqueOnsets},
    CodecError, DecompositionStrategy, PerformanceEvent, Result, ScoreEvent,
};

/// Named components every decomposition produces, in column order.
pub const COMPONENTS: [&str; 2] = ["local_dynamics", "residual_dynamics"];

/// Per-note split of the observed loudness. `local[i] + residual[i]`
/// reproduces the observed value of note `i`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicsDecomposition {
    pub local: Vec<f64>,
    pub residual: Vec<f64>,
}

impl DynamicsDecomposition {
    pub fn len(&self) -> usize {
        self.local.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local.is_empty()
    }
}

/// Dynamics codec selected by [`DecompositionStrategy`].
#[derive(Debug, Clone, PartialEq)]
pub enum DynamicsCodec {
    Onsetwise(OnsetwiseDecompositionCodec),
    Constant(ConstantTrendCodec),
}

impl DynamicsCodec {
    /// Selects the codec for `strategy`. The window width only applies to
    /// [`DecompositionStrategy::Onsetwise`].
    pub fn new(strategy: DecompositionStrategy, window_width: usize) -> Result<Self> {
        Ok(match strategy {
            DecompositionStrategy::Onsetwise => {
                Self::Onsetwise(OnsetwiseDecompositionCodec::new(window_width)?)
            }
            DecompositionStrategy::Constant => Self::Constant(ConstantTrendCodec),
        })
    }

    /// Strategy this codec implements.
    pub fn strategy(&self) -> DecompositionStrategy {
        match self {
            Self::Onsetwise(_) => DecompositionStrategy::Onsetwise,
            Self::Constant(_) => DecompositionStrategy::Constant,
        }
    }

    /// Names of the decomposition components, see [`COMPONENTS`].
    pub fn components(&self) -> &'static [&'static str] {
        &COMPONENTS
    }

    /// Splits the peak loudness of aligned note pairs. `performance[i]` is the
    /// rendering of `score[i]`; the pairs may come in any onset order and the
    /// result follows the input order.
    pub fn decompose(
        &self,
        performance: &[PerformanceEvent],
        score: &[ScoreEvent],
    ) -> Result<DynamicsDecomposition> {
        if performance.len() != score.len() {
            return Err(CodecError::alignment(format!(
                "cannot decompose {} performed notes against {} score notes",
                performance.len(),
                score.len()
            )));
        }

        let mut order: Vec<usize> = (0..score.len()).collect();
        order.sort_by(|&a, &b| score[a].onset_beat.total_cmp(&score[b].onset_beat));

        let sorted_onsets: Vec<f64> = order.iter().map(|&i| score[i].onset_beat).collect();
        let sorted_observed: Vec<f64> = order
            .iter()
            .map(|&i| performance[i].peak_loudness)
            .collect();
        let onsets = UniqueOnsets::from_sorted(&sorted_onsets);

        let trend = match self {
            Self::Onsetwise(codec) => codec.trend(&onsets, &sorted_observed),
            Self::Constant(codec) => codec.trend(&onsets, &sorted_observed),
        };

        let mut residual = vec![0.0; score.len()];
        for (value, &index) in onsets.onsetwise_to_notewise(&trend).into_iter().zip(&order) {
            residual[index] = value;
        }

        let observed: Vec<f64> = performance.iter().map(|event| event.peak_loudness).collect();
        let local = observed
            .iter()
            .zip(&residual)
            .map(|(value, trend)| value - trend)
            .collect();

        Ok(DynamicsDecomposition { local, residual })
    }

    /// Regenerates per-note loudness from its components.
    pub fn reconstruct(&self, decomposition: &DynamicsDecomposition) -> Result<Vec<f64>> {
        if decomposition.local.len() != decomposition.residual.len() {
            return Err(CodecError::ShapeMismatch {
                expected: decomposition.local.len(),
                found: decomposition.residual.len(),
            });
        }

        Ok(decomposition
            .local
            .iter()
            .zip(&decomposition.residual)
            .map(|(local, residual)| local + residual)
            .collect())
    }
}

/// Residual is a centered moving average over consecutive unique onsets of
/// the loudest note per onset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OnsetwiseDecompositionCodec {
    window_width: usize,
}

impl OnsetwiseDecompositionCodec {
    /// Fails with [`CodecError::InvalidConfiguration`] unless the width is
    /// odd and positive.
    pub fn new(window_width: usize) -> Result<Self> {
        validate_window_width(window_width)?;
        Ok(Self { window_width })
    }

    pub fn window_width(&self) -> usize {
        self.window_width
    }

    fn trend(&self, onsets: &UniqueOnsets, observed: &[f64]) -> Vec<f64> {
        // A single-onset window keeps everything local.
        if self.window_width == 1 {
            return vec![0.0; onsets.len()];
        }

        let levels = onsets.notewise_to_onsetwise(observed, OnsetAggregate::Max);
        smooth(&levels, self.window_width)
    }
}

/// Residual is one constant: the mean onset loudness of the whole piece.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConstantTrendCodec;

impl ConstantTrendCodec {
    fn trend(&self, onsets: &UniqueOnsets, observed: &[f64]) -> Vec<f64> {
        let levels = onsets.notewise_to_onsetwise(observed, OnsetAggregate::Max);
        if levels.is_empty() {
            return levels;
        }
        let mean = levels.iter().sum::<f64>() / levels.len() as f64;
        vec![mean; levels.len()]
    }
}

/// Centered moving average, truncated at both ends.
fn smooth(values: &[f64], width: usize) -> Vec<f64> {
    let half = width / 2;
    (0..values.len())
        .map(|index| {
            let start = index.saturating_sub(half);
            let end = (index + half + 1).min(values.len());
            let window = &values[start..end];
            window.iter().sum::<f64>() / window.len() as f64
        })
        .collect()
}
