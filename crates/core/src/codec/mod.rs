//! Encode a performance into a [`ParameterTable`] and decode it back.
//!
//! The tempo curve is fitted by anchor-point averaging: every unique score
//! onset becomes a breakpoint placed at the mean performed onset of its
//! notes, and the rate of each segment is the performed inter-onset interval
//! divided by the score inter-onset interval. The final breakpoint repeats the
//! previous rate. A piece with a single onset takes its rate from the ratio of
//! mean performed to mean notated duration, falling back to
//! [`FALLBACK_BEAT_PERIOD`].
//!
//! Onsets played together or out of order would give a segment a zero or
//! negative rate. Every rate is therefore held at or above
//! [`MIN_RATE_FRACTION`] of the piece's overall rate, which keeps the curve
//! strictly increasing; the `timing` column absorbs the difference.

use crate::{
    dynamics::{DynamicsCodec, DynamicsDecomposition},
    score::{align, OnsetAggregate, UniqueOnsets},
    timing::{report, Breakpoint, TempoCurve, TimeCodec},
    CodecConfig, CodecError, ParameterRow, ParameterTable, Performance, PerformanceEvent, Result,
    Score,
};

/// Seconds per beat assumed when a performance carries no tempo information.
pub const FALLBACK_BEAT_PERIOD: f64 = 0.5;

/// Lowest segment rate of a fitted curve, relative to the overall rate.
pub const MIN_RATE_FRACTION: f64 = 0.05;

/// Stateless facade over the time and dynamics codecs.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceCodec {
    config: CodecConfig,
    time: TimeCodec,
    dynamics: DynamicsCodec,
}

impl Default for PerformanceCodec {
    fn default() -> Self {
        Self {
            config: CodecConfig::default(),
            time: TimeCodec::default(),
            dynamics: DynamicsCodec::Onsetwise(
                crate::dynamics::OnsetwiseDecompositionCodec::new(
                    crate::config::DEFAULT_WINDOW_WIDTH,
                )
                .expect("default window width is valid"),
            ),
        }
    }
}

impl PerformanceCodec {
    /// Builds a codec, rejecting invalid configuration before any encode or
    /// decode can run.
    pub fn new(config: CodecConfig) -> Result<Self> {
        config.validate()?;
        let time = TimeCodec::new(config.time_tolerance)?;
        let dynamics = DynamicsCodec::new(config.strategy, config.window_width)?;
        Ok(Self {
            config,
            time,
            dynamics,
        })
    }

    /// Configuration the codec was built from.
    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    /// Time codec used to map beats to seconds.
    pub fn time_codec(&self) -> &TimeCodec {
        &self.time
    }

    /// Dynamics codec selected by the configured strategy.
    pub fn dynamics_codec(&self) -> &DynamicsCodec {
        &self.dynamics
    }

    /// Encodes an aligned performance of `score` into one row per score event.
    pub fn encode(&self, score: &Score, performance: &Performance) -> Result<ParameterTable> {
        performance.validate()?;
        let aligned: Vec<PerformanceEvent> = align(score, performance)?
            .into_iter()
            .cloned()
            .collect();

        if score.is_empty() {
            return Ok(ParameterTable::default());
        }

        let onsets = UniqueOnsets::from_score(score);
        let curve = fit_tempo_curve(score, &onsets, &aligned)?;
        let rates: Vec<f64> = curve
            .breakpoints()
            .iter()
            .map(|point| point.seconds_per_beat)
            .collect();
        let mean_beat_period = rates.iter().sum::<f64>() / rates.len() as f64;
        let beat_periods = onsets.onsetwise_to_notewise(&rates);

        let (curve_times, drift) = self.time.encode_with_diagnostics(&score.onsets(), &curve)?;
        let mut diagnostics = Vec::new();
        if let Some(diagnostic) = drift {
            report(&diagnostic);
            diagnostics.push(diagnostic);
        }

        let dynamics = self.dynamics.decompose(&aligned, score.events())?;

        let rows = score
            .events()
            .iter()
            .zip(&aligned)
            .enumerate()
            .map(|(index, (note, played))| {
                let beat_period = beat_periods[index];
                let notated = reference_duration(note.duration_beat) * beat_period;
                ParameterRow {
                    id: note.id.clone(),
                    onset_beat: note.onset_beat,
                    onset_sec: played.onset_sec,
                    beat_period,
                    ioi_ratio: beat_period / mean_beat_period,
                    timing: played.onset_sec - curve_times[index],
                    articulation_log: (played.duration_sec / notated).log2(),
                    local_dynamics: dynamics.local[index],
                    residual_dynamics: dynamics.residual[index],
                }
            })
            .collect();

        tracing::debug!(
            events = score.len(),
            onsets = onsets.len(),
            mean_beat_period,
            strategy = ?self.dynamics.strategy(),
            "encoded performance"
        );

        Ok(ParameterTable {
            rows,
            origin_sec: curve.origin_sec(),
            mean_beat_period,
            diagnostics,
        })
    }

    /// Renders a parameter table back into performed notes for `score`.
    pub fn decode(&self, table: &ParameterTable, score: &Score) -> Result<Performance> {
        if table.len() != score.len() {
            return Err(CodecError::ShapeMismatch {
                expected: score.len(),
                found: table.len(),
            });
        }

        for (row, note) in table.rows.iter().zip(score.events()) {
            let moved = (row.onset_beat - note.onset_beat).abs() > crate::score::ONSET_EPSILON;
            if row.id != note.id || moved {
                return Err(CodecError::alignment(format!(
                    "table row `{}` at beat {} does not match score event `{}` at beat {}",
                    row.id, row.onset_beat, note.id, note.onset_beat
                )));
            }
        }

        if score.is_empty() {
            return Performance::new(Vec::new());
        }

        let onsets = UniqueOnsets::from_score(score);
        let ratios: Vec<f64> = table.rows.iter().map(|row| row.ioi_ratio).collect();
        let rates: Vec<f64> = onsets
            .notewise_to_onsetwise(&ratios, OnsetAggregate::Mean)
            .into_iter()
            .map(|ratio| ratio * table.mean_beat_period)
            .collect();
        let breakpoints = onsets
            .beats()
            .iter()
            .zip(&rates)
            .map(|(beat, rate)| Breakpoint::new(*beat, *rate))
            .collect();
        let curve = TempoCurve::with_origin(table.origin_sec, breakpoints)?;

        let (curve_times, _) = self.time.encode_with_diagnostics(&score.onsets(), &curve)?;
        self.verify_curve(&curve, &onsets)?;

        let beat_periods = onsets.onsetwise_to_notewise(&rates);
        let loudness = self.dynamics.reconstruct(&DynamicsDecomposition {
            local: table.rows.iter().map(|row| row.local_dynamics).collect(),
            residual: table.rows.iter().map(|row| row.residual_dynamics).collect(),
        })?;

        let events = score
            .events()
            .iter()
            .zip(&table.rows)
            .enumerate()
            .map(|(index, (note, row))| {
                let notated = reference_duration(note.duration_beat) * beat_periods[index];
                PerformanceEvent {
                    id: note.id.clone(),
                    onset_sec: curve_times[index] + row.timing,
                    duration_sec: row.articulation_log.exp2() * notated,
                    peak_loudness: loudness[index],
                }
            })
            .collect();

        tracing::debug!(events = score.len(), "decoded parameter table");
        Performance::new(events)
    }

    /// Maps the rebuilt curve's anchor times back to beats and warns when
    /// they no longer land on the score onsets.
    fn verify_curve(&self, curve: &TempoCurve, onsets: &UniqueOnsets) -> Result<()> {
        let anchor_times = self.time.encode_with_diagnostics(onsets.beats(), curve)?.0;
        let beats = self.time.decode(&anchor_times, curve)?;
        let deviation = beats
            .iter()
            .zip(onsets.beats())
            .map(|(decoded, expected)| (decoded - expected).abs())
            .fold(0.0, f64::max);

        if deviation > self.time.tolerance() {
            tracing::warn!(
                deviation,
                tolerance = self.time.tolerance(),
                "decoded tempo curve does not reproduce score onsets"
            );
        }
        Ok(())
    }
}

/// Notated duration used for articulation; grace notes count as one beat.
fn reference_duration(duration_beat: f64) -> f64 {
    if duration_beat > 0.0 {
        duration_beat
    } else {
        1.0
    }
}

fn fit_tempo_curve(
    score: &Score,
    onsets: &UniqueOnsets,
    aligned: &[PerformanceEvent],
) -> Result<TempoCurve> {
    let performed: Vec<f64> = aligned.iter().map(|event| event.onset_sec).collect();
    let performed = onsets.notewise_to_onsetwise(&performed, OnsetAggregate::Mean);
    let beats = onsets.beats();

    let span = beats[beats.len() - 1] - beats[0];
    let elapsed = performed[performed.len() - 1] - performed[0];
    let overall = if span > 0.0 && elapsed > 0.0 {
        elapsed / span
    } else {
        duration_ratio(score, aligned)
    };
    let floor = overall * MIN_RATE_FRACTION;

    let mut rates: Vec<f64> = beats
        .windows(2)
        .zip(performed.windows(2))
        .map(|(beat, time)| ((time[1] - time[0]) / (beat[1] - beat[0])).max(floor))
        .collect();
    rates.push(rates.last().copied().unwrap_or(overall));

    let breakpoints = beats
        .iter()
        .zip(rates)
        .map(|(beat, rate)| Breakpoint::new(*beat, rate))
        .collect();

    TempoCurve::with_origin(performed[0], breakpoints)
}

fn duration_ratio(score: &Score, aligned: &[PerformanceEvent]) -> f64 {
    let count = aligned.len() as f64;
    let notated = score.events().iter().map(|e| e.duration_beat).sum::<f64>() / count;
    let played = aligned.iter().map(|e| e.duration_sec).sum::<f64>() / count;

    if notated > 0.0 && played > 0.0 {
        played / notated
    } else {
        FALLBACK_BEAT_PERIOD
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DecompositionStrategy, ScoreEvent};

    fn quarter_notes() -> (Score, Performance) {
        let score = Score::new(
            (0..4)
                .map(|i| ScoreEvent::new(format!("n{i}"), i as f64, 1.0, 60 + i as u8))
                .collect(),
        )
        .unwrap();
        let performance = Performance::new(
            (0..4)
                .map(|i| PerformanceEvent::new(format!("n{i}"), i as f64 * 0.5, 0.25, 64.0))
                .collect(),
        )
        .unwrap();
        (score, performance)
    }

    fn expressive() -> (Score, Performance) {
        let score = Score::new(vec![
            ScoreEvent::new("a", 0.0, 1.0, 60),
            ScoreEvent::new("b", 0.0, 1.0, 64),
            ScoreEvent::new("c", 1.0, 0.5, 62),
            ScoreEvent::new("d", 1.5, 0.5, 65),
            ScoreEvent::new("e", 2.0, 2.0, 67),
            ScoreEvent::new("f", 2.0, 0.0, 71),
            ScoreEvent::new("g", 4.0, 1.0, 72),
        ])
        .unwrap();
        let performance = Performance::new(vec![
            PerformanceEvent::new("g", 3.31, 0.6, 48.0),
            PerformanceEvent::new("a", 1.00, 0.45, 62.0),
            PerformanceEvent::new("b", 1.02, 0.50, 70.0),
            PerformanceEvent::new("c", 1.48, 0.20, 66.0),
            PerformanceEvent::new("d", 1.75, 0.30, 75.0),
            PerformanceEvent::new("e", 2.05, 1.10, 83.0),
            PerformanceEvent::new("f", 2.03, 0.08, 90.0),
        ])
        .unwrap();
        (score, performance)
    }

    #[test]
    fn steady_quarter_notes_encode_flat() {
        let (score, performance) = quarter_notes();
        let codec = PerformanceCodec::default();

        let table = codec.encode(&score, &performance).unwrap();
        assert_eq!(table.len(), score.len());
        assert_eq!(table.origin_sec, 0.0);
        assert!((table.mean_beat_period - 0.5).abs() < 1e-12);
        for row in &table.rows {
            assert!((row.ioi_ratio - 1.0).abs() < 1e-12);
            assert!(row.timing.abs() < 1e-12);
            assert!((row.articulation_log + 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn round_trip_reproduces_performance() {
        let (score, performance) = expressive();
        let codec = PerformanceCodec::default();

        let table = codec.encode(&score, &performance).unwrap();
        assert_eq!(table.len(), score.len());

        let decoded = codec.decode(&table, &score).unwrap();
        let original = align(&score, &performance).unwrap();
        for (played, rendered) in original.iter().zip(&decoded.events) {
            assert_eq!(played.id, rendered.id);
            assert!((played.onset_sec - rendered.onset_sec).abs() < 1e-4);
            assert!((played.duration_sec - rendered.duration_sec).abs() < 1e-4);
            assert!((played.peak_loudness - rendered.peak_loudness).abs() < 1e-9);
        }
    }

    #[test]
    fn round_trip_with_every_strategy() {
        let (score, performance) = expressive();
        for (strategy, window_width) in [
            (DecompositionStrategy::Onsetwise, 1),
            (DecompositionStrategy::Onsetwise, 3),
            (DecompositionStrategy::Constant, 5),
        ] {
            let codec = PerformanceCodec::new(CodecConfig {
                strategy,
                window_width,
                ..Default::default()
            })
            .unwrap();

            let table = codec.encode(&score, &performance).unwrap();
            for (row, played) in table.rows.iter().zip(align(&score, &performance).unwrap()) {
                let sum = row.local_dynamics + row.residual_dynamics;
                assert!((sum - played.peak_loudness).abs() < 1e-9);
            }

            let decoded = codec.decode(&table, &score).unwrap();
            assert_eq!(decoded.len(), score.len());
        }
    }

    #[test]
    fn chord_notes_keep_their_timing_offsets() {
        let (score, performance) = expressive();
        let table = PerformanceCodec::default().encode(&score, &performance).unwrap();

        let timing = table.column("timing").unwrap();
        assert!((timing[0] + 0.01).abs() < 1e-9);
        assert!((timing[1] - 0.01).abs() < 1e-9);
        assert!((table.origin_sec - 1.01).abs() < 1e-12);
    }

    #[test]
    fn single_onset_uses_duration_ratio() {
        let score = Score::new(vec![ScoreEvent::new("a", 0.0, 2.0, 60)]).unwrap();
        let performance =
            Performance::new(vec![PerformanceEvent::new("a", 0.3, 1.5, 80.0)]).unwrap();
        let codec = PerformanceCodec::default();

        let table = codec.encode(&score, &performance).unwrap();
        assert!((table.mean_beat_period - 0.75).abs() < 1e-12);
        assert_eq!(table.rows[0].residual_dynamics, 80.0);

        let decoded = codec.decode(&table, &score).unwrap();
        assert!((decoded.events[0].onset_sec - 0.3).abs() < 1e-9);
        assert!((decoded.events[0].duration_sec - 1.5).abs() < 1e-9);
    }

    #[test]
    fn mismatched_counts_fail_alignment() {
        let score = Score::new(
            (0..3)
                .map(|i| ScoreEvent::new(format!("n{i}"), i as f64, 1.0, 60))
                .collect(),
        )
        .unwrap();
        let (_, performance) = quarter_notes();

        let err = PerformanceCodec::default().encode(&score, &performance).unwrap_err();
        assert!(matches!(err, CodecError::Alignment(_)));
    }

    #[test]
    fn decode_rejects_wrong_row_count() {
        let (score, performance) = quarter_notes();
        let codec = PerformanceCodec::default();
        let mut table = codec.encode(&score, &performance).unwrap();
        table.rows.pop();

        let err = codec.decode(&table, &score).unwrap_err();
        assert!(matches!(
            err,
            CodecError::ShapeMismatch {
                expected: 4,
                found: 3
            }
        ));
    }

    #[test]
    fn decode_rejects_rows_for_another_score() {
        let (score, performance) = quarter_notes();
        let codec = PerformanceCodec::default();
        let mut table = codec.encode(&score, &performance).unwrap();
        table.rows[2].id = "other".to_string();

        assert!(matches!(
            codec.decode(&table, &score),
            Err(CodecError::Alignment(_))
        ));
    }

    #[test]
    fn backwards_and_simultaneous_onsets_round_trip() {
        let (score, _) = quarter_notes();
        let codec = PerformanceCodec::default();

        for onsets in [[0.0, 0.5, 0.4, 1.0], [0.0, 0.5, 0.5, 1.0], [0.9, 0.6, 0.3, 0.0]] {
            let performance = Performance::new(
                onsets
                    .iter()
                    .enumerate()
                    .map(|(i, onset)| PerformanceEvent::new(format!("n{i}"), *onset, 0.25, 64.0))
                    .collect(),
            )
            .unwrap();

            let table = codec.encode(&score, &performance).unwrap();
            assert!(table.rows.iter().all(|row| row.beat_period > 0.0));

            let decoded = codec.decode(&table, &score).unwrap();
            for (expected, rendered) in onsets.iter().zip(&decoded.events) {
                assert!((expected - rendered.onset_sec).abs() < 1e-4);
                assert!((rendered.duration_sec - 0.25).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn repeated_onset_is_carried_by_timing() {
        let score = Score::new(
            (0..3)
                .map(|i| ScoreEvent::new(format!("n{i}"), i as f64, 1.0, 60))
                .collect(),
        )
        .unwrap();
        let performance = Performance::new(
            [0.0, 0.5, 0.5]
                .iter()
                .enumerate()
                .map(|(i, onset)| PerformanceEvent::new(format!("n{i}"), *onset, 0.2, 64.0))
                .collect(),
        )
        .unwrap();

        let table = PerformanceCodec::default().encode(&score, &performance).unwrap();
        let floor = 0.25 * MIN_RATE_FRACTION;
        assert!((table.rows[1].beat_period - floor).abs() < 1e-12);
        assert!((table.rows[2].timing + floor).abs() < 1e-12);
    }

    #[test]
    fn codec_carries_its_configuration() {
        let config = CodecConfig {
            strategy: DecompositionStrategy::Constant,
            window_width: 3,
            time_tolerance: 1e-5,
        };
        let codec = PerformanceCodec::new(config.clone()).unwrap();

        assert_eq!(codec.config(), &config);
        assert_eq!(codec.time_codec().tolerance(), 1e-5);
        assert_eq!(codec.dynamics_codec().strategy(), DecompositionStrategy::Constant);
    }

    #[test]
    fn invalid_configuration_never_builds_a_codec() {
        let err = PerformanceCodec::new(CodecConfig {
            window_width: 4,
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidConfiguration(_)));
    }

    #[test]
    fn empty_score_encodes_to_empty_table() {
        let score = Score::new(Vec::new()).unwrap();
        let performance = Performance::new(Vec::new()).unwrap();
        let codec = PerformanceCodec::default();

        let table = codec.encode(&score, &performance).unwrap();
        assert!(table.is_empty());
        assert!(codec.decode(&table, &score).unwrap().is_empty());
    }
}
