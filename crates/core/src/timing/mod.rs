//! Mapping between score time (beats) and performance time (seconds).
//!
//! A [`TempoCurve`] holds seconds-per-beat breakpoints. The rate is constant
//! between two breakpoints, so performance time is a piecewise-linear
//! function of score position. Past the last breakpoint the final rate keeps
//! applying; before the first breakpoint nothing is defined.

use serde::{Deserialize, Serialize};

use crate::{CodecError, Result, ScoreEvent};

/// Score position from which `seconds_per_beat` applies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakpoint {
    pub beat: f64,
    pub seconds_per_beat: f64,
}

impl Breakpoint {
    pub fn new(beat: f64, seconds_per_beat: f64) -> Self {
        Self {
            beat,
            seconds_per_beat,
        }
    }
}

/// Validated tempo curve. `origin_sec` is the performance time at which the
/// first breakpoint is reached.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TempoCurve {
    origin_sec: f64,
    breakpoints: Vec<Breakpoint>,
}

impl TempoCurve {
    /// Builds a curve whose first breakpoint is reached at 0 seconds.
    pub fn new(breakpoints: Vec<Breakpoint>) -> Result<Self> {
        Self::with_origin(0.0, breakpoints)
    }

    /// Builds a curve whose first breakpoint is reached at `origin_sec`.
    ///
    /// Fails with [`CodecError::InvalidTempoCurve`] when the list is empty,
    /// carries a non-finite value or non-positive rate, or goes backwards.
    pub fn with_origin(origin_sec: f64, breakpoints: Vec<Breakpoint>) -> Result<Self> {
        if breakpoints.is_empty() {
            return Err(CodecError::tempo_curve("tempo curve has no breakpoints"));
        }
        if !origin_sec.is_finite() {
            return Err(CodecError::tempo_curve("tempo curve origin must be finite"));
        }

        for (index, point) in breakpoints.iter().enumerate() {
            if !point.beat.is_finite() || !point.seconds_per_beat.is_finite() {
                return Err(CodecError::tempo_curve(format!(
                    "breakpoint {index} carries a non-finite value"
                )));
            }
            if point.seconds_per_beat <= 0.0 {
                return Err(CodecError::tempo_curve(format!(
                    "breakpoint {index} has non-positive rate {} s/beat",
                    point.seconds_per_beat
                )));
            }
        }

        if let Some(index) = breakpoints.windows(2).position(|w| w[1].beat < w[0].beat) {
            return Err(CodecError::tempo_curve(format!(
                "breakpoint {} at beat {} precedes beat {}",
                index + 1,
                breakpoints[index + 1].beat,
                breakpoints[index].beat
            )));
        }

        Ok(Self {
            origin_sec,
            breakpoints,
        })
    }

    /// Constant tempo starting at beat 0.
    pub fn constant(seconds_per_beat: f64) -> Result<Self> {
        Self::new(vec![Breakpoint::new(0.0, seconds_per_beat)])
    }

    /// Performance time of the first breakpoint.
    pub fn origin_sec(&self) -> f64 {
        self.origin_sec
    }

    pub fn breakpoints(&self) -> &[Breakpoint] {
        &self.breakpoints
    }

    /// Earliest score position the curve covers.
    pub fn start_beat(&self) -> f64 {
        self.breakpoints[0].beat
    }

    fn segment_for_beat(&self, beat: f64) -> usize {
        self.breakpoints
            .partition_point(|point| point.beat <= beat)
            .saturating_sub(1)
    }

    /// Performance time of every breakpoint, accumulated with compensated
    /// summation, together with the naively accumulated end time.
    fn anchors(&self) -> (Vec<f64>, f64) {
        let mut anchors = Vec::with_capacity(self.breakpoints.len());
        let mut sum = self.origin_sec;
        let mut compensation = 0.0;
        let mut naive = self.origin_sec;
        anchors.push(sum);

        for pair in self.breakpoints.windows(2) {
            let step = (pair[1].beat - pair[0].beat) * pair[0].seconds_per_beat;
            naive += step;

            let adjusted = step - compensation;
            let next = sum + adjusted;
            compensation = (next - sum) - adjusted;
            sum = next;
            anchors.push(sum);
        }

        (anchors, naive)
    }
}

impl<'de> Deserialize<'de> for TempoCurve {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            #[serde(default)]
            origin_sec: f64,
            breakpoints: Vec<Breakpoint>,
        }

        let raw = Raw::deserialize(deserializer)?;
        TempoCurve::with_origin(raw.origin_sec, raw.breakpoints).map_err(serde::de::Error::custom)
    }
}

/// Non-fatal condition reported alongside codec results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Accumulated rounding error exceeded the configured tolerance.
    TimeDrift {
        seconds_per_beat: f64,
        tolerance: f64,
    },
}

/// Converts between score beats and performance seconds over a tempo curve.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeCodec {
    tolerance: f64,
}

impl Default for TimeCodec {
    fn default() -> Self {
        Self {
            tolerance: crate::config::DEFAULT_TIME_TOLERANCE,
        }
    }
}

impl TimeCodec {
    /// Creates a codec that reports drift above `tolerance` seconds per beat.
    pub fn new(tolerance: f64) -> Result<Self> {
        if !tolerance.is_finite() || tolerance <= 0.0 {
            return Err(CodecError::configuration(format!(
                "time tolerance must be a positive number, got {tolerance}"
            )));
        }
        Ok(Self { tolerance })
    }

    /// Drift tolerance in seconds per beat.
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Maps the onset of every score event to seconds.
    pub fn encode(&self, events: &[ScoreEvent], curve: &TempoCurve) -> Result<Vec<f64>> {
        let beats: Vec<f64> = events.iter().map(|event| event.onset_beat).collect();
        self.encode_beats(&beats, curve)
    }

    /// Maps score beats to seconds, logging a warning when the curve drifts.
    pub fn encode_beats(&self, beats: &[f64], curve: &TempoCurve) -> Result<Vec<f64>> {
        let (times, diagnostic) = self.encode_with_diagnostics(beats, curve)?;
        if let Some(diagnostic) = diagnostic {
            report(&diagnostic);
        }
        Ok(times)
    }

    /// Like [`TimeCodec::encode_beats`] but hands the drift diagnostic back
    /// to the caller instead of logging it.
    pub fn encode_with_diagnostics(
        &self,
        beats: &[f64],
        curve: &TempoCurve,
    ) -> Result<(Vec<f64>, Option<Diagnostic>)> {
        let (anchors, naive_end) = curve.anchors();
        let start = curve.start_beat();

        let times = beats
            .iter()
            .map(|&beat| {
                if !beat.is_finite() || beat < start - crate::score::ONSET_EPSILON {
                    return Err(CodecError::OutOfRange { time: beat, start });
                }
                let index = curve.segment_for_beat(beat);
                let point = curve.breakpoints[index];
                Ok(anchors[index] + (beat - point.beat) * point.seconds_per_beat)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((times, self.drift(curve, &anchors, naive_end)))
    }

    /// Maps performance times back to score beats.
    pub fn decode(&self, times: &[f64], curve: &TempoCurve) -> Result<Vec<f64>> {
        let (anchors, naive_end) = curve.anchors();
        if let Some(diagnostic) = self.drift(curve, &anchors, naive_end) {
            report(&diagnostic);
        }

        times
            .iter()
            .map(|&time| {
                if !time.is_finite() || time < curve.origin_sec - self.tolerance {
                    return Err(CodecError::OutOfRange {
                        time,
                        start: curve.origin_sec,
                    });
                }
                let index = anchors.partition_point(|&anchor| anchor <= time).saturating_sub(1);
                let point = curve.breakpoints[index];
                Ok(point.beat + (time - anchors[index]) / point.seconds_per_beat)
            })
            .collect()
    }

    /// Checks the curve's accumulated rounding drift against the tolerance.
    pub fn check_drift(&self, curve: &TempoCurve) -> Option<Diagnostic> {
        let (anchors, naive_end) = curve.anchors();
        self.drift(curve, &anchors, naive_end)
    }

    fn drift(&self, curve: &TempoCurve, anchors: &[f64], naive_end: f64) -> Option<Diagnostic> {
        let compensated_end = anchors.last().copied().unwrap_or(curve.origin_sec);
        let span = curve
            .breakpoints
            .last()
            .map_or(0.0, |last| last.beat - curve.start_beat())
            .max(1.0);
        let per_beat = (naive_end - compensated_end).abs() / span;

        (per_beat > self.tolerance).then_some(Diagnostic::TimeDrift {
            seconds_per_beat: per_beat,
            tolerance: self.tolerance,
        })
    }
}

pub(crate) fn report(diagnostic: &Diagnostic) {
    match diagnostic {
        Diagnostic::TimeDrift {
            seconds_per_beat,
            tolerance,
        } => tracing::warn!(
            drift = seconds_per_beat,
            tolerance,
            "tempo curve rounding drift exceeds tolerance"
        ),
    }
}
