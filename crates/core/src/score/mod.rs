use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{CodecError, Result};

/// Onsets closer than this many beats belong to the same chord.
pub const ONSET_EPSILON: f64 = 1e-6;

/// Symbolic note as it appears in the score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
    /// Alignment id shared with the matching [`PerformanceEvent`].
    pub id: String,
    pub onset_beat: f64,
    pub duration_beat: f64,
    pub pitch: u8,
    #[serde(default)]
    pub voice: u32,
}

impl ScoreEvent {
    /// Creates an event in voice 0.
    pub fn new(id: impl Into<String>, onset_beat: f64, duration_beat: f64, pitch: u8) -> Self {
        Self {
            id: id.into(),
            onset_beat,
            duration_beat,
            pitch,
            voice: 0,
        }
    }
}

/// Rendered counterpart of a [`ScoreEvent`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEvent {
    pub id: String,
    pub onset_sec: f64,
    pub duration_sec: f64,
    pub peak_loudness: f64,
}

impl PerformanceEvent {
    /// Creates a performed note matched to the score event with the same `id`.
    pub fn new(
        id: impl Into<String>,
        onset_sec: f64,
        duration_sec: f64,
        peak_loudness: f64,
    ) -> Self {
        Self {
            id: id.into(),
            onset_sec,
            duration_sec,
            peak_loudness,
        }
    }
}

/// Validated score, sorted by onset. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Score {
    events: Vec<ScoreEvent>,
}

impl Score {
    /// Validates the events and sorts them by onset.
    ///
    /// Rejects non-finite or negative timing, repeated ids, and two events
    /// sharing onset, pitch and voice.
    pub fn new(mut events: Vec<ScoreEvent>) -> Result<Self> {
        let mut ids = HashSet::with_capacity(events.len());
        let mut identities = HashSet::with_capacity(events.len());

        for event in &events {
            if !event.onset_beat.is_finite() || !event.duration_beat.is_finite() {
                return Err(CodecError::input(format!(
                    "score event `{}` has a non-finite onset or duration",
                    event.id
                )));
            }
            if event.duration_beat < 0.0 {
                return Err(CodecError::input(format!(
                    "score event `{}` has a negative duration",
                    event.id
                )));
            }
            if !ids.insert(event.id.as_str()) {
                return Err(CodecError::input(format!(
                    "score event id `{}` is used more than once",
                    event.id
                )));
            }
            let identity = (event.onset_beat.to_bits(), event.pitch, event.voice);
            if !identities.insert(identity) {
                return Err(CodecError::input(format!(
                    "score event `{}` duplicates onset {} pitch {} voice {}",
                    event.id, event.onset_beat, event.pitch, event.voice
                )));
            }
        }

        events.sort_by(|a, b| a.onset_beat.total_cmp(&b.onset_beat));
        Ok(Self { events })
    }

    /// Events in score order.
    pub fn events(&self) -> &[ScoreEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Onset of every event in beats, in score order.
    pub fn onsets(&self) -> Vec<f64> {
        self.events.iter().map(|event| event.onset_beat).collect()
    }
}

impl<'de> Deserialize<'de> for Score {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Raw {
            events: Vec<ScoreEvent>,
        }

        let raw = Raw::deserialize(deserializer)?;
        Score::new(raw.events).map_err(serde::de::Error::custom)
    }
}

/// Ordered sequence of performed notes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Performance {
    pub events: Vec<PerformanceEvent>,
}

impl Performance {
    /// Wraps performed notes after checking them with [`Performance::validate`].
    pub fn new(events: Vec<PerformanceEvent>) -> Result<Self> {
        let performance = Self { events };
        performance.validate()?;
        Ok(performance)
    }

    /// Requires finite values and a positive duration on every note.
    pub fn validate(&self) -> Result<()> {
        for event in &self.events {
            if !event.onset_sec.is_finite()
                || !event.duration_sec.is_finite()
                || !event.peak_loudness.is_finite()
            {
                return Err(CodecError::input(format!(
                    "performance event `{}` carries a non-finite value",
                    event.id
                )));
            }
            if event.duration_sec <= 0.0 {
                return Err(CodecError::input(format!(
                    "performance event `{}` must have a positive duration",
                    event.id
                )));
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Matches performance events to score events by alignment id and returns
/// them in score order. The mapping must be a bijection.
pub fn align<'a>(
    score: &Score,
    performance: &'a Performance,
) -> Result<Vec<&'a PerformanceEvent>> {
    if score.len() != performance.len() {
        return Err(CodecError::alignment(format!(
            "score has {} events but the performance has {}",
            score.len(),
            performance.len()
        )));
    }

    let mut by_id: HashMap<&str, &PerformanceEvent> = HashMap::with_capacity(performance.len());
    for event in &performance.events {
        if by_id.insert(event.id.as_str(), event).is_some() {
            return Err(CodecError::alignment(format!(
                "performance event id `{}` is used more than once",
                event.id
            )));
        }
    }

    score
        .events()
        .iter()
        .map(|note| {
            by_id.get(note.id.as_str()).copied().ok_or_else(|| {
                CodecError::alignment(format!(
                    "score event `{}` has no performed counterpart",
                    note.id
                ))
            })
        })
        .collect()
}

/// How note-level values are reduced to a single value per onset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnsetAggregate {
    Mean,
    Max,
}

/// Groups of note indices that share a score onset, in onset order.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueOnsets {
    groups: Vec<std::ops::Range<usize>>,
    beats: Vec<f64>,
}

impl UniqueOnsets {
    /// Groups a list of onsets that is already sorted ascending.
    pub fn from_sorted(onsets: &[f64]) -> Self {
        let mut groups = Vec::new();
        let mut beats = Vec::new();
        let mut start = 0;

        for index in 1..=onsets.len() {
            let split = index == onsets.len() || onsets[index] - onsets[start] > ONSET_EPSILON;
            if split {
                groups.push(start..index);
                beats.push(onsets[start]);
                start = index;
            }
        }

        Self { groups, beats }
    }

    /// Groups the onsets of a score, which is always sorted.
    pub fn from_score(score: &Score) -> Self {
        Self::from_sorted(&score.onsets())
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Score position of each unique onset.
    pub fn beats(&self) -> &[f64] {
        &self.beats
    }

    /// Reduces note-level values to one value per unique onset.
    pub fn notewise_to_onsetwise(&self, values: &[f64], aggregate: OnsetAggregate) -> Vec<f64> {
        self.groups
            .iter()
            .map(|group| {
                let slice = &values[group.clone()];
                match aggregate {
                    OnsetAggregate::Mean => slice.iter().sum::<f64>() / slice.len() as f64,
                    OnsetAggregate::Max => slice.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                }
            })
            .collect()
    }

    /// Broadcasts one value per unique onset back to every note of the onset.
    pub fn onsetwise_to_notewise(&self, values: &[f64]) -> Vec<f64> {
        let mut notewise = Vec::with_capacity(self.groups.last().map_or(0, |g| g.end));
        for (group, value) in self.groups.iter().zip(values) {
            notewise.extend(std::iter::repeat(*value).take(group.len()));
        }
        notewise
    }
}
