//! Core library for the performance codec.
//!
//! The crate converts between a symbolic score and an expressive performance
//! of it. Each module owns one step of that conversion: the score data model
//! and alignment, the beat/second time codec, the dynamics decomposition and
//! the facade that merges both into a per-onset parameter table.

pub mod codec;
pub mod config;
pub mod dynamics;
pub mod error;
pub mod score;
pub mod table;
pub mod timing;

pub use codec::PerformanceCodec;
pub use config::{CodecConfig, DecompositionStrategy, VERSION};
pub use dynamics::{DynamicsCodec, DynamicsDecomposition, OnsetwiseDecompositionCodec};
pub use error::{CodecError, Result};
pub use score::{align, Performance, PerformanceEvent, Score, ScoreEvent, UniqueOnsets};
pub use table::{ParameterRow, ParameterTable};
pub use timing::{Breakpoint, Diagnostic, TempoCurve, TimeCodec};
