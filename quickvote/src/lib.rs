//! Progression engine for multi-stage QuickVote elections.
//!
//! See the [manual] for the phases and commands.

mod agenda;
mod api;
pub mod builder;
mod engine;
mod error;
pub mod manual;
mod mode;
mod model;
mod polling;
mod round;
pub mod simulator;
mod slate;
mod source;
mod state;
mod tally;

pub use crate::agenda::*;
pub use crate::api::*;
pub use crate::engine::Engine;
pub use crate::error::*;
pub use crate::mode::*;
pub use crate::model::*;
pub use crate::polling::*;
pub use crate::round::RoundController;
pub use crate::slate::*;
pub use crate::source::{set_source_kind, set_winner_quota, source_kind, SourceFields, SLATE_BASE_URL};
pub use crate::state::*;
pub use crate::tally::*;
