//! Shared turn types for the Donna response pipeline.
//!
//! A reply to the user is a short ordered list of turns. Each turn carries
//! display text, a facial expression, an avatar animation and, once enriched,
//! the synthesized speech and the mouth-shape timeline used for lip sync.
//!
//! The two stages of a turn's life are separate types: [`DraftTurn`] is what
//! the normalizer produces, [`Turn`] is what the front end receives. The
//! response pipeline only builds a `Turn` through [`DraftTurn::enrich`], which
//! takes both enrichment results, so a generated turn cannot be missing its
//! audio or lipsync. `Turn` stays a plain serde record so that clients can
//! deserialize responses.

mod lipsync;
mod turn;

pub use lipsync::{Lipsync, LipsyncMetadata, MouthCue, MouthShape};
pub use turn::{Animation, ChatResponse, DraftTurn, FacialExpression, Turn, TurnBatch};

/// Maximum number of turns in a single reply.
pub const DEFAULT_MAX_TURNS: usize = 3;
