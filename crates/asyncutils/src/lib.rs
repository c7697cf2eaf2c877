//! Small async building blocks that `futures` doesn't quite have.
//!
//! The main export is [`Replay`], a lazily-started future whose single outcome
//! is shared by every subscriber. It behaves like a "defer + share + replay the
//! last value" stream pipeline, but is modelled as an explicit state machine
//! instead of a pile of operators:
//!
//! ```text
//!   Idle ──first poll──▶ Running ──Some(value)──▶ Resolved(value)
//!                           │
//!                           └──────None──────────▶ Completed
//! ```
//!
//! Both terminal states are permanent.

mod replay;

pub use crate::replay::{Replay, ReplayState, Subscription};
