//! # Audio Module
//!
//! Local mirror of each guild's playback state.
//!
//! ## Components
//!
//! ### [`player`] - Player
//! - Per-guild state machine (`Disconnected` → `Connecting` → `Connected`)
//! - Sends playback commands through the node it was created on
//! - Reacts to track end events (loop, advance or close the session)
//!
//! ### [`queue`] - Queue
//! - Pending tracks plus `current` and `previous`
//! - `current` is never part of the pending sequence
//!
//! ### [`track`] - Track
//! - Immutable metadata and the node-issued encoded payload
//!
//! ### [`filters`] - Filters
//! - Typed filter model sent with the `filters` op
//! - Ready-made presets (bass boost, nightcore, 8D...)

pub mod filters;
pub mod player;
pub mod queue;
pub mod track;
