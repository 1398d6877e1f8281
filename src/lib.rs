//! Agent tool layer for the ball sequencer: a registry of validated
//! capabilities over the show, a sandboxed script language composing them,
//! and a dispatcher that turns raw agent output into one uniform response.

#[cfg(feature = "http-api")]
pub mod api;
pub mod dispatcher;
pub mod error;
pub mod model;
pub mod paths;
pub mod project;
pub mod registry;
pub mod rng;
pub mod sandbox;
pub mod script;
pub mod settings;
pub mod state;
