//! Tapedeck - record and replay HTTP interactions for deterministic tests
//!
//! A [`Recorder`] sits in front of a real [`Transport`]. While recording it
//! forwards every request and appends the exchange to a [`Cassette`]; while
//! replaying it answers from the cassette, consuming each recorded
//! interaction at most once, and never touches the network.

#![deny(unsafe_code)]
#![warn(missing_docs, clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::multiple_crate_versions
)]

pub mod cassette;
pub mod config;
pub mod error;
pub mod matcher;
pub mod recorder;
pub mod transport;

pub use cassette::{Cassette, Interaction};
pub use config::{Config, Mode};
pub use error::{LoadError, Result, TapedeckError};
pub use matcher::{DefaultMatcher, Matcher};
pub use recorder::Recorder;
pub use transport::{HttpTransport, Transport};
