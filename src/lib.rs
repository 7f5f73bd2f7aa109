//! `mailtrack` - issue tracking inside the repository.
//!
//! This crate provides the `mt` command line tool on top of the
//! [`mailtrack_lib`] issue store.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`config`] - Layered YAML configuration
//! - [`editor`] - External editor collaborator
//! - [`error`] - Error types and handling
//! - [`format`] - Output formatting (text, JSON)
//! - [`logging`] - Diagnostic logging setup
//! - [`vcs`] - Version control collaborator (git)

#![forbid(unsafe_code)]
#![warn(clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod editor;
pub mod error;
pub mod format;
pub mod logging;
pub mod vcs;

pub use cli::run;
pub use error::{MailtrackError, Result};
