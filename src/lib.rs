//! Terminal front end for streamed search answers.
//!
//! The binary reads its settings from the environment ([`config`]), installs
//! stderr logging ([`logging`]) and writes answer deltas as plain text
//! ([`render`]). Transport and merging live in the `search_api` and
//! `entry_merge` crates.

pub mod config;
pub mod logging;
pub mod render;

pub use config::EnvConfig;
pub use render::AnswerRenderer;
