//! lintloop library crate
//!
//! Lint-driven rewriting of Python sources through a text-generation oracle:
//! a whole-file improvement loop with a multi-temperature tournament, and a
//! targeted refactor of single top-level functions. The binary is a thin CLI
//! over these modules; the bench exercises the fragment paths directly.

pub mod analysis;
pub mod candidate;
pub mod config;
pub mod format;
pub mod fragment;
pub mod improve;
pub mod logging;
pub mod oracle;
pub mod prompt;
pub mod refactor;
pub mod revision;
pub mod syntax;
pub mod tools;
pub mod tournament;
pub mod util;

#[cfg(test)]
mod testing;
