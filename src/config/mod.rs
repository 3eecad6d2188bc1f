//! Configuration parsing and types.
//!
//! - `types` - per-file [`ConfigFragment`] and merged [`ServiceGraph`]
//! - `service` - [`Service`], [`Ingress`] and their fragment forms
//! - `runner` - the [`Runner`] variants
//! - `dependency` - built-in [`Dependency`] units
//! - `environment` - case-insensitive [`EnvironmentOverlay`]
//! - `hostname` - accepted-hostname policy for ingress hosts
//! - `merger` - fragment merging and validation
//! - `parser` - YAML loading and config file discovery
//! - `duration` - human duration strings

pub mod hostname;

mod dependency;
mod duration;
mod environment;
mod merger;
mod parser;
mod runner;
mod service;
mod types;

pub use dependency::*;
pub use duration::*;
pub use environment::*;
pub use merger::*;
pub use parser::*;
pub use runner::*;
pub use service::*;
pub use types::*;
