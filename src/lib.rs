//! # devstack
//!
//! A local development environment orchestrator. A declarative
//! `devstack.yaml` describes each service and how it runs: as a container,
//! a local .NET project, a plain executable, an OpenAPI mock or a remote
//! URL. devstack compiles that description into manifests for
//! docker-compose and process-compose, starts both, and fronts every
//! service with one reverse proxy that routes by hostname.
//!
//! ## Quick Start
//!
//! ```no_run
//! use devstack::{HealthCheck, Orchestrator, Parser};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), devstack::Error> {
//! let graph = Parser::new().load_graph(&["devstack.yaml"])?;
//! let orchestrator = Orchestrator::builder()
//!     .graph(graph)
//!     .health_check(HealthCheck::service("api", "/health"))
//!     .build()?;
//!
//! let cancel = CancellationToken::new();
//! let running = orchestrator.start(cancel.clone()).await?;
//! println!("api is at {}", running.addresses().resolve_url("api")?);
//!
//! running.shutdown().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: typed input model, fragment merging, hostname policy
//! - [`runner`]: execution mode and per-runner compilation
//! - [`pipeline`]: ordered compilation steps over a [`pipeline::BuildState`]
//! - [`manifest`]: docker-compose and process-compose documents
//! - [`ingress`]: dispatch table and reverse proxy
//! - [`tools`]: installation and supervision of the external binaries
//! - [`healthcheck`]: the readiness gate
//! - [`orchestrator`]: ties everything together

pub mod config;
pub mod error;
pub mod healthcheck;
pub mod ingress;
pub mod manifest;
pub mod orchestrator;
pub mod paths;
pub mod pipeline;
pub mod port;
pub mod runner;
pub mod tools;

// Re-export commonly used types
pub use config::{Parser, ServiceGraph};
pub use error::{Error, Result};
pub use healthcheck::{HealthCheck, UnprobedServicePolicy};
pub use orchestrator::{Orchestrator, OrchestratorBuilder, RunningTopology};
pub use paths::DevstackPaths;
pub use pipeline::{AddressBook, CompiledTopology};
pub use runner::ExecutionMode;
