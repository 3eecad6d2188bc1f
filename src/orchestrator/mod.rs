mod builder;
mod core;
mod running;

pub use builder::OrchestratorBuilder;
pub use core::Orchestrator;
pub use running::RunningTopology;
