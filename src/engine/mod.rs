// Engine orchestration: version activation, rollback and reset.

pub mod orchestrator;

pub use orchestrator::UpdateOrchestrator;
