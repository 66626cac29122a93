pub mod orchestrator;


pub use orchestrator::{CycleOutcome, PipelineParts, SamplingOrchestrator};
