pub mod cached_client;
pub mod evaluator;
pub mod feedback;
pub mod generator;
pub mod orchestrator;
