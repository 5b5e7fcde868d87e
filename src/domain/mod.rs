pub mod errors;
pub mod ports;
pub mod repositories;
pub mod scoring;
pub mod types;
