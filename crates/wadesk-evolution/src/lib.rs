pub mod client;
pub mod error;
pub mod media;
pub mod send;

pub use client::EvolutionClient;
pub use error::EvolutionError;
