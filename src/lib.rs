pub mod api;
pub mod config;
pub mod enrichment;
pub mod error;
pub mod location;
pub mod pipeline;
pub mod settings;
pub mod signal;
pub mod state;
pub mod trip;
