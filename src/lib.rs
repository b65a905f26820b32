//! modelkit - streaming export packages for ML projects
//!
//! Bundles a project's trained model, preprocessed datasets and generated
//! helper files into ZIP archives that are streamed straight to the client.

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

pub use config::config;
pub use error::{Error, Result};
pub use state::AppState;
