//! Server module for jobwarden
//!
//! Contains the worker initialization and runtime logic.
//!
//! # Module Structure
//!
//! - `config`: Configuration structures for all worker components
//! - `loader`: Configuration loading from files and environment
//! - `background_tasks`: Scheduler and periodic job startup
//! - `tasks`: Built-in jobs
//! - `init`: Main worker initialization and run loop

mod background_tasks;
pub mod config;
mod init;
mod loader;
pub mod tasks;

// Re-export public API
pub use init::run;
pub use loader::load_config;
