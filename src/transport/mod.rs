//! Request execution against the API server

pub mod executor;
pub mod outcome;

pub use executor::Transport;
pub use outcome::CallOutcome;
