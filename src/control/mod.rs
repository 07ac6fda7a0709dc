//! Operator control plane - JSON commands in, JSON outcomes out.
//!
//! Commands form a closed enum, so an unknown command fails when it is
//! parsed and never reaches the controller.
//!
//! # Workflow
//!
//! 1. Operator writes one JSON [`Command`] per line
//! 2. [`Controller::execute`] dispatches it through a single `match`
//! 3. The [`CommandOutcome`] goes back as one JSON line
//!
//! # Example
//!
//! ```ignore
//! use beacon_reqresp::control::{write_outcome, Controller};
//!
//! let controller = Controller::new(client, store, chain);
//! let outcome = controller
//!     .execute_line(r#"{"command":"blocks_by_range","peer":"peer-a","start_slot":100,"count":3}"#)
//!     .await;
//! write_outcome(&outcome)?;
//! ```

mod background;
mod command;
mod controller;
mod stdio;

pub use background::BackgroundTask;
pub use command::{
    BlocksByRangeCommand, Command, CommandOutcome, StatusCommand, StatusView, WatchStatusCommand,
};
pub use controller::Controller;
pub use stdio::{write_outcome, write_outcome_to, write_stdout_line};
