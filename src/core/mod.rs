//! Core types and traits for the load queue scheduler

pub mod action;
pub mod cancellation;
pub mod error;

pub use action::{ActionInvoker, ActionRequest, ClosureInvoker};
pub use cancellation::CancellationToken;
pub use error::{LoaderError, Result};
