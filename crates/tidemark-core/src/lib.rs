//! Tidemark Core — command-processing and event-sourcing runtime.
//!
//! A command is routed to its registered handlers; handlers load and mutate
//! aggregates through a per-command unit of work; the tracked changes are
//! appended to the event store inside a logical transaction with optimistic
//! concurrency; and only after a successful commit are the new events
//! dispatched to subscribers, in their stored order.
//!
//! Storage backends implement the contracts in [`store`]; everything else is
//! wired explicitly through [`processor::CommandProcessorBuilder`].

pub mod aggregate;
pub mod clock;
pub mod command;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handler;
pub mod identifier;
pub mod processor;
pub mod repository;
pub mod store;
pub mod transaction;
pub mod unit_of_work;
