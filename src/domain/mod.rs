//! Domain types and rules with no I/O of their own.
//!
//! Storage is reached only through the traits in [`ports`].

pub mod card;
pub mod envelope;
pub mod mailbox;
pub mod money;
pub mod ports;
pub mod token;
pub mod transaction;
pub mod validation;
