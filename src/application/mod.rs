//! Stateful services of the payment network.
//!
//! The merchant and the processor each own their services and talk only
//! through the encrypted [`channel::MessageChannel`].

pub mod channel;
pub mod guard;
pub mod ledger;
pub mod merchant;
pub mod network;
pub mod processor;
pub mod risk;
pub mod vault;
