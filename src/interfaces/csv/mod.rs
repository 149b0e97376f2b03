//! Batch payment files.

pub mod outcome_writer;
pub mod payment_reader;
