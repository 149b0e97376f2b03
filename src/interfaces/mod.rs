//! Input and output adapters used by the command line.

pub mod csv;
