//! Adapters: encryption and the storage backends behind the domain ports.

pub mod cipher;
pub mod in_memory;
pub mod json_file;
