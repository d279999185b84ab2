//! Domain types and the presence state machine. Nothing here performs I/O
//! apart from reading and writing the settings file.

pub mod address;
pub mod error;
pub mod models;
pub mod presence;
pub mod settings;
