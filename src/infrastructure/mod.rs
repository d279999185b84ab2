pub mod actions;
pub mod bluetooth;
pub mod logging;
