//! Foundation utilities shared by every subsystem.

pub mod color;
pub mod math;
pub mod time;
