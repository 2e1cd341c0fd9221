//! Uptime computation: status resolution, business hours and the hourly grid.

mod calculator;
mod calendar;
mod resolver;

pub use calculator::*;
pub use calendar::*;
pub use resolver::*;
