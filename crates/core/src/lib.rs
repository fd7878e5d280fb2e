#![forbid(unsafe_code)]

pub mod advisor;
pub mod model;
pub mod parser;
pub mod time;

pub use time::Clock;
