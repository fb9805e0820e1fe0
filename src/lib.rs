#[cfg(feature = "cli")]
pub mod cli;
pub mod engine;
pub mod error;
pub mod input;
pub mod model;
pub mod output;
pub mod probe;
pub mod registry;
pub mod telemetry;
pub mod util;

#[cfg(test)]
mod test_support;
