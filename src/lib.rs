pub mod analyze;
pub mod codemodel;
pub mod environment;
pub mod error;
pub mod file_api;
pub mod logging;
pub mod maat;
pub mod options;
pub mod process;
pub mod ruleset;
pub mod runner;
pub mod toolchain;
pub mod util;

pub use error::MaatError;
pub use maat::{run_analysis, Maat};
pub use options::AnalyzeOptions;

#[cfg(test)]
mod test_utils;
