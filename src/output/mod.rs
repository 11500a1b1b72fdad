//! Output formatters for run reports and container listings.
//!
//! - text status lines for terminals
//! - JSON for automation and scripting
//!
//! # Example
//!
//! ```no_run
//! use ctxbuild::output::{JsonOutput, TextOutput};
//! use ctxbuild::pipeline::{Pipeline, PipelineOptions};
//! use std::path::Path;
//!
//! let report = Pipeline::new(PipelineOptions::default())
//!     .scan(Path::new("/media/backup"))
//!     .unwrap();
//!
//! TextOutput::new(&report, false).print().unwrap();
//! println!("{}", JsonOutput::new(&report).to_json_pretty().unwrap());
//! ```

pub mod json;
pub mod text;

pub use json::{JsonInspection, JsonOutput, JsonOutputError, JsonSummary};
pub use text::{status_line, write_inspection, TextOutput};
