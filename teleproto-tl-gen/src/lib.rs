//! Build-time generator turning parsed TL definitions into Rust modules.
//!
//! ```no_run
//! // build.rs
//! use teleproto_tl_gen::{Config, Outputs, generate};
//! use teleproto_tl_parser::{parse_layer, parse_tl_file};
//!
//! fn main() -> std::io::Result<()> {
//!     let schema = std::fs::read_to_string("tl/mtproto.tl")?;
//!     let defs: Vec<_> = parse_tl_file(&schema).filter_map(Result::ok).collect();
//!     let config = Config { layer: parse_layer(&schema).unwrap_or(0), ..Config::default() };
//!
//!     let out = std::env::var("OUT_DIR").unwrap();
//!     let mut outputs = Outputs::from_dir(&out)?;
//!     generate(&defs, &config, &mut outputs)?;
//!     outputs.flush()
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod metadata;
mod names;
pub mod codegen;

pub use codegen::{Config, Outputs, generate};
