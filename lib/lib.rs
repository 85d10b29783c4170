//! Sni: Speculative Non-Interference checking for MuASM.
//!
//! Sni statically checks whether a MuASM program can leak secrets through
//! memory or control flow observations made along mispredicted speculative
//! paths. Analysis runs in three stages:
//!
//! * `parser` turns source text into an `il::Program`, resolving labels.
//! * `vcfg` expands the `Program` into a `vcfg::StaticGraph`, which models
//!   both committed control flow and the mispredicted side of every branch.
//! * `analysis` runs a relational abstract interpretation over that graph and
//!   reports either `Secure` or the first `SNI_Violation` it finds, along with
//!   the trace that led to it.
//!
//! ```
//! use sni::analysis::{self, AnalyzeOptionsBuilder, Policy, SecurityPoint, Verdict};
//! use sni::vcfg::BuildOptions;
//!
//! let source = "beqz c, End\nload x, secret\nEnd: skip";
//! let options = AnalyzeOptionsBuilder::new()
//!     .policy(Policy::new().cell("secret", SecurityPoint::High))
//!     .build();
//! let result = analysis::analyze_source(source, &BuildOptions::default(), &options);
//! assert_eq!(result.verdict(), Verdict::SniViolation);
//! ```

pub mod analysis;
pub mod error;
pub mod graph;
pub mod il;
pub mod parser;
#[cfg(test)]
mod tests;
pub mod vcfg;

pub use crate::analysis::{analyze, analyze_source};
pub use crate::error::{Error, ErrorType, ParseError};
pub use crate::parser::parse;
pub use crate::vcfg::{build_vcfg, build_vcfg_from_source};
