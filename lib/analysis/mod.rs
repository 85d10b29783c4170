//! Speculative non-interference analysis over a `vcfg::StaticGraph`.
//!
//! Every value is tracked twice, once as committed execution sees it and once
//! as speculative execution sees it, in a `lattice::RelValue`. Memory and
//! control flow observations are recorded per program point. Observations
//! made in committed execution set the baseline of what an attacker may
//! already learn, and a secret observed speculatively without that baseline
//! is a violation.

mod engine;
mod lattice;
mod options;
mod semantics;
mod state;

pub use self::engine::*;
pub use self::lattice::*;
pub use self::options::*;
pub use self::semantics::{apply, apply_instruction, eval, node_instruction};
pub use self::state::*;
