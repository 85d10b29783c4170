use crate::Error;
use serde::{Deserialize, Serialize};
use std::default;
use std::fmt;
use std::str::FromStr;

/// Default number of instructions a mispredicted path may run.
pub const DEFAULT_WINDOW_SIZE: i64 = 8;

/// How speculative control flow is laid out in the graph.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// One `spec-begin`/`spec-end` pair per branch. The analysis counts the
    /// speculation window.
    #[default]
    Light,
    /// Speculative paths are unrolled into distinct nodes, up to the window.
    Meta,
}

impl FromStr for BuildMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<BuildMode, Error> {
        match s {
            "light" => Ok(BuildMode::Light),
            "meta" => Ok(BuildMode::Meta),
            _ => Err(Error::UnknownOption(s.to_string())),
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BuildMode::Light => write!(f, "light"),
            BuildMode::Meta => write!(f, "meta"),
        }
    }
}

/// What happens at the end of a mispredicted path.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpeculationMode {
    /// The path vanishes. No rollback edges are emitted.
    #[default]
    Discard,
    /// The path rolls back into committed execution, and the analysis checks
    /// that speculation contexts close in the order they opened.
    StackGuard,
}

impl FromStr for SpeculationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<SpeculationMode, Error> {
        match s {
            "discard" => Ok(SpeculationMode::Discard),
            "stack-guard" => Ok(SpeculationMode::StackGuard),
            _ => Err(Error::UnknownOption(s.to_string())),
        }
    }
}

impl fmt::Display for SpeculationMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SpeculationMode::Discard => write!(f, "discard"),
            SpeculationMode::StackGuard => write!(f, "stack-guard"),
        }
    }
}

/// Options for building a `StaticGraph`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BuildOptions {
    window_size: i64,
    mode: BuildMode,
    speculation_mode: SpeculationMode,
}

impl BuildOptions {
    /// Create a new set of BuildOptions with the default settings.
    pub fn new() -> BuildOptions {
        BuildOptions::default()
    }

    /// The maximum number of instructions on one unrolled speculative path.
    pub fn window_size(&self) -> i64 {
        self.window_size
    }

    pub fn set_window_size(&mut self, window_size: i64) {
        self.window_size = window_size;
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: BuildMode) {
        self.mode = mode;
    }

    pub fn speculation_mode(&self) -> SpeculationMode {
        self.speculation_mode
    }

    pub fn set_speculation_mode(&mut self, speculation_mode: SpeculationMode) {
        self.speculation_mode = speculation_mode;
    }
}

impl default::Default for BuildOptions {
    fn default() -> BuildOptions {
        BuildOptions {
            window_size: DEFAULT_WINDOW_SIZE,
            mode: BuildMode::default(),
            speculation_mode: SpeculationMode::default(),
        }
    }
}

/// Create your build options with the builder pattern.
pub struct BuildOptionsBuilder {
    options: BuildOptions,
}

impl BuildOptionsBuilder {
    pub fn new() -> BuildOptionsBuilder {
        BuildOptionsBuilder {
            options: BuildOptions::default(),
        }
    }

    pub fn window_size(mut self, window_size: i64) -> BuildOptionsBuilder {
        self.options.window_size = window_size;
        self
    }

    pub fn mode(mut self, mode: BuildMode) -> BuildOptionsBuilder {
        self.options.mode = mode;
        self
    }

    pub fn speculation_mode(mut self, speculation_mode: SpeculationMode) -> BuildOptionsBuilder {
        self.options.speculation_mode = speculation_mode;
        self
    }

    pub fn build(self) -> BuildOptions {
        self.options
    }
}

impl default::Default for BuildOptionsBuilder {
    fn default() -> BuildOptionsBuilder {
        BuildOptionsBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_from_json() {
        let options: BuildOptions =
            serde_json::from_str(r#"{"windowSize": 3, "speculationMode": "stack-guard"}"#)
                .unwrap();
        assert_eq!(options.window_size(), 3);
        assert_eq!(options.mode(), BuildMode::Light);
        assert_eq!(options.speculation_mode(), SpeculationMode::StackGuard);
    }

    #[test]
    fn mode_names() {
        assert_eq!("meta".parse::<BuildMode>().unwrap(), BuildMode::Meta);
        assert!("expanded".parse::<BuildMode>().is_err());
        assert_eq!(
            "stack-guard".parse::<SpeculationMode>().unwrap().to_string(),
            "stack-guard"
        );
    }
}
