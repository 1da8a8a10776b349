use std::path::PathBuf;
use std::time::Duration;

/// ## Machine configuration

#[derive(Debug, Clone)]
pub struct Options {
    /// Frames allowed on one task's stack.
    pub stack_limit: usize,
    /// Function calls that may be nested inside expressions.
    pub call_depth: usize,
    /// Lower bound used by `DIM` when none is given.
    pub base: i64,
    /// Longest a blocking statement waits between break checks.
    pub poll_interval: Duration,
    /// Directories searched for plugin modules.
    pub module_path: Vec<PathBuf>,
}

impl Default for Options {
    fn default() -> Options {
        Options {
            stack_limit: u16::max_value() as usize,
            call_depth: 128,
            base: 0,
            poll_interval: Duration::from_millis(50),
            module_path: vec![],
        }
    }
}

impl Options {
    /// Defaults plus the plugin search path from `BASIC_LIBPATH`.
    pub fn from_env() -> Options {
        let mut options = Options::default();
        if let Some(paths) = std::env::var_os("BASIC_LIBPATH") {
            options.module_path = std::env::split_paths(&paths).collect();
        }
        options
    }
}
