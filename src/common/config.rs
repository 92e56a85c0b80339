//! Emitter configuration.

/// Configuration threaded into `emit_class`.
///
/// The only switch the emitter reads is `debug`: when enabled, every
/// `let` binding and method parameter gets a LocalVariableTable entry.
/// Nothing else in the output depends on configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Emit LocalVariableTable debug entries.
    pub debug: bool,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Read configuration from the environment. `CLASSGEN_DEBUG=1` (or
    /// `true`) enables debug tables.
    pub fn from_env() -> Self {
        let debug = std::env::var("CLASSGEN_DEBUG")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self { debug }
    }
}
