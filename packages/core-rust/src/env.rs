/// Name used when no deployment environment is configured.
pub const GLOBAL_ENV: &str = "Global";

/// Deployment environment a request runs in (e.g. `"staging"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvContext {
    name: String,
}

impl EnvContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[must_use]
    pub fn global() -> Self {
        Self::new(GLOBAL_ENV)
    }

    /// Reads the environment name from the process variable `var`.
    ///
    /// An unset or non-UTF-8 variable yields an empty name.
    #[must_use]
    pub fn from_env_var(var: &str) -> Self {
        Self::new(std::env::var(var).unwrap_or_default())
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Default for EnvContext {
    fn default() -> Self {
        Self::global()
    }
}
