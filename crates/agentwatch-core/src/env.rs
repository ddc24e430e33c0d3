//! Environment variable handling.

use std::collections::HashMap;
use std::env;

/// Safe PATH handed to workspace processes instead of the caller's PATH.
pub const SAFE_PATH: &str = "/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Variables that are never forwarded into a workspace.
pub const BLOCKED_ENV_VARS: &[&str] = &[
    // Dynamic linker injection
    "LD_PRELOAD",
    "LD_LIBRARY_PATH",
    "LD_AUDIT",
    "DYLD_INSERT_LIBRARIES",
    "DYLD_LIBRARY_PATH",
    // Runtime injection
    "NODE_OPTIONS",
    "NODE_PATH",
    "PYTHONSTARTUP",
    "PYTHONPATH",
    "PYTHONHOME",
    "RUBYOPT",
    "RUBYLIB",
    "PERL5OPT",
    "PERL5LIB",
    // Shell injection
    "BASH_ENV",
    "ENV",
    "IFS",
    // Other dangerous
    "GCONV_PATH",
    "SSLKEYLOGFILE",
];

/// Blocked environment variable prefixes.
pub const BLOCKED_ENV_PREFIXES: &[&str] = &["DYLD_", "LD_"];

/// Variables inherited from the host when a workspace starts from a clean env.
pub const INHERITED_ENV_VARS: &[&str] = &["HOME", "USER", "LANG", "LC_ALL", "TERM", "TZ"];

/// Check if an environment variable name is blocked.
pub fn is_env_var_blocked(name: &str) -> bool {
    if BLOCKED_ENV_VARS.contains(&name) {
        return true;
    }
    BLOCKED_ENV_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

/// Get an environment variable, returning None if not set or empty.
pub fn get_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

/// Get an environment variable with a default value.
pub fn get_var_or(name: &str, default: &str) -> String {
    get_var(name).unwrap_or_else(|| default.to_string())
}

/// Filter environment variables, removing blocked ones.
pub fn filter_env(env: &HashMap<String, String>) -> HashMap<String, String> {
    env.iter()
        .filter(|(k, _)| !is_env_var_blocked(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Build the base environment for a workspace process.
///
/// Starts empty, copies the small set of [`INHERITED_ENV_VARS`] from the host
/// and pins `PATH` to [`SAFE_PATH`].
pub fn base_workspace_env() -> HashMap<String, String> {
    let mut env: HashMap<String, String> = INHERITED_ENV_VARS
        .iter()
        .filter_map(|name| get_var(name).map(|v| ((*name).to_string(), v)))
        .collect();
    env.insert("PATH".to_string(), SAFE_PATH.to_string());
    env
}

/// Common environment variable names.
pub mod vars {
    /// AgentWatch home directory override.
    pub const AGENTWATCH_HOME: &str = "AGENTWATCH_HOME";

    /// AgentWatch config file override.
    pub const AGENTWATCH_CONFIG: &str = "AGENTWATCH_CONFIG";

    /// AgentWatch log filter.
    pub const AGENTWATCH_LOG: &str = "AGENTWATCH_LOG";

    /// Container engine binary override (defaults to `docker`).
    pub const AGENTWATCH_CONTAINER_ENGINE: &str = "AGENTWATCH_CONTAINER_ENGINE";
}
