//! Bootstrap helpers: the `~/.openwork` home and early `.env` loading.
//!
//! File: `~/.openwork/.env` (standard dotenvy format)

use std::path::PathBuf;

/// `~/.openwork`
pub fn openwork_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".openwork")
}

/// Path to the OpenWork-specific `.env` file: `~/.openwork/.env`.
pub fn openwork_env_path() -> PathBuf {
    openwork_home().join(".env")
}

/// Default location of the provider registry and secrets.
pub fn default_data_dir() -> PathBuf {
    openwork_home().join("server")
}

/// Load `./.env`, then `~/.openwork/.env`.
///
/// dotenvy never overwrites existing env vars, so the effective priority is:
///
///   explicit env vars > `./.env` > `~/.openwork/.env`
pub fn load_openwork_env() {
    let _ = dotenvy::dotenv();
    let path = openwork_env_path();
    if path.exists() {
        let _ = dotenvy::from_path(&path);
    }
}
