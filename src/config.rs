use std::path::PathBuf;
use std::time::Duration;

/// Runtime settings for the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Backend base URL, without trailing slash
    pub api_url: String,
    /// Per-request timeout; expiry is a network failure, never a 401
    pub timeout: Duration,
    /// Prefix of the login/refresh/logout endpoints, possibly empty
    pub auth_prefix: String,
    pub storage_dir: PathBuf,
    /// Name of the persisted session blob
    pub storage_name: String,
    /// Pause between a session expiry notice and the reload
    pub reload_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_millis(10_000),
            auth_prefix: "/admin".to_string(),
            storage_dir: PathBuf::from(".stitch-admin"),
            storage_name: "user-storage".to_string(),
            reload_delay: Duration::from_millis(1_500),
        }
    }
}

impl Config {
    /// Full path of the persisted session blob.
    pub fn storage_path(&self) -> PathBuf {
        self.storage_dir.join(format!("{}.json", self.storage_name))
    }
}
