//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! OAuth secrets come from env vars or `*_file` paths and are never stored
//! in the TOML directly.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

pub const REFRESH_TOKEN_ENV: &str = "OAUTH_REFRESH_TOKEN";
pub const CLIENT_SECRET_ENV: &str = "OAUTH_CLIENT_SECRET";
pub const ACCESS_TOKEN_ENV: &str = "OAUTH_ACCESS_TOKEN";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub proxy: ProxyConfig,
    pub oauth: OAuthConfig,
}

/// HTTP proxy settings
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub upstream_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Token endpoint and client identity
#[derive(Debug, Deserialize)]
pub struct OAuthConfig {
    pub token_endpoint: String,
    pub client_id: String,
    /// Confidential clients only
    #[serde(default)]
    pub client_secret_file: Option<PathBuf>,
    #[serde(default)]
    pub refresh_token_file: Option<PathBuf>,
    #[serde(default)]
    pub access_token_file: Option<PathBuf>,
    #[serde(default = "default_refresh_timeout")]
    pub refresh_timeout_secs: u64,

    #[serde(skip)]
    pub client_secret: Option<Secret<String>>,
    /// Always set after `Config::load`
    #[serde(skip)]
    pub refresh_token: Option<Secret<String>>,
    #[serde(skip)]
    pub access_token: Option<Secret<String>>,
}

fn default_timeout() -> u64 {
    60
}

fn default_max_connections() -> usize {
    1000
}

fn default_refresh_timeout() -> u64 {
    oauth_refresh::DEFAULT_REFRESH_TIMEOUT_SECS
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Each secret resolves from its env var first, then from its `*_file`
    /// path. A refresh token is required.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        let oauth = &mut config.oauth;
        oauth.refresh_token = resolve_secret(
            REFRESH_TOKEN_ENV,
            oauth.refresh_token_file.as_deref(),
            "refresh_token_file",
        )?;
        oauth.client_secret = resolve_secret(
            CLIENT_SECRET_ENV,
            oauth.client_secret_file.as_deref(),
            "client_secret_file",
        )?;
        oauth.access_token = resolve_secret(
            ACCESS_TOKEN_ENV,
            oauth.access_token_file.as_deref(),
            "access_token_file",
        )?;

        if oauth.refresh_token.is_none() {
            return Err(common::Error::Config(format!(
                "no refresh token configured: set {REFRESH_TOKEN_ENV} or oauth.refresh_token_file"
            )));
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        require_http_url("upstream_url", &self.proxy.upstream_url)?;
        require_http_url("token_endpoint", &self.oauth.token_endpoint)?;

        if self.proxy.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.proxy.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.oauth.refresh_timeout_secs == 0 {
            return Err(common::Error::Config(
                "refresh_timeout_secs must be greater than 0".into(),
            ));
        }
        if self.oauth.client_id.trim().is_empty() {
            return Err(common::Error::Config("client_id must not be empty".into()));
        }
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("token-proxy.toml")
    }
}

fn require_http_url(field: &str, value: &str) -> common::Result<()> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(common::Error::Config(format!(
            "{field} must start with http:// or https://, got: {value}"
        )))
    }
}

/// Env var wins over the file. A file holding only whitespace yields `None`.
fn resolve_secret(
    env_var: &str,
    file: Option<&Path>,
    field: &str,
) -> common::Result<Option<Secret<String>>> {
    if let Ok(value) = std::env::var(env_var) {
        let value = value.trim();
        if !value.is_empty() {
            return Ok(Some(Secret::new(value.to_owned())));
        }
    }

    let Some(file) = file else {
        return Ok(None);
    };
    let contents = std::fs::read_to_string(file).map_err(|e| {
        common::Error::Config(format!("failed to read {field} {}: {e}", file.display()))
    })?;
    let value = contents.trim();
    if value.is_empty() {
        Ok(None)
    } else {
        Ok(Some(Secret::new(value.to_owned())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    unsafe fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) };
    }

    fn clear_secret_env() {
        unsafe {
            remove_env(REFRESH_TOKEN_ENV);
            remove_env(CLIENT_SECRET_ENV);
            remove_env(ACCESS_TOKEN_ENV);
        }
    }

    fn toml_with_oauth(extra: &str) -> String {
        format!(
            r#"
[proxy]
listen_addr = "127.0.0.1:8080"
upstream_url = "https://api.x.com"

[oauth]
token_endpoint = "https://api.x.com/2/oauth2/token"
client_id = "client-abc"
{extra}
"#
        )
    }

    fn write_config(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("token-proxy.toml");
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_load_valid_config_with_env_refresh_token() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, &toml_with_oauth(""));

        unsafe { set_env(REFRESH_TOKEN_ENV, "R0") };
        let config = Config::load(&path).unwrap();
        clear_secret_env();

        assert_eq!(config.proxy.upstream_url, "https://api.x.com");
        assert_eq!(config.proxy.timeout_secs, 60);
        assert_eq!(config.proxy.max_connections, 1000);
        assert_eq!(config.oauth.client_id, "client-abc");
        assert_eq!(config.oauth.refresh_timeout_secs, 30);
        assert_eq!(config.oauth.refresh_token.as_ref().unwrap().expose(), "R0");
        assert!(config.oauth.client_secret.is_none());
        assert!(config.oauth.access_token.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Path::new("/nonexistent/path/config.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, "not valid {{{{ toml");
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_missing_refresh_token_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(&dir, &toml_with_oauth(""));

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains(REFRESH_TOKEN_ENV),
            "error should name the env var, got: {err}"
        );
    }

    #[test]
    fn test_secrets_from_files() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = tempfile::tempdir().unwrap();
        let refresh_path = dir.path().join("refresh_token");
        let secret_path = dir.path().join("client_secret");
        let access_path = dir.path().join("access_token");
        std::fs::write(&refresh_path, "R-file\n").unwrap();
        std::fs::write(&secret_path, "s3cret\n").unwrap();
        std::fs::write(&access_path, "A-file").unwrap();

        let path = write_config(
            &dir,
            &toml_with_oauth(&format!(
                "refresh_token_file = \"{}\"\nclient_secret_file = \"{}\"\naccess_token_file = \"{}\"",
                refresh_path.display(),
                secret_path.display(),
                access_path.display()
            )),
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.oauth.refresh_token.as_ref().unwrap().expose(),
            "R-file"
        );
        assert_eq!(
            config.oauth.client_secret.as_ref().unwrap().expose(),
            "s3cret"
        );
        assert_eq!(
            config.oauth.access_token.as_ref().unwrap().expose(),
            "A-file"
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = tempfile::tempdir().unwrap();
        let refresh_path = dir.path().join("refresh_token");
        std::fs::write(&refresh_path, "R-file").unwrap();
        let path = write_config(
            &dir,
            &toml_with_oauth(&format!(
                "refresh_token_file = \"{}\"",
                refresh_path.display()
            )),
        );

        unsafe { set_env(REFRESH_TOKEN_ENV, "R-env") };
        let config = Config::load(&path).unwrap();
        clear_secret_env();

        assert_eq!(
            config.oauth.refresh_token.as_ref().unwrap().expose(),
            "R-env",
            "{REFRESH_TOKEN_ENV} must take precedence over refresh_token_file"
        );
    }

    #[test]
    fn test_env_overrides_nonexistent_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &toml_with_oauth("refresh_token_file = \"/nonexistent/refresh_token\""),
        );

        unsafe { set_env(REFRESH_TOKEN_ENV, "R-env") };
        let result = Config::load(&path);
        clear_secret_env();

        assert_eq!(
            result.unwrap().oauth.refresh_token.unwrap().expose(),
            "R-env"
        );
    }

    #[test]
    fn test_nonexistent_secret_file_returns_error() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            &toml_with_oauth("refresh_token_file = \"/nonexistent/refresh_token\""),
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("refresh_token_file"), "got: {err}");
    }

    #[test]
    fn test_whitespace_only_access_token_file_yields_none() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = tempfile::tempdir().unwrap();
        let access_path = dir.path().join("access_token");
        std::fs::write(&access_path, "  \n  ").unwrap();
        let path = write_config(
            &dir,
            &toml_with_oauth(&format!(
                "access_token_file = \"{}\"",
                access_path.display()
            )),
        );

        unsafe { set_env(REFRESH_TOKEN_ENV, "R0") };
        let config = Config::load(&path).unwrap();
        clear_secret_env();

        assert!(config.oauth.access_token.is_none());
    }

    #[test]
    fn test_invalid_upstream_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[proxy]
listen_addr = "127.0.0.1:8080"
upstream_url = "api.x.com"

[oauth]
token_endpoint = "https://api.x.com/2/oauth2/token"
client_id = "client-abc"
"#,
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(
            err.contains("upstream_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_invalid_token_endpoint_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[proxy]
listen_addr = "127.0.0.1:8080"
upstream_url = "https://api.x.com"

[oauth]
token_endpoint = "ftp://api.x.com/token"
client_id = "client-abc"
"#,
        );

        let err = Config::load(&path).unwrap_err().to_string();
        assert!(err.contains("token_endpoint"), "got: {err}");
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let dir = tempfile::tempdir().unwrap();
        for (proxy_extra, oauth_extra) in [
            ("timeout_secs = 0", ""),
            ("max_connections = 0", ""),
            ("", "refresh_timeout_secs = 0"),
        ] {
            let path = write_config(
                &dir,
                &format!(
                    r#"
[proxy]
listen_addr = "127.0.0.1:8080"
upstream_url = "https://api.x.com"
{proxy_extra}

[oauth]
token_endpoint = "https://api.x.com/2/oauth2/token"
client_id = "client-abc"
{oauth_extra}
"#
                ),
            );
            assert!(
                Config::load(&path).is_err(),
                "config with `{proxy_extra}{oauth_extra}` must be rejected"
            );
        }
    }

    #[test]
    fn test_custom_limits() {
        let _lock = ENV_MUTEX.lock().unwrap();
        clear_secret_env();
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            &dir,
            r#"
[proxy]
listen_addr = "127.0.0.1:9090"
upstream_url = "http://localhost:3000"
timeout_secs = 15
max_connections = 500

[oauth]
token_endpoint = "http://localhost:3001/token"
client_id = "client-abc"
refresh_timeout_secs = 5
"#,
        );

        unsafe { set_env(REFRESH_TOKEN_ENV, "R0") };
        let config = Config::load(&path).unwrap();
        clear_secret_env();

        assert_eq!(config.proxy.listen_addr.port(), 9090);
        assert_eq!(config.proxy.timeout_secs, 15);
        assert_eq!(config.proxy.max_connections, 500);
        assert_eq!(config.oauth.refresh_timeout_secs, 5);
    }

    #[test]
    fn test_resolve_path_cli_arg() {
        let path = Config::resolve_path(Some("/custom/path.toml"));
        assert_eq!(path, PathBuf::from("/custom/path.toml"));
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("/env/path.toml"));
        unsafe { remove_env("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_default() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { remove_env("CONFIG_PATH") };
        let path = Config::resolve_path(None);
        assert_eq!(path, PathBuf::from("token-proxy.toml"));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            PathBuf::from("/cli/wins.toml"),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { remove_env("CONFIG_PATH") };
    }
}
