use anyhow::{Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "mail_relay";

pub const DEFAULT_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_MAX_RESULTS: u32 = 1;

/// On-disk shape of config.toml; every key optional so env vars can fill gaps.
#[derive(Debug, Default, Serialize, Deserialize, Clone)]
pub struct FileConfig {
    pub bot_token: Option<String>,
    pub channel_id: Option<String>,
    pub email_sender: Option<String>,
    pub interval_secs: Option<u64>,
    pub max_results: Option<u32>,
    pub credentials_path: Option<String>,
    pub token_path: Option<String>,
    pub redirect_port: Option<u16>,
}

/// Where the Gmail credential lives and how to obtain a new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthConfig {
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub redirect_port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub bot_token: String,
    pub channel_id: String,
    pub email_sender: String,
    pub interval: Duration,
    pub max_results: u32,
    pub auth: AuthConfig,
}

fn config_dir() -> Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow!("no config dir available"))?
        .join(APP_DIR))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// An explicit path must exist; the default one is optional.
fn load_file(path: Option<&Path>) -> Result<FileConfig> {
    let path = match path {
        Some(p) if !p.exists() => bail!("Config file {} does not exist", p.display()),
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };
    if !path.exists() {
        log::debug!("No config file at {}; using environment only", path.display());
        return Ok(FileConfig::default());
    }
    let s = fs::read_to_string(&path)?;
    toml::from_str(&s).map_err(|e| anyhow!("Invalid config {}: {e}", path.display()))
}

/// Read the TOML file if present, then layer the environment on top.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    resolve(load_file(path)?, |key| std::env::var(key).ok())
}

/// Only the credential settings; needs none of the relay keys.
pub fn load_auth_config(path: Option<&Path>) -> Result<AuthConfig> {
    Ok(resolve_auth(&load_file(path)?, |key| std::env::var(key).ok()))
}

/// Environment value if set and non-blank, else the file value if non-blank.
fn pick(
    env: &impl Fn(&str) -> Option<String>,
    key: &str,
    from_file: Option<&String>,
) -> Option<String> {
    env(key)
        .filter(|v| !v.trim().is_empty())
        .or_else(|| from_file.cloned())
        .filter(|v| !v.trim().is_empty())
}

pub fn resolve_auth(file: &FileConfig, env: impl Fn(&str) -> Option<String>) -> AuthConfig {
    AuthConfig {
        credentials_path: pick(
            &env,
            "MAIL_RELAY_CREDENTIALS_PATH",
            file.credentials_path.as_ref(),
        )
        .unwrap_or_else(|| "credentials.json".to_string())
        .into(),
        token_path: pick(&env, "MAIL_RELAY_TOKEN_PATH", file.token_path.as_ref())
            .unwrap_or_else(|| "token.json".to_string())
            .into(),
        redirect_port: file.redirect_port.unwrap_or(0),
    }
}

/// Merge file values with environment overrides and check required keys.
pub fn resolve(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Result<Config> {
    let bot_token = pick(&env, "BOT_TOKEN", file.bot_token.as_ref());
    let channel_id = pick(&env, "CHANNEL_ID", file.channel_id.as_ref());
    let email_sender = pick(&env, "EMAIL_SENDER", file.email_sender.as_ref());

    let missing: Vec<&str> = [
        ("bot_token (BOT_TOKEN)", bot_token.is_none()),
        ("channel_id (CHANNEL_ID)", channel_id.is_none()),
        ("email_sender (EMAIL_SENDER)", email_sender.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();
    if !missing.is_empty() {
        bail!("Missing configuration: {}", missing.join(", "));
    }

    let interval_secs = file.interval_secs.unwrap_or(DEFAULT_INTERVAL_SECS);
    if interval_secs == 0 {
        bail!("interval_secs must be at least 1");
    }

    Ok(Config {
        bot_token: bot_token.unwrap_or_default(),
        channel_id: channel_id.unwrap_or_default(),
        email_sender: email_sender.unwrap_or_default(),
        interval: Duration::from_secs(interval_secs),
        max_results: file.max_results.unwrap_or(DEFAULT_MAX_RESULTS).max(1),
        auth: resolve_auth(&file, &env),
    })
}

impl Config {
    /// Apply command-line overrides with the same limits as the file values.
    pub fn with_overrides(
        mut self,
        interval_secs: Option<u64>,
        max_results: Option<u32>,
    ) -> Result<Self> {
        if let Some(secs) = interval_secs {
            if secs == 0 {
                bail!("--interval must be at least 1");
            }
            self.interval = Duration::from_secs(secs);
        }
        if let Some(n) = max_results {
            self.max_results = n.max(1);
        }
        Ok(self)
    }
}

/// Write a template config for users to edit. Never overwrites.
pub fn write_template(path: &Path) -> Result<()> {
    if path.exists() {
        bail!("{} already exists; not overwriting", path.display());
    }
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        fs::create_dir_all(dir)?;
    }
    let sample = FileConfig {
        bot_token: Some("YOUR_DISCORD_BOT_TOKEN".to_string()),
        channel_id: Some("123456789012345678".to_string()),
        email_sender: Some("sender@example.com".to_string()),
        interval_secs: Some(DEFAULT_INTERVAL_SECS),
        max_results: Some(DEFAULT_MAX_RESULTS),
        credentials_path: Some("credentials.json".to_string()),
        token_path: Some("token.json".to_string()),
        redirect_port: Some(0),
    };
    fs::write(path, toml::to_string_pretty(&sample)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn env_alone_is_enough() {
        let cfg = resolve(
            FileConfig::default(),
            env_of(&[
                ("BOT_TOKEN", "tok"),
                ("CHANNEL_ID", "42"),
                ("EMAIL_SENDER", "billing@example.com"),
            ]),
        )
        .unwrap();
        assert_eq!(cfg.bot_token, "tok");
        assert_eq!(cfg.channel_id, "42");
        assert_eq!(cfg.email_sender, "billing@example.com");
        assert_eq!(cfg.interval, Duration::from_secs(10));
        assert_eq!(cfg.max_results, 1);
        assert_eq!(cfg.auth.token_path, PathBuf::from("token.json"));
        assert_eq!(cfg.auth.credentials_path, PathBuf::from("credentials.json"));
        assert_eq!(cfg.auth.redirect_port, 0);
    }

    #[test]
    fn env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            bot_token = "file-token"
            channel_id = "1"
            email_sender = "a@example.com"
            interval_secs = 60
            token_path = "/var/lib/relay/token.json"
            "#,
        )
        .unwrap();
        let cfg = resolve(file, env_of(&[("CHANNEL_ID", "2"), ("BOT_TOKEN", "")])).unwrap();
        assert_eq!(cfg.bot_token, "file-token");
        assert_eq!(cfg.channel_id, "2");
        assert_eq!(cfg.interval, Duration::from_secs(60));
        assert_eq!(cfg.auth.token_path, PathBuf::from("/var/lib/relay/token.json"));
    }

    #[test]
    fn auth_settings_need_no_relay_keys() {
        let file = FileConfig {
            redirect_port: Some(8085),
            ..Default::default()
        };
        let auth = resolve_auth(&file, env_of(&[("MAIL_RELAY_TOKEN_PATH", "/tmp/t.json")]));
        assert_eq!(auth.token_path, PathBuf::from("/tmp/t.json"));
        assert_eq!(auth.credentials_path, PathBuf::from("credentials.json"));
        assert_eq!(auth.redirect_port, 8085);
    }

    #[test]
    fn missing_keys_are_all_reported() {
        let err = resolve(FileConfig::default(), env_of(&[("BOT_TOKEN", "tok")])).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("CHANNEL_ID"));
        assert!(msg.contains("EMAIL_SENDER"));
        assert!(!msg.contains("BOT_TOKEN"));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let file = FileConfig {
            interval_secs: Some(0),
            ..Default::default()
        };
        let res = resolve(
            file,
            env_of(&[("BOT_TOKEN", "t"), ("CHANNEL_ID", "1"), ("EMAIL_SENDER", "x@y")]),
        );
        assert!(res.is_err());
    }

    #[test]
    fn template_round_trips_and_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        write_template(&path).unwrap();

        let file: FileConfig = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(file.interval_secs, Some(DEFAULT_INTERVAL_SECS));
        // placeholders, but every required key is present
        assert!(load_config(Some(&path)).is_ok());

        assert!(write_template(&path).is_err());
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = load_auth_config(Some(&missing)).unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
        assert!(load_config(Some(&missing)).is_err());
    }

    fn base() -> Config {
        resolve(
            FileConfig::default(),
            env_of(&[("BOT_TOKEN", "t"), ("CHANNEL_ID", "1"), ("EMAIL_SENDER", "x@y")]),
        )
        .unwrap()
    }

    #[test]
    fn overrides_replace_file_values() {
        let cfg = base().with_overrides(Some(30), Some(5)).unwrap();
        assert_eq!(cfg.interval, Duration::from_secs(30));
        assert_eq!(cfg.max_results, 5);

        let unchanged = base().with_overrides(None, None).unwrap();
        assert_eq!(unchanged, base());
    }

    #[test]
    fn zero_overrides_are_bounded() {
        assert!(base().with_overrides(Some(0), None).is_err());
        assert_eq!(base().with_overrides(None, Some(0)).unwrap().max_results, 1);
    }
}
