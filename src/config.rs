use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::backup::GCS_ENDPOINT;

const APP_DIR: &str = ".opsbot";
const TELEGRAM_API: &str = "https://api.telegram.org";
const TOKEN_ENV: &str = "OPSBOT_TELEGRAM_TOKEN";

#[derive(Parser, Debug)]
#[command(version, about = "Telegram remote control for a locally running service")]
pub struct Cli {
    /// Telegram Bot token (saved to config directory)
    #[arg(long)]
    pub token: Option<String>,

    /// Telegram user ID allowed to issue commands
    #[arg(long, env = "OPSBOT_USER_ID")]
    pub user_id: u64,

    /// Cloud Storage bucket for /backup (disabled when unset)
    #[arg(long, env = "OPSBOT_GCS_BUCKET")]
    pub gcs_bucket: Option<String>,

    /// OAuth access token for Cloud Storage (default: GCE metadata server)
    #[arg(long, env = "OPSBOT_GCS_ACCESS_TOKEN", hide_env_values = true)]
    pub gcs_access_token: Option<String>,

    /// Service-account JSON key for Cloud Storage
    #[arg(long, env = "GOOGLE_APPLICATION_CREDENTIALS")]
    pub gcs_credentials: Option<PathBuf>,

    /// Cloud Storage API endpoint, e.g. a local emulator
    #[arg(long, env = "OPSBOT_GCS_ENDPOINT", default_value = GCS_ENDPOINT)]
    pub gcs_endpoint: String,

    /// host:port of the monitored service's debug endpoint
    #[arg(long, env = "OPSBOT_SERVICE_ADDRESS", default_value = "localhost:8080")]
    pub service_address: String,

    /// Where the service control script is written
    #[arg(long, env = "OPSBOT_SCRIPT_PATH", default_value = "./service")]
    pub script_path: PathBuf,

    /// Data file archived by /backup
    #[arg(long, env = "OPSBOT_DATA_FILE", default_value = "Stage1st.BoltDB")]
    pub data_file: String,

    /// Object name prefix for backups
    #[arg(long, default_value = "stage1st")]
    pub archive_prefix: String,
}

/// Settings fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    pub token: String,
    pub authorized_user: u64,
    pub gcs_bucket: Option<String>,
    pub gcs_access_token: Option<String>,
    pub gcs_credentials: Option<PathBuf>,
    pub gcs_endpoint: String,
    pub service_address: String,
    pub script_path: PathBuf,
    pub data_file: String,
    pub archive_dir: PathBuf,
    pub archive_prefix: String,
    pub archive_extension: String,
}

impl Config {
    pub fn from_cli(cli: Cli) -> Result<Self> {
        Self::load(cli, config_path().as_deref())
    }

    /// Resolve the token against the saved config at `saved`.
    fn load(mut cli: Cli, saved: Option<&Path>) -> Result<Self> {
        let token = resolve_token(cli.token.take(), saved)?;
        Ok(Self::with_token(cli, token))
    }

    fn with_token(cli: Cli, token: String) -> Self {
        Self {
            token,
            authorized_user: cli.user_id,
            gcs_bucket: cli.gcs_bucket.filter(|b| !b.trim().is_empty()),
            gcs_access_token: cli.gcs_access_token.filter(|t| !t.trim().is_empty()),
            gcs_credentials: cli.gcs_credentials.filter(|p| !p.as_os_str().is_empty()),
            gcs_endpoint: cli.gcs_endpoint,
            service_address: cli.service_address,
            script_path: cli.script_path,
            data_file: cli.data_file,
            archive_dir: PathBuf::from("."),
            archive_prefix: cli.archive_prefix,
            archive_extension: "gzip".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
struct AppConfig {
    token: Option<String>,
}

fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(APP_DIR).join("config.json"))
}

fn read_config_file(path: &Path) -> AppConfig {
    let Ok(content) = fs::read_to_string(path) else {
        return AppConfig::default();
    };
    serde_json::from_str::<AppConfig>(&content).unwrap_or_default()
}

fn write_config_file(path: &Path, config: &AppConfig) {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    if let Ok(serialized) = serde_json::to_string_pretty(config) {
        if let Err(e) = fs::write(path, &serialized) {
            tracing::warn!(path = %path.display(), error = %e, "failed to save config");
            return;
        }

        // Token file: owner-only read/write
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
        }
    }
}

fn remember_token(path: &Path, token: &str) {
    let mut cfg = read_config_file(path);
    cfg.token = Some(token.to_string());
    write_config_file(path, &cfg);
}

/// Flag, then `OPSBOT_TELEGRAM_TOKEN`, then `TELEGRAM_BOT_TOKEN`, then the
/// saved config file. Tokens from the first three are saved for next time.
fn resolve_token(cli_token: Option<String>, saved: Option<&Path>) -> Result<String> {
    let explicit = cli_token
        .into_iter()
        .chain(env::var(TOKEN_ENV).ok())
        .chain(env::var("TELEGRAM_BOT_TOKEN").ok())
        .find(|t| !t.trim().is_empty());
    if let Some(token) = explicit {
        if let Some(path) = saved {
            remember_token(path, &token);
        }
        return Ok(token);
    }

    let saved = saved
        .map(read_config_file)
        .and_then(|c| c.token)
        .filter(|t| !t.trim().is_empty());
    saved.with_context(|| {
        format!(
            "Telegram token not found. Use one of:\n  1) {} --token <TOKEN>\n  2) export {}=<TOKEN>\n  3) export TELEGRAM_BOT_TOKEN=<TOKEN>\n  4) save token in ~/{}/config.json",
            env!("CARGO_BIN_NAME"),
            TOKEN_ENV,
            APP_DIR,
        )
    })
}

#[derive(Debug, Deserialize)]
struct GetMeResponse {
    ok: bool,
    #[serde(default)]
    result: Option<BotIdentity>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BotIdentity {
    id: u64,
    #[serde(default)]
    username: Option<String>,
}

/// Check the token with `getMe` and return the bot's username.
pub async fn validate_telegram_token(token: &str) -> Result<String> {
    validate_token_at(TELEGRAM_API, token).await
}

async fn validate_token_at(api: &str, token: &str) -> Result<String> {
    let resp = reqwest::get(format!("{api}/bot{token}/getMe"))
        .await
        .context("Failed to call Telegram getMe API")?;
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();

    // Telegram answers rejected tokens with 401 and a JSON description.
    let reply = serde_json::from_str::<GetMeResponse>(&body).ok();
    let bot = match reply {
        Some(GetMeResponse {
            ok: true,
            result: Some(bot),
            ..
        }) if status.is_success() => bot,
        Some(GetMeResponse {
            description: Some(reason),
            ..
        }) => anyhow::bail!("Telegram rejected the bot token (HTTP {status}): {reason}"),
        _ => anyhow::bail!("Telegram token validation failed (HTTP {status}): {body}"),
    };

    let username = bot.username.unwrap_or_else(|| bot.id.to_string());
    tracing::info!(bot = %username, bot_id = bot.id, "telegram token accepted");
    Ok(username)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::serve_once;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args).expect("arguments should parse")
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&["opsbot", "--user-id", "42"]);
        let cfg = Config::with_token(cli, "t".into());
        assert_eq!(cfg.authorized_user, 42);
        assert_eq!(cfg.service_address, "localhost:8080");
        assert_eq!(cfg.script_path, PathBuf::from("./service"));
        assert_eq!(cfg.data_file, "Stage1st.BoltDB");
        assert_eq!(cfg.archive_prefix, "stage1st");
        assert_eq!(cfg.archive_extension, "gzip");
        assert_eq!(cfg.gcs_endpoint, "https://storage.googleapis.com");
    }

    #[test]
    fn test_blank_bucket_disables_backup() {
        let cli = parse(&["opsbot", "--user-id", "1", "--gcs-bucket", "  "]);
        let cfg = Config::with_token(cli, "t".into());
        assert!(cfg.gcs_bucket.is_none());
    }

    #[test]
    fn test_bucket_and_address() {
        let cli = parse(&[
            "opsbot",
            "--user-id",
            "1",
            "--gcs-bucket",
            "my-backups",
            "--service-address",
            "10.0.0.2:9000",
        ]);
        let cfg = Config::with_token(cli, "t".into());
        assert_eq!(cfg.gcs_bucket.as_deref(), Some("my-backups"));
        assert_eq!(cfg.service_address, "10.0.0.2:9000");
    }

    #[test]
    fn test_credentials_flag() {
        let cli = parse(&[
            "opsbot",
            "--user-id",
            "1",
            "--gcs-credentials",
            "/etc/opsbot/key.json",
        ]);
        let cfg = Config::with_token(cli, "t".into());
        assert_eq!(
            cfg.gcs_credentials.as_deref(),
            Some(Path::new("/etc/opsbot/key.json"))
        );
    }

    #[test]
    fn test_user_id_must_be_numeric() {
        assert!(Cli::try_parse_from(["opsbot", "--user-id", "alice"]).is_err());
    }

    #[test]
    fn test_load_uses_flag_token_and_saves_it() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let saved = tmp.path().join(APP_DIR).join("config.json");
        let cli = parse(&[
            "opsbot",
            "--user-id",
            "7",
            "--token",
            "123:flag",
            "--gcs-bucket",
            "my-backups",
        ]);

        let cfg = Config::load(cli, Some(&saved)).expect("config should load");

        assert_eq!(cfg.token, "123:flag");
        assert_eq!(cfg.authorized_user, 7);
        assert_eq!(cfg.gcs_bucket.as_deref(), Some("my-backups"));
        assert_eq!(read_config_file(&saved).token.as_deref(), Some("123:flag"));
    }

    #[test]
    fn test_load_falls_back_to_saved_token() {
        if env::var(TOKEN_ENV).is_ok() || env::var("TELEGRAM_BOT_TOKEN").is_ok() {
            return;
        }
        let tmp = tempfile::tempdir().expect("tempdir");
        let saved = tmp.path().join("config.json");
        write_config_file(
            &saved,
            &AppConfig {
                token: Some("123:saved".into()),
            },
        );

        let cfg = Config::load(parse(&["opsbot", "--user-id", "7"]), Some(&saved))
            .expect("saved token should be used");
        assert_eq!(cfg.token, "123:saved");

        let missing = tmp.path().join("missing.json");
        let err = Config::load(parse(&["opsbot", "--user-id", "7"]), Some(&missing))
            .expect_err("no token anywhere");
        assert!(err.to_string().contains("Telegram token not found"));
    }

    #[test]
    fn test_config_file_roundtrip() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join(APP_DIR).join("config.json");
        write_config_file(
            &path,
            &AppConfig {
                token: Some("123:abc".into()),
            },
        );
        assert_eq!(read_config_file(&path).token.as_deref(), Some("123:abc"));

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&path).expect("metadata").permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_unreadable_config_is_default() {
        let cfg = read_config_file(Path::new("/nonexistent/opsbot/config.json"));
        assert!(cfg.token.is_none());
    }

    #[tokio::test]
    async fn test_validate_token_returns_username() {
        let (addr, server) = serve_once(
            "200 OK",
            r#"{"ok":true,"result":{"id":4242,"is_bot":true,"first_name":"Ops","username":"ops_test_bot"}}"#,
        )
        .await;

        let username = validate_token_at(&format!("http://{addr}"), "123:abc")
            .await
            .expect("token should be accepted");
        assert_eq!(username, "ops_test_bot");

        let request = server.await.expect("server task");
        assert!(request.starts_with("GET /bot123:abc/getMe HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_validate_token_reports_telegram_reason() {
        let (addr, _server) = serve_once(
            "401 Unauthorized",
            r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#,
        )
        .await;

        let err = validate_token_at(&format!("http://{addr}"), "bad")
            .await
            .expect_err("rejected token must fail");
        assert!(err.to_string().contains("rejected the bot token"));
        assert!(err.to_string().contains("Unauthorized"));
    }
}
