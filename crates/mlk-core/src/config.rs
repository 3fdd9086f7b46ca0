use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Process configuration, read from the environment (and an optional `.env`).
///
/// Engagement settings are not here: they belong to the operator and live in
/// the state store.
#[derive(Clone, Debug)]
pub struct Config {
    pub db_path: PathBuf,

    // Control bot
    pub bot_token: Option<String>,
    pub admin_users: Vec<i64>,

    // Messaging gateway
    pub gateway_url: String,
    pub gateway_token: Option<String>,
    pub throttle: Duration,

    // Discovery scraper
    pub scraper_cmd: PathBuf,
    pub scraper_args: Vec<String>,
    pub scraper_timeout: Duration,

    // Comment generation
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub prompt_file: PathBuf,

    pub processed_retention_days: u32,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let gateway_url = env_str("MLK_GATEWAY_URL")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("MLK_GATEWAY_URL environment variable is required".to_string())
            })?;

        let scraper_cmd = env_str("MLK_SCRAPER_CMD")
            .and_then(non_empty)
            .ok_or_else(|| {
                Error::Config("MLK_SCRAPER_CMD environment variable is required".to_string())
            })?;
        // Bare program names are looked up on PATH.
        let scraper_cmd = if scraper_cmd.contains('/') {
            PathBuf::from(scraper_cmd)
        } else {
            which_in_path(&scraper_cmd).unwrap_or_else(|| PathBuf::from(scraper_cmd))
        };

        Ok(Self {
            db_path: env_path("MLK_DB_PATH").unwrap_or_else(|| PathBuf::from("bot_state.db")),
            bot_token: env_str("MLK_BOT_TOKEN").and_then(non_empty),
            admin_users: parse_csv_i64(env_str("MLK_ADMIN_USERS")),
            gateway_url: gateway_url.trim_end_matches('/').to_string(),
            gateway_token: env_str("MLK_GATEWAY_TOKEN").and_then(non_empty),
            throttle: Duration::from_millis(env_u64("MLK_THROTTLE_MS").unwrap_or(1000)),
            scraper_cmd,
            scraper_args: parse_csv(env_str("MLK_SCRAPER_ARGS")),
            scraper_timeout: Duration::from_secs(
                env_u64("MLK_SCRAPER_TIMEOUT_SECS").unwrap_or(180),
            ),
            openai_api_key: env_str("OPENAI_API_KEY").and_then(non_empty),
            openai_model: env_str("OPENAI_MODEL")
                .and_then(non_empty)
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            prompt_file: env_path("MLK_PROMPT_FILE")
                .unwrap_or_else(|| PathBuf::from("prompt_for_generating_comments.txt")),
            processed_retention_days: env_u32("MLK_PROCESSED_RETENTION_DAYS").unwrap_or(30),
        })
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env_str(key).and_then(|s| s.trim().parse::<u32>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    parse_csv(v)
        .into_iter()
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn parse_csv(v: Option<String>) -> Vec<String> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn which_in_path(binary: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    for dir in env::split_paths(&path) {
        let candidate = dir.join(binary);
        if is_executable_file(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable_file(p: &Path) -> bool {
    if !p.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(md) = fs::metadata(p) {
            return (md.permissions().mode() & 0o111) != 0;
        }
    }
    true
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
