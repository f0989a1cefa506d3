use std::{
    env, fs,
    path::{Path, PathBuf},
};

use crate::{domain::ChatRef, errors::Error, Result};

pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 8 * 1024 * 1024;
pub const DEFAULT_VOICE_BITRATE_KBPS: u32 = 64;
const DEFAULT_TEMP_DIR: &str = "/tmp/tg-discord-bridge";

/// Typed configuration, read once at startup.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_token: String,
    pub telegram_chat_id: i64,
    pub telegram_max_upload_bytes: u64,

    // Discord
    pub discord_token: String,
    pub discord_channel_id: u64,
    pub discord_max_upload_bytes: u64,

    // Media pipeline
    pub temp_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub voice_bitrate_kbps: u32,
}

impl Config {
    /// Load from the process environment, after applying `.env` if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (tests pass a map here).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_token = required(&get, "TELEGRAM_TOKEN")?;
        let telegram_chat_id = parse_required::<i64>(&get, "TELEGRAM_CHAT_ID")?;
        let discord_token = required(&get, "DISCORD_TOKEN")?;
        let discord_channel_id = parse_required::<u64>(&get, "DISCORD_CHANNEL_ID")?;
        if discord_channel_id == 0 {
            return Err(Error::Config(
                "DISCORD_CHANNEL_ID must be a non-zero snowflake".to_string(),
            ));
        }

        let telegram_max_upload_bytes = parse_optional(&get, "TELEGRAM_MAX_UPLOAD_BYTES")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let discord_max_upload_bytes = parse_optional(&get, "DISCORD_MAX_UPLOAD_BYTES")?
            .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES);
        let voice_bitrate_kbps =
            parse_optional(&get, "VOICE_BITRATE_KBPS")?.unwrap_or(DEFAULT_VOICE_BITRATE_KBPS);
        if voice_bitrate_kbps == 0 {
            return Err(Error::Config(
                "VOICE_BITRATE_KBPS must be greater than zero".to_string(),
            ));
        }

        let temp_dir = get("TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_TEMP_DIR));

        let ffmpeg_path = get("FFMPEG_PATH")
            .map(PathBuf::from)
            .or_else(|| which_in_path("ffmpeg"))
            .unwrap_or_else(|| PathBuf::from("ffmpeg"));

        Ok(Self {
            telegram_token,
            telegram_chat_id,
            telegram_max_upload_bytes,
            discord_token,
            discord_channel_id,
            discord_max_upload_bytes,
            temp_dir,
            ffmpeg_path,
            voice_bitrate_kbps,
        })
    }

    pub fn telegram_chat(&self) -> ChatRef {
        ChatRef::Telegram(self.telegram_chat_id)
    }

    pub fn discord_channel(&self) -> ChatRef {
        ChatRef::Discord(self.discord_channel_id)
    }
}

fn required(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    get(key).ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
}

fn parse_required<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<T> {
    let raw = required(get, key)?;
    parse_value(key, &raw)
}

fn parse_optional<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    get(key).map(|raw| parse_value(key, &raw)).transpose()
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| Error::Config(format!("{key} has an invalid value: {:?}", raw.trim())))
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

        env::set_var(key, unquote(v.trim()));
    }
}

fn unquote(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
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
