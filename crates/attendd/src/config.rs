use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which speech backend to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnouncerKind {
    /// Local speech program only.
    Offline,
    /// Network TTS with local fallback.
    Network,
}

impl std::str::FromStr for AnnouncerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(AnnouncerKind::Offline),
            "network" => Ok(AnnouncerKind::Network),
            other => Err(format!("unknown announcer {other:?} (expected offline or network)")),
        }
    }
}

/// Daemon configuration. Fixed for the lifetime of the process.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Frame feed: a file path, or `-` for stdin.
    pub feed: String,
    /// Maximum Euclidean distance accepted as a match.
    pub tolerance: f32,
    /// Minimum interval between two logged events for one identity.
    pub cooldown: Duration,
    /// Dimension every enrolled and observed embedding must have.
    pub embedding_dim: usize,
    /// Process every Nth frame of the feed.
    pub frame_stride: usize,
    pub announcer: AnnouncerKind,
    /// Offline speech program, invoked as `<program> <args..> <text>`.
    pub speech_program: String,
    pub speech_args: Vec<String>,
    /// Network TTS endpoint, queried with `text` and `lang` parameters.
    pub tts_url: Option<String>,
    pub tts_lang: String,
    /// Audio player used for network TTS output, invoked as `<player> <file>`.
    pub tts_player: String,
    /// Whether unmatched faces get a registration prompt.
    pub greet_unknown: bool,
    /// Minimum interval between two registration prompts.
    pub unknown_interval: Duration,
    /// Serve on the system bus instead of the session bus.
    pub system_bus: bool,
}

/// Optional TOML file named by `ATTEND_CONFIG`. Environment variables win.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    db_path: Option<PathBuf>,
    feed: Option<String>,
    tolerance: Option<f32>,
    cooldown_secs: Option<u64>,
    embedding_dim: Option<usize>,
    frame_stride: Option<usize>,
    announcer: Option<AnnouncerKind>,
    speech_program: Option<String>,
    speech_args: Option<Vec<String>>,
    tts_url: Option<String>,
    tts_lang: Option<String>,
    tts_player: Option<String>,
    greet_unknown: Option<bool>,
    unknown_interval_secs: Option<u64>,
    system_bus: Option<bool>,
}

impl Config {
    /// Load from `ATTEND_CONFIG` (if set) and `ATTEND_*` environment variables.
    pub fn load() -> Result<Self> {
        let file = match std::env::var("ATTEND_CONFIG") {
            Ok(path) => read_file_config(Path::new(&path))?,
            Err(_) => FileConfig::default(),
        };
        Self::resolve(file, |key| std::env::var(key).ok())
    }

    fn resolve<F>(file: FileConfig, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = match env("ATTEND_DB_PATH").map(PathBuf::from).or(file.db_path) {
            Some(p) => p,
            None => default_data_dir(&env).join("attendance.db"),
        };

        let config = Self {
            db_path,
            feed: env("ATTEND_FEED").or(file.feed).unwrap_or_else(|| "-".to_string()),
            tolerance: parsed(&env, "ATTEND_TOLERANCE")?
                .or(file.tolerance)
                .unwrap_or(attend_core::DEFAULT_TOLERANCE),
            cooldown: Duration::from_secs(
                parsed(&env, "ATTEND_COOLDOWN_SECS")?
                    .or(file.cooldown_secs)
                    .unwrap_or(attend_core::DEFAULT_COOLDOWN_SECS),
            ),
            embedding_dim: parsed(&env, "ATTEND_EMBEDDING_DIM")?
                .or(file.embedding_dim)
                .unwrap_or(attend_core::DEFAULT_EMBEDDING_DIM),
            frame_stride: parsed(&env, "ATTEND_FRAME_STRIDE")?
                .or(file.frame_stride)
                .unwrap_or(1),
            announcer: parsed(&env, "ATTEND_ANNOUNCER")?
                .or(file.announcer)
                .unwrap_or(AnnouncerKind::Offline),
            speech_program: env("ATTEND_SPEECH_PROGRAM")
                .or(file.speech_program)
                .unwrap_or_else(|| "espeak-ng".to_string()),
            speech_args: match env("ATTEND_SPEECH_ARGS") {
                Some(args) => args.split_whitespace().map(str::to_string).collect(),
                None => file.speech_args.unwrap_or_default(),
            },
            tts_url: env("ATTEND_TTS_URL").or(file.tts_url),
            tts_lang: env("ATTEND_TTS_LANG")
                .or(file.tts_lang)
                .unwrap_or_else(|| "en".to_string()),
            tts_player: env("ATTEND_TTS_PLAYER")
                .or(file.tts_player)
                .unwrap_or_else(|| "mpg123".to_string()),
            greet_unknown: env("ATTEND_GREET_UNKNOWN")
                .map(|v| v != "0")
                .or(file.greet_unknown)
                .unwrap_or(false),
            unknown_interval: Duration::from_secs(
                parsed(&env, "ATTEND_UNKNOWN_INTERVAL_SECS")?
                    .or(file.unknown_interval_secs)
                    .unwrap_or(10),
            ),
            system_bus: env("ATTEND_SYSTEM_BUS")
                .map(|v| v != "0")
                .or(file.system_bus)
                .unwrap_or(false),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            bail!("tolerance must be a positive number, got {}", self.tolerance);
        }
        if self.embedding_dim == 0 {
            bail!("embedding dimension must be at least 1");
        }
        if self.frame_stride == 0 {
            bail!("frame stride must be at least 1");
        }
        if self.announcer == AnnouncerKind::Network && self.tts_url.is_none() {
            bail!("network announcer needs ATTEND_TTS_URL");
        }
        Ok(())
    }
}

fn read_file_config(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
}

fn default_data_dir<F: Fn(&str) -> Option<String>>(env: &F) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| {
            let home = env("HOME").unwrap_or_else(|| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("attend")
}

/// Parse an environment variable if present. A present but malformed
/// value is an error rather than a silent fallback to the default.
fn parsed<T, F>(env: &F, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match env(key) {
        Some(v) => v
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {key}={v:?}: {e}")),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn resolve(file: FileConfig, vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::resolve(file, move |k| vars.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = resolve(FileConfig::default(), &[("HOME", "/home/kiosk")]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/home/kiosk/.local/share/attend/attendance.db"));
        assert_eq!(config.feed, "-");
        assert_eq!(config.tolerance, 0.5);
        assert_eq!(config.cooldown, Duration::from_secs(30));
        assert_eq!(config.embedding_dim, 128);
        assert_eq!(config.frame_stride, 1);
        assert_eq!(config.announcer, AnnouncerKind::Offline);
        assert_eq!(config.speech_program, "espeak-ng");
        assert!(!config.greet_unknown);
        assert_eq!(config.unknown_interval, Duration::from_secs(10));
        assert!(!config.system_bus);
    }

    #[test]
    fn test_env_overrides_file() {
        let file: FileConfig = toml::from_str(
            r#"
            tolerance = 0.6
            cooldown_secs = 60
            frame_stride = 3
            greet_unknown = true
            "#,
        )
        .unwrap();
        let config = resolve(
            file,
            &[("ATTEND_TOLERANCE", "0.45"), ("ATTEND_DB_PATH", "/var/lib/attend.db")],
        )
        .unwrap();

        assert_eq!(config.tolerance, 0.45);
        assert_eq!(config.cooldown, Duration::from_secs(60));
        assert_eq!(config.frame_stride, 3);
        assert!(config.greet_unknown);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/attend.db"));
    }

    #[test]
    fn test_xdg_data_home() {
        let config = resolve(FileConfig::default(), &[("XDG_DATA_HOME", "/data")]).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/data/attend/attendance.db"));
    }

    #[test]
    fn test_malformed_value_is_error() {
        assert!(resolve(FileConfig::default(), &[("ATTEND_COOLDOWN_SECS", "soon")]).is_err());
    }

    #[test]
    fn test_rejects_non_positive_tolerance() {
        assert!(resolve(FileConfig::default(), &[("ATTEND_TOLERANCE", "0")]).is_err());
        assert!(resolve(FileConfig::default(), &[("ATTEND_TOLERANCE", "-0.2")]).is_err());
    }

    #[test]
    fn test_rejects_zero_stride() {
        assert!(resolve(FileConfig::default(), &[("ATTEND_FRAME_STRIDE", "0")]).is_err());
    }

    #[test]
    fn test_network_announcer_needs_url() {
        assert!(resolve(FileConfig::default(), &[("ATTEND_ANNOUNCER", "network")]).is_err());
        let config = resolve(
            FileConfig::default(),
            &[("ATTEND_ANNOUNCER", "network"), ("ATTEND_TTS_URL", "http://tts.local/say")],
        )
        .unwrap();
        assert_eq!(config.announcer, AnnouncerKind::Network);
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        assert!(toml::from_str::<FileConfig>("colour = \"blue\"").is_err());
    }

    #[test]
    fn test_speech_args_split() {
        let config = resolve(FileConfig::default(), &[("ATTEND_SPEECH_ARGS", "-v en-us -s 150")]).unwrap();
        assert_eq!(config.speech_args, vec!["-v", "en-us", "-s", "150"]);
    }
}
