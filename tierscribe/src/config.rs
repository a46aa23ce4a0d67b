use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::proxy::{ProxyKind, ProxyLadder, ProxyOption};
use crate::retry::RetryPolicy;

const ENV_PREFIX: &str = "TIERSCRIBE_";

/// Everything the engine and its strategies read. Read-only once the engine is built.
///
/// Defaults mirror what has proven workable against YouTube: two minutes for an
/// audio download, ten for an end-to-end transcription, sources up to two hours.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Egress options; unconfigured ones are ignored by the ladder.
    pub proxies: Vec<ProxyOption>,
    pub retry: RetryPolicy,
    pub download_timeout: Duration,
    pub transcription_timeout: Duration,
    pub metadata_timeout: Duration,
    /// Ceiling for cutting the preview clip.
    pub trim_timeout: Duration,
    /// Longest source a download tier will transcribe.
    pub max_duration_seconds: u64,
    /// Sources longer than this get a partial transcript in progressive mode.
    pub partial_threshold_seconds: u64,
    /// Length of the preview clip.
    pub partial_clip_seconds: u64,
    pub cookies_path: Option<PathBuf>,
    pub temp_root: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            proxies: vec![ProxyOption::direct()],
            retry: RetryPolicy::default(),
            download_timeout: Duration::from_secs(120),
            transcription_timeout: Duration::from_secs(600),
            metadata_timeout: Duration::from_secs(10),
            trim_timeout: Duration::from_secs(30),
            max_duration_seconds: 7200,
            partial_threshold_seconds: 150,
            partial_clip_seconds: 60,
            cookies_path: None,
            temp_root: None,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn proxy(mut self, option: ProxyOption) -> Self {
        self.proxies.retain(|p| p.label != option.label);
        self.proxies.push(option);
        self
    }

    pub fn proxies(mut self, options: Vec<ProxyOption>) -> Self {
        self.proxies = options;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn download_timeout(mut self, timeout: Duration) -> Self {
        self.download_timeout = timeout;
        self
    }

    pub fn transcription_timeout(mut self, timeout: Duration) -> Self {
        self.transcription_timeout = timeout;
        self
    }

    pub fn metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }

    pub fn trim_timeout(mut self, timeout: Duration) -> Self {
        self.trim_timeout = timeout;
        self
    }

    pub fn max_duration_seconds(mut self, secs: u64) -> Self {
        self.max_duration_seconds = secs;
        self
    }

    /// Preview threshold and clip length. The clip must be shorter than the threshold.
    pub fn partial(mut self, threshold_secs: u64, clip_secs: u64) -> Result<Self> {
        if clip_secs == 0 || clip_secs >= threshold_secs {
            return Err(Error::InvalidOption(format!(
                "partial clip ({clip_secs}s) must be non-zero and shorter than the threshold ({threshold_secs}s)"
            )));
        }
        self.partial_threshold_seconds = threshold_secs;
        self.partial_clip_seconds = clip_secs;
        Ok(self)
    }

    pub fn cookies_path(mut self, path: PathBuf) -> Self {
        self.cookies_path = Some(path);
        self
    }

    pub fn temp_root(mut self, dir: PathBuf) -> Self {
        self.temp_root = Some(dir);
        self
    }

    pub fn proxy_ladder(&self) -> ProxyLadder {
        ProxyLadder::new(self.proxies.iter().cloned())
    }

    /// Resolve the cookie file, defaulting to ~/.config/tierscribe/cookies.txt.
    pub fn resolve_cookies_path(&self) -> PathBuf {
        self.cookies_path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from(".config"))
                .join("tierscribe")
                .join("cookies.txt")
        })
    }

    pub fn resolve_temp_root(&self) -> PathBuf {
        self.temp_root.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Build from `TIERSCRIBE_*` environment variables on top of the defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(format!("{ENV_PREFIX}{key}")).ok())
    }

    /// Build from an arbitrary key lookup (keys without the `TIERSCRIBE_` prefix).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(url) = get("ROTATING_PROXY_URL") {
            config = config.proxy(ProxyOption::rotating_residential(url));
        }
        if let Some(url) = get("STATIC_PROXY_URL") {
            config = config.proxy(ProxyOption::static_residential(url));
        }
        if parse_bool(get("TOR_PROXY_ENABLED"), "TOR_PROXY_ENABLED")?.unwrap_or(false) {
            let url = get("TOR_PROXY_URL").unwrap_or_else(|| "socks5://127.0.0.1:9050".into());
            config = config.proxy(ProxyOption::tor(url));
        }
        if parse_bool(get("DIRECT_DISABLED"), "DIRECT_DISABLED")?.unwrap_or(false) {
            for p in config.proxies.iter_mut().filter(|p| p.kind == ProxyKind::Direct) {
                p.enabled = false;
            }
        }

        if let Some(secs) = parse_num::<u64>(get("DOWNLOAD_TIMEOUT"), "DOWNLOAD_TIMEOUT")? {
            config.download_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_num::<u64>(get("TRANSCRIPTION_TIMEOUT"), "TRANSCRIPTION_TIMEOUT")? {
            config.transcription_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_num::<u64>(get("MAX_DURATION"), "MAX_DURATION")? {
            config.max_duration_seconds = secs;
        }
        if let Some(n) = parse_num::<u32>(get("MAX_RETRIES"), "MAX_RETRIES")? {
            config.retry.max_retries = n;
        }
        if let Some(ms) = parse_num::<u64>(get("INITIAL_DELAY_MS"), "INITIAL_DELAY_MS")? {
            config.retry.initial_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_num::<u64>(get("MAX_DELAY_MS"), "MAX_DELAY_MS")? {
            config.retry.max_delay = Duration::from_millis(ms);
        }
        if let Some(f) = parse_num::<f64>(get("BACKOFF_FACTOR"), "BACKOFF_FACTOR")? {
            config.retry = config.retry.backoff_factor(f).map_err(|_| {
                Error::InvalidOption(format!("{ENV_PREFIX}BACKOFF_FACTOR must be >= 1.0, got {f}"))
            })?;
        }
        if let Some(path) = get("COOKIES") {
            config.cookies_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }
}

fn parse_num<T: std::str::FromStr>(value: Option<String>, key: &str) -> Result<Option<T>> {
    value
        .map(|v| {
            v.trim().parse::<T>().map_err(|_| {
                Error::InvalidOption(format!("{ENV_PREFIX}{key}: not a valid number: \"{v}\""))
            })
        })
        .transpose()
}

fn parse_bool(value: Option<String>, key: &str) -> Result<Option<bool>> {
    value
        .map(|v| match v.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::InvalidOption(format!(
                "{ENV_PREFIX}{key}: expected true/false, got \"{v}\""
            ))),
        })
        .transpose()
}
