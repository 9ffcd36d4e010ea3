use crate::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_COUNTRIES_URL: &str =
    "https://restcountries.com/v2/all?fields=name,capital,region,population,flag,currencies";
pub const DEFAULT_EXCHANGE_URL: &str = "https://open.er-api.com/v6/latest/USD";

/// Where the refresh pipeline pulls its two sources from.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshConfig {
    pub countries_url: String,
    pub exchange_url: String,
    /// Applied to each source fetch independently.
    pub fetch_timeout: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            countries_url: DEFAULT_COUNTRIES_URL.to_string(),
            exchange_url: DEFAULT_EXCHANGE_URL.to_string(),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

impl RefreshConfig {
    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(v) = non_empty_env("COUNTRIES_API_URL") {
            cfg.countries_url = v;
        }
        if let Some(v) = non_empty_env("EXCHANGE_API_URL") {
            cfg.exchange_url = v;
        }
        if let Some(v) = non_empty_env("COUNTRIES_FETCH_TIMEOUT_MS") {
            let ms: u64 = v.trim().parse().map_err(|_| {
                Error::InvalidInput(format!("invalid COUNTRIES_FETCH_TIMEOUT_MS: {v}"))
            })?;
            cfg.fetch_timeout = Duration::from_millis(ms);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    #[tracing::instrument(level = "debug")]
    pub fn validate(&self) -> Result<()> {
        if self.countries_url.trim().is_empty() {
            return Err(Error::InvalidInput("countries_url is empty".to_string()));
        }
        if self.exchange_url.trim().is_empty() {
            return Err(Error::InvalidInput("exchange_url is empty".to_string()));
        }
        if self.fetch_timeout.is_zero() {
            return Err(Error::InvalidInput("fetch_timeout must be > 0".to_string()));
        }
        Ok(())
    }
}

/// Summary artifact settings, handed to the renderer at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub cache_dir: PathBuf,
    /// TrueType/OpenType font used for text. Without one only the graphics are drawn.
    pub font_path: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            font_path: None,
        }
    }
}

impl RenderConfig {
    pub const IMAGE_FILE_NAME: &'static str = "summary.png";

    #[tracing::instrument(level = "debug")]
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = non_empty_env("CACHE_DIR") {
            cfg.cache_dir = PathBuf::from(v);
        }
        if let Some(v) = non_empty_env("COUNTRIES_FONT_PATH") {
            cfg.font_path = Some(PathBuf::from(v));
        }
        cfg.validate()?;
        Ok(cfg)
    }

    #[tracing::instrument(level = "debug")]
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::InvalidInput("cache_dir is empty".to_string()));
        }
        Ok(())
    }

    /// Well-known, overwritten-in-place location of the summary image.
    pub fn image_path(&self) -> PathBuf {
        self.cache_dir.join(Self::IMAGE_FILE_NAME)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        RefreshConfig::default().validate().unwrap();
        RenderConfig::default().validate().unwrap();
        assert_eq!(RefreshConfig::default().fetch_timeout, Duration::from_secs(10));
    }

    #[test]
    fn rejects_zero_timeout_and_blank_urls() {
        let cfg = RefreshConfig {
            fetch_timeout: Duration::ZERO,
            ..RefreshConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = RefreshConfig {
            exchange_url: "  ".to_string(),
            ..RefreshConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn image_path_lives_in_cache_dir() {
        let cfg = RenderConfig {
            cache_dir: PathBuf::from("/tmp/x"),
            font_path: None,
        };
        assert_eq!(cfg.image_path(), PathBuf::from("/tmp/x/summary.png"));
    }
}
