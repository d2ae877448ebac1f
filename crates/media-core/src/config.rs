//! Configuration types and loading

use serde::{Deserialize, Serialize};

/// Main media configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MediaConfig {
    /// Disks and default disk selection
    pub storage: StorageConfig,

    /// Background conversion queue
    pub queue: QueueConfig,

    /// Conversion scratch space and configured image conversions
    pub conversions: ConversionConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Disk used when an upload does not name one
    pub default_disk: String,
    /// Configured disks
    pub disks: Vec<DiskConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiskConfig {
    pub name: String,
    pub driver: DiskDriver,
    /// Root directory (local driver only)
    pub root: Option<String>,
    /// Base URL prepended to storage keys
    pub base_url: String,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DiskDriver {
    #[default]
    Local,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Queue that conversion jobs are pushed onto
    pub name: String,
    /// Retries before a conversion job is marked dead
    pub max_retries: u32,
    /// Idle wait between polls when the queue is empty
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversionConfig {
    /// Directory for scratch files (system temp dir when unset)
    pub scratch_dir: Option<String>,
    /// Image conversions registered at startup
    pub images: Vec<ImageConversionConfig>,
}

/// A resize preset registered as a named conversion
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ImageConversionConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Output extension; the source extension is kept when unset
    pub format: Option<String>,
}

impl ImageConversionConfig {
    /// Parse a preset of the form `name:WIDTHxHEIGHT[:format]`
    pub fn parse(spec: &str) -> Result<Self, ConfigError> {
        let invalid = |message: &str| ConfigError::InvalidValue {
            key: "MEDIA_IMAGE_CONVERSIONS".to_string(),
            message: format!("{}: {}", spec, message),
        };

        let mut parts = spec.trim().split(':');
        let name = parts
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| invalid("missing name"))?;
        let size = parts.next().ok_or_else(|| invalid("missing size"))?;
        let format = parts.next().filter(|f| !f.is_empty()).map(str::to_lowercase);

        if parts.next().is_some() {
            return Err(invalid("too many segments"));
        }

        let (width, height) = size
            .split_once(|c: char| c == 'x' || c == 'X')
            .ok_or_else(|| invalid("size must be WIDTHxHEIGHT"))?;
        let width: u32 = width.parse().map_err(|_| invalid("invalid width"))?;
        let height: u32 = height.parse().map_err(|_| invalid("invalid height"))?;

        if width == 0 || height == 0 {
            return Err(invalid("dimensions must be non-zero"));
        }

        Ok(Self {
            name: name.to_string(),
            width,
            height,
            format,
        })
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                default_disk: "public".to_string(),
                disks: vec![DiskConfig {
                    name: "public".to_string(),
                    driver: DiskDriver::Local,
                    root: Some("/var/media/public".to_string()),
                    base_url: "/media".to_string(),
                }],
            },
            queue: QueueConfig {
                name: "media".to_string(),
                max_retries: 3,
                poll_interval_ms: 100,
            },
            conversions: ConversionConfig {
                scratch_dir: None,
                images: vec![],
            },
        }
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

impl MediaConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key/value source, applying overrides to the defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        // Storage
        if let Some(root) = lookup("MEDIA_LOCAL_ROOT") {
            let base_url = lookup("MEDIA_LOCAL_URL").unwrap_or_else(|| "/media".to_string());
            let disk = DiskConfig {
                name: "public".to_string(),
                driver: DiskDriver::Local,
                root: Some(root),
                base_url,
            };
            config.storage.disks.retain(|d| d.name != disk.name);
            config.storage.disks.push(disk);
        }
        if let Some(disk) = lookup("MEDIA_DISK") {
            config.storage.default_disk = disk;
        }
        if !config
            .storage
            .disks
            .iter()
            .any(|d| d.name == config.storage.default_disk)
        {
            return Err(ConfigError::InvalidValue {
                key: "MEDIA_DISK".to_string(),
                message: format!("no disk named {}", config.storage.default_disk),
            });
        }

        // Queue
        if let Some(queue) = lookup("MEDIA_QUEUE") {
            config.queue.name = queue;
        }
        if let Some(retries) = lookup("MEDIA_MAX_RETRIES") {
            config.queue.max_retries = parse_number("MEDIA_MAX_RETRIES", &retries)?;
        }
        if let Some(interval) = lookup("MEDIA_POLL_INTERVAL_MS") {
            config.queue.poll_interval_ms = parse_number("MEDIA_POLL_INTERVAL_MS", &interval)?;
        }

        // Conversions
        if let Some(dir) = lookup("MEDIA_SCRATCH_DIR") {
            config.conversions.scratch_dir = Some(dir);
        }
        if let Some(presets) = lookup("MEDIA_IMAGE_CONVERSIONS") {
            config.conversions.images = presets
                .split(',')
                .filter(|p| !p.trim().is_empty())
                .map(ImageConversionConfig::parse)
                .collect::<Result<_, _>>()?;
        }

        Ok(config)
    }

    /// Look up a configured disk by name
    pub fn disk(&self, name: &str) -> Option<&DiskConfig> {
        self.storage.disks.iter().find(|d| d.name == name)
    }

    /// Directory used for conversion scratch files
    pub fn scratch_dir(&self) -> std::path::PathBuf {
        self.conversions
            .scratch_dir
            .as_ref()
            .map(std::path::PathBuf::from)
            .unwrap_or_else(std::env::temp_dir)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("not a number: {}", value),
    })
}
