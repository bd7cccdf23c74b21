use std::path::PathBuf;

const ENV_PREFIX: &str = "CAMPUS_BOOKING_";

/// Runtime settings, read from `CAMPUS_BOOKING_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub wal_file: String,
    pub metrics_port: Option<u16>,
    /// Appends since the last compaction that trigger the next one.
    pub compact_threshold: u64,
    pub seed_demo_data: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            wal_file: "bookings.wal".into(),
            metrics_port: None,
            compact_threshold: 1000,
            seed_demo_data: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset or unparsable values fall
    /// back to the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(&format!("{ENV_PREFIX}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Self {
            data_dir: get("DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            wal_file: get("WAL_FILE").unwrap_or(defaults.wal_file),
            metrics_port: get("METRICS_PORT").and_then(|s| s.parse().ok()),
            compact_threshold: get("COMPACT_THRESHOLD")
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(defaults.compact_threshold),
            seed_demo_data: get("SEED_DEMO")
                .map_or(defaults.seed_demo_data, |s| parse_flag(&s)),
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(&self.wal_file)
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}
