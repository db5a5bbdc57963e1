use std::{collections::BTreeMap, fmt, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::{QshieldError, QshieldResult};

/// Number of post-processing passes implemented by the engine.
pub const MAX_POST_PASSES: u8 = 3;

/// Engine configuration.
///
/// # TOML
/// ```text
/// dimensions = 7
/// hardening-rounds = 1000
/// rotation-interval-ms = 1000
/// chaos-level = "maximum"
///
/// [chaos]
/// logistic-r = 3.9999
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct CipherConfig {
    /// Extent `D` of each of the seven lattice axes.
    pub dimensions: u8,
    pub min_dimensions: u8,
    pub max_dimensions: u8,
    /// Alternating-hash rounds applied to every lattice leaf.
    pub hardening_rounds: u32,
    /// Default width of a temporal key window.
    pub rotation_interval_ms: u64,
    /// Number of hardened leaves kept in memory.
    pub cache_capacity: usize,
    /// Post-processing passes applied after the base cipher (0..=3).
    pub post_passes: u8,
    pub chaos_level: ChaosLevel,
    /// Envelopes older than this are refused. `None` keeps every window.
    pub key_retention_ms: Option<u64>,
    pub chaos: ChaosConfig,
}

impl Default for CipherConfig {
    fn default() -> Self {
        Self {
            dimensions: 7,
            min_dimensions: 2,
            max_dimensions: 16,
            hardening_rounds: 1_000,
            rotation_interval_ms: 1_000,
            cache_capacity: 256,
            post_passes: MAX_POST_PASSES,
            chaos_level: ChaosLevel::Maximum,
            key_retention_ms: None,
            chaos: ChaosConfig::default(),
        }
    }
}

impl CipherConfig {
    pub fn with_dimensions(mut self, dimensions: u8) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn with_hardening_rounds(mut self, rounds: u32) -> Self {
        self.hardening_rounds = rounds;
        self
    }

    pub fn with_rotation_interval_ms(mut self, interval_ms: u64) -> Self {
        self.rotation_interval_ms = interval_ms;
        self
    }

    pub fn with_chaos_level(mut self, level: ChaosLevel) -> Self {
        self.chaos_level = level;
        self
    }

    pub fn with_post_passes(mut self, passes: u8) -> Self {
        self.post_passes = passes;
        self
    }

    pub fn with_key_retention_ms(mut self, retention_ms: Option<u64>) -> Self {
        self.key_retention_ms = retention_ms;
        self
    }

    /// Reject `dimensions` outside the configured bounds.
    pub fn check_dimensions(&self, requested: u8) -> QshieldResult<()> {
        if requested < self.min_dimensions || requested > self.max_dimensions {
            return Err(QshieldError::UnsupportedDimensionality {
                requested,
                min: self.min_dimensions,
                max: self.max_dimensions,
            });
        }
        Ok(())
    }

    pub fn validate(&self) -> QshieldResult<()> {
        if self.min_dimensions == 0 || self.min_dimensions > self.max_dimensions {
            return Err(QshieldError::InvalidConfig(format!(
                "dimension bounds {}..={} are empty",
                self.min_dimensions, self.max_dimensions
            )));
        }
        self.check_dimensions(self.dimensions)?;
        if self.hardening_rounds == 0 {
            return Err(QshieldError::InvalidConfig(
                "hardening rounds must be > 0".into(),
            ));
        }
        if self.rotation_interval_ms == 0 {
            return Err(QshieldError::InvalidConfig(
                "rotation interval must be > 0".into(),
            ));
        }
        if self.cache_capacity == 0 {
            return Err(QshieldError::InvalidConfig(
                "cache capacity must be > 0".into(),
            ));
        }
        if self.post_passes > MAX_POST_PASSES {
            return Err(QshieldError::InvalidConfig(format!(
                "post passes must be <= {MAX_POST_PASSES}, got {}",
                self.post_passes
            )));
        }
        self.chaos.validate()
    }

    pub fn from_toml_str(contents: &str) -> QshieldResult<Self> {
        let config: Self = toml::from_str(contents).map_err(|err| parse_error(ConfigFormat::Toml, err))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(contents: &str) -> QshieldResult<Self> {
        let config: Self =
            serde_yaml::from_str(contents).map_err(|err| parse_error(ConfigFormat::Yaml, err))?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_error(format: ConfigFormat, err: impl fmt::Display) -> QshieldError {
    QshieldError::InvalidConfig(format!("failed to parse {format:?} config: {err}"))
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigFormat {
    Auto,
    Toml,
    Yaml,
}

/// Read and validate a config file, picking the parser from the extension
/// when `format` is [`ConfigFormat::Auto`].
pub fn load_config(path: &Path, format: ConfigFormat) -> QshieldResult<CipherConfig> {
    let contents = fs::read_to_string(path).map_err(|err| {
        QshieldError::InvalidConfig(format!("unable to read config {}: {err}", path.display()))
    })?;
    match resolve_format(path, format) {
        ConfigFormat::Yaml => CipherConfig::from_yaml_str(&contents),
        _ => CipherConfig::from_toml_str(&contents),
    }
}

fn resolve_format(path: &Path, format: ConfigFormat) -> ConfigFormat {
    match format {
        ConfigFormat::Auto => match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => ConfigFormat::Yaml,
            _ => ConfigFormat::Toml,
        },
        _ => format,
    }
}

/// How much attractor whitening runs ahead of the dimensional stages.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChaosLevel {
    /// No whitening.
    Minimal,
    /// One attractor, picked by the key.
    Standard,
    /// Every attractor in turn.
    Maximum,
}

impl ChaosLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChaosLevel::Minimal => "minimal",
            ChaosLevel::Standard => "standard",
            ChaosLevel::Maximum => "maximum",
        }
    }
}

impl Default for ChaosLevel {
    fn default() -> Self {
        Self::Maximum
    }
}

impl fmt::Display for ChaosLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chaotic-map parameters (logistic, Lorenz, Rössler, Chua, Hénon).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct ChaosConfig {
    pub logistic_r: f64,
    pub lorenz_sigma: f64,
    pub lorenz_rho: f64,
    pub lorenz_beta: f64,
    pub dt: f64,
    pub rossler_a: f64,
    pub rossler_b: f64,
    pub rossler_c: f64,
    pub chua_alpha: f64,
    pub chua_beta: f64,
    pub chua_gamma: f64,
    pub henon_a: f64,
    pub henon_b: f64,
}

impl Default for ChaosConfig {
    fn default() -> Self {
        Self {
            logistic_r: 3.9999,
            lorenz_sigma: 10.0,
            lorenz_rho: 28.0,
            lorenz_beta: 8.0 / 3.0,
            dt: 0.01,
            rossler_a: 0.2,
            rossler_b: 0.2,
            rossler_c: 5.7,
            chua_alpha: 15.6,
            chua_beta: 28.0,
            chua_gamma: 0.1,
            henon_a: 1.4,
            henon_b: 0.3,
        }
    }
}

impl ChaosConfig {
    pub fn validate(&self) -> QshieldResult<()> {
        let params = [
            self.logistic_r,
            self.lorenz_sigma,
            self.lorenz_rho,
            self.lorenz_beta,
            self.dt,
            self.rossler_a,
            self.rossler_b,
            self.rossler_c,
            self.chua_alpha,
            self.chua_beta,
            self.chua_gamma,
            self.henon_a,
            self.henon_b,
        ];
        if params.iter().any(|p| !p.is_finite()) {
            return Err(QshieldError::InvalidConfig(
                "chaos parameters must be finite".into(),
            ));
        }
        if self.logistic_r <= 0.0 || self.logistic_r > 4.0 {
            return Err(QshieldError::InvalidConfig(format!(
                "logistic r must lie in (0, 4], got {}",
                self.logistic_r
            )));
        }
        if self.dt <= 0.0 {
            return Err(QshieldError::InvalidConfig("dt must be > 0".into()));
        }
        Ok(())
    }
}

/// Per-call overrides for `encrypt`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EncryptOptions {
    pub rotation_interval_ms: Option<u64>,
    /// Asserted dimensionality; must match the engine's lattice.
    pub dimension_count: Option<u8>,
    /// Extra pairs copied into the envelope metadata.
    pub metadata: BTreeMap<String, String>,
}

impl EncryptOptions {
    pub fn with_rotation_interval_ms(mut self, interval_ms: u64) -> Self {
        self.rotation_interval_ms = Some(interval_ms);
        self
    }

    pub fn with_dimension_count(mut self, dimensions: u8) -> Self {
        self.dimension_count = Some(dimensions);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}
