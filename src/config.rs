use crate::prelude::*;

use crate::steca::packet::LEGACY_MARKER_OFFSET;
use serde::Deserialize;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub inverters: Vec<Inverter>,

    #[serde(default = "Config::default_loglevel")]
    pub loglevel: String,
}

// Inverter {{{
#[derive(Clone, Debug, Deserialize)]
pub struct Inverter {
    #[serde(default = "Config::default_enabled")]
    pub enabled: bool,

    pub alias: Option<String>,
    pub host: String,
    #[serde(default = "Config::default_port")]
    pub port: u16,

    pub poll_interval: Option<u64>,
    pub read_timeout: Option<u64>,
    /// Look for the formula marker at this fixed offset instead of scanning.
    pub marker_offset: Option<usize>,
    /// Use the marker offset of older firmware captures.
    pub legacy_marker_offset: Option<bool>,
    pub strict_checksum: Option<bool>,

    #[serde(default = "Config::default_requests")]
    pub requests: Vec<RequestKind>,
}
impl Inverter {
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn alias(&self) -> String {
        self.alias
            .clone()
            .unwrap_or_else(|| format!("steca_grid_{}_{}", self.host, self.port))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn poll_interval(&self) -> u64 {
        self.poll_interval.unwrap_or(5)
    }

    pub fn read_timeout(&self) -> u64 {
        self.read_timeout.unwrap_or(3)
    }

    pub fn marker_search(&self) -> MarkerSearch {
        match (self.marker_offset, self.legacy_marker_offset == Some(true)) {
            (Some(offset), _) => MarkerSearch::Fixed(offset),
            (None, true) => MarkerSearch::Fixed(LEGACY_MARKER_OFFSET),
            (None, false) => MarkerSearch::Scan,
        }
    }

    pub fn strict_checksum(&self) -> bool {
        self.strict_checksum == Some(true)
    }

    pub fn requests(&self) -> &[RequestKind] {
        &self.requests
    }
} // }}}

impl Config {
    pub fn new(file: String) -> Result<Self> {
        let content = std::fs::read_to_string(&file)
            .map_err(|err| anyhow!("config.rs:error reading {}: {}", file, err))?;

        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Logs the effective configuration. Called once the logger is up, which
    /// needs `loglevel` from this very file.
    pub fn log_summary(&self) {
        info!("Configuration loaded successfully:");
        info!(
            "  Inverters: {} configured, {} enabled",
            self.inverters.len(),
            self.inverters.iter().filter(|i| i.enabled).count()
        );
        for (i, inv) in self.inverters.iter().enumerate() {
            info!("    Inverter[{}]:", i);
            info!("      Alias: {}", inv.alias());
            info!("      Enabled: {}", inv.enabled);
            info!("      Host: {}", inv.host);
            info!("      Port: {}", inv.port);
            info!("      Poll Interval: {}s", inv.poll_interval());
            info!("      Read Timeout: {}s", inv.read_timeout());
            info!("      Marker Search: {:?}", inv.marker_search());
            info!("      Strict Checksum: {}", inv.strict_checksum());
            info!(
                "      Requests: {}",
                inv.requests
                    .iter()
                    .map(|r| r.to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        info!("  Log Level: {}", self.loglevel);
    }

    fn validate(&self) -> Result<()> {
        if self.inverters.is_empty() {
            bail!("no inverters configured");
        }

        for (i, inv) in self.inverters.iter().enumerate() {
            if inv.enabled {
                if inv.port == 0 {
                    bail!("inverter[{}].port must be between 1 and 65535", i);
                }
                if inv.host.is_empty() {
                    return Err(anyhow!("config.rs:Inverter host cannot be empty"));
                }
                if inv.poll_interval() == 0 {
                    return Err(anyhow!("config.rs:Invalid poll interval: 0"));
                }
                if inv.read_timeout() == 0 {
                    return Err(anyhow!("config.rs:Invalid read timeout: 0"));
                }
                if inv.requests.is_empty() {
                    bail!("inverter[{}].requests cannot be empty", i);
                }
            }
        }

        Ok(())
    }

    pub fn enabled_inverters(&self) -> Vec<Inverter> {
        self.inverters.iter().filter(|i| i.enabled()).cloned().collect()
    }

    pub fn loglevel(&self) -> &str {
        &self.loglevel
    }

    fn default_port() -> u16 {
        steca::DEFAULT_PORT
    }

    fn default_enabled() -> bool {
        true
    }

    fn default_loglevel() -> String {
        "info".to_string()
    }

    fn default_requests() -> Vec<RequestKind> {
        vec![RequestKind::NominalAcPower, RequestKind::DeviceTime]
    }
}
