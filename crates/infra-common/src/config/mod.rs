//! Layered configuration for the switchboard daemon.
//!
//! Values come from (lowest to highest precedence) the built-in defaults, an
//! optional TOML file, and `SWITCHBOARD__SECTION__KEY` environment variables.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::context::{ErrorContext, ErrorExt};
use crate::errors::types::{Error, Result};

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "SWITCHBOARD";

/// Root configuration document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub signaling: SignalingSection,
    pub media: MediaSection,
    pub calls: CallsSection,
    pub dialplan: DialPlanSection,
    pub quality: QualitySection,
    pub devices: Vec<DeviceSection>,
    pub logging: LoggingSection,
    pub collaborators: CollaboratorsSection,
}

/// SIP listener settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingSection {
    pub bind_addr: SocketAddr,
    pub domain: String,
    pub user_agent: String,
}

impl Default for SignalingSection {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5060),
            domain: "switchboard.local".to_string(),
            user_agent: "switchboard".to_string(),
        }
    }
}

/// Which digit transport(s) a call listens to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DtmfMode {
    /// Accept every path, preferring in-stream events once seen
    #[default]
    Auto,
    /// RFC 4733 telephone-event packets only
    Rfc4733,
    /// SIP INFO bodies only
    Info,
    /// Audio-domain detection only
    Inband,
}

/// Media relay settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaSection {
    pub bind_ip: IpAddr,
    /// Address placed in SDP answers; defaults to the signaling socket's local IP
    pub advertised_ip: Option<IpAddr>,
    pub rtp_port_start: u16,
    pub rtp_port_end: u16,
    pub jitter_depth_frames: usize,
    pub dtmf_payload_type: u8,
    pub dtmf_mode: DtmfMode,
    pub relearn_threshold: u32,
    pub quality_snapshot_interval_secs: u64,
    pub max_packet_size: usize,
}

impl Default for MediaSection {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            advertised_ip: None,
            rtp_port_start: 10000,
            rtp_port_end: 20000,
            jitter_depth_frames: 3,
            dtmf_payload_type: 101,
            dtmf_mode: DtmfMode::Auto,
            relearn_threshold: 3,
            quality_snapshot_interval_secs: 30,
            max_packet_size: 1500,
        }
    }
}

/// Call lifecycle timers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallsSection {
    pub no_answer_timeout_secs: u64,
    pub early_disconnect_window_ms: u64,
    pub ack_timeout_secs: u64,
    pub tone_coincidence_window_ms: u64,
}

impl Default for CallsSection {
    fn default() -> Self {
        Self {
            no_answer_timeout_secs: 30,
            early_disconnect_window_ms: 2000,
            ack_timeout_secs: 32,
            tone_coincidence_window_ms: 300,
        }
    }
}

/// Dialed-number classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialPlanSection {
    pub voicemail_number: String,
    pub auto_attendant_number: String,
    pub paging_prefix: String,
    pub emergency_numbers: Vec<String>,
    pub extension_length: usize,
}

impl Default for DialPlanSection {
    fn default() -> Self {
        Self {
            voicemail_number: "*97".to_string(),
            auto_attendant_number: "0".to_string(),
            paging_prefix: "7".to_string(),
            emergency_numbers: vec!["911".to_string(), "112".to_string()],
            extension_length: 4,
        }
    }
}

/// Alert thresholds and history bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualitySection {
    pub min_mos: f64,
    pub max_loss_percent: f64,
    pub max_jitter_ms: f64,
    pub max_latency_ms: f64,
    pub history_capacity: usize,
    pub alert_capacity: usize,
    pub sample_window: usize,
}

impl Default for QualitySection {
    fn default() -> Self {
        Self {
            min_mos: 3.5,
            max_loss_percent: 5.0,
            max_jitter_ms: 50.0,
            max_latency_ms: 300.0,
            history_capacity: 10_000,
            alert_capacity: 1_000,
            sample_window: 100,
        }
    }
}

/// Codec restriction for a family of endpoints, matched on User-Agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSection {
    pub user_agent_contains: String,
    pub allowed_codecs: Vec<u8>,
}

/// `[logging]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    pub json: bool,
    pub file_info: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file_info: false,
        }
    }
}

/// Static collaborator wiring used by the daemon binary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollaboratorsSection {
    /// Extension number to SIP contact address
    pub extensions: HashMap<String, SocketAddr>,
    pub voicemail_media: Option<SocketAddr>,
    pub auto_attendant_media: Option<SocketAddr>,
    pub paging_media: Option<SocketAddr>,
}

impl SwitchboardConfig {
    /// Load defaults, then the optional TOML file, then environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(File::from(path).format(FileFormat::Toml));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("dialplan.emergency_numbers"),
        );

        let ctx = ErrorContext::new("config", "load")
            .with_details(path.map(|p| p.display().to_string()).unwrap_or_else(|| "<env>".into()));
        let config: SwitchboardConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .context(ctx)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document directly, without environment overrides
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: SwitchboardConfig =
            toml::from_str(raw).with_context("config", "parse toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject combinations that cannot work at runtime
    pub fn validate(&self) -> Result<()> {
        let media = &self.media;
        if media.rtp_port_start > media.rtp_port_end {
            return Err(Error::Config(format!(
                "rtp port range is inverted: {}..{}",
                media.rtp_port_start, media.rtp_port_end
            )));
        }
        if media.jitter_depth_frames == 0 {
            return Err(Error::Config("jitter_depth_frames must be at least 1".into()));
        }
        if media.dtmf_payload_type < 96 || media.dtmf_payload_type > 127 {
            return Err(Error::Config(format!(
                "dtmf_payload_type {} is outside the dynamic range 96-127",
                media.dtmf_payload_type
            )));
        }
        if !(1.0..=5.0).contains(&self.quality.min_mos) {
            return Err(Error::Config(format!(
                "min_mos {} is outside 1.0-5.0",
                self.quality.min_mos
            )));
        }
        if self.quality.sample_window == 0 {
            return Err(Error::Config("sample_window must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = SwitchboardConfig::default();
        assert_eq!(config.signaling.bind_addr.port(), 5060);
        assert_eq!(config.media.dtmf_payload_type, 101);
        assert_eq!(config.media.dtmf_mode, DtmfMode::Auto);
        assert_eq!(config.calls.early_disconnect_window_ms, 2000);
        assert_eq!(config.calls.no_answer_timeout_secs, 30);
        assert_eq!(config.dialplan.voicemail_number, "*97");
        assert_eq!(config.quality.history_capacity, 10_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SwitchboardConfig::from_toml_str(
            r#"
            [media]
            dtmf_payload_type = 96
            dtmf_mode = "info"

            [[devices]]
            user_agent_contains = "Grandstream"
            allowed_codecs = [0, 8]
            "#,
        )
        .unwrap();
        assert_eq!(config.media.dtmf_payload_type, 96);
        assert_eq!(config.media.dtmf_mode, DtmfMode::Info);
        assert_eq!(config.media.rtp_port_start, 10000);
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.devices[0].allowed_codecs, vec![0, 8]);
    }

    #[test]
    fn invalid_port_range_is_rejected() {
        let err = SwitchboardConfig::from_toml_str(
            "[media]\nrtp_port_start = 20000\nrtp_port_end = 10000\n",
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn malformed_toml_carries_context() {
        let err = SwitchboardConfig::from_toml_str("[media\n").unwrap_err();
        assert!(err.to_string().contains("component 'config'"));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[calls]\nno_answer_timeout_secs = 12").unwrap();
        let config = SwitchboardConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.calls.no_answer_timeout_secs, 12);
        assert_eq!(config.calls.ack_timeout_secs, 32);
    }

    #[test]
    fn load_missing_file_fails() {
        let err = SwitchboardConfig::load(Some(Path::new("/nonexistent/switchboard.toml")));
        assert!(matches!(err, Err(Error::Config(_))));
    }

    #[test]
    fn config_serializes_to_json() {
        let json = serde_json::to_value(SwitchboardConfig::default()).unwrap();
        assert_eq!(json["media"]["dtmf_mode"], "auto");
    }
}
