use super::{
    driver::{CyclePolicy, S7Driver},
    protocol::{
        frame::{ConnectionType, TagOptions, Tsap, TsapPair, ValueKind},
        planner::DEFAULT_PDU_SIZE,
        session::{Session, SessionConfig},
        transport::TcpTransport,
        Error, Result,
    },
};
use backoff::ExponentialBackoff;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum TsapConfig {
    #[serde(rename_all = "camelCase")]
    RackSlot {
        rack: u8,
        slot: u8,
        #[serde(default)]
        connection_type: ConnectionType,
    },
    Tsap { src: u16, dst: u16 },
}

impl TsapConfig {
    pub fn resolve(&self) -> Result<TsapPair> {
        match *self {
            TsapConfig::RackSlot {
                rack,
                slot,
                connection_type,
            } => TsapPair::from_rack_slot(connection_type, rack, slot),
            TsapConfig::Tsap { src, dst } => Ok(TsapPair {
                local: Tsap::from(src),
                remote: Tsap::from(dst),
            }),
        }
    }
}

/// Which side opens the TCP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectMode {
    /// Dial out to `host:port`
    #[default]
    Client,
    /// Bind `host:port` and wait for the device
    Server,
}

/// Reconnect backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries, None = unlimited attempts)
    #[serde(default = "RetryPolicy::default_max_attempts")]
    pub max_attempts: Option<u32>,
    #[serde(default = "RetryPolicy::default_initial_interval_ms")]
    pub initial_interval_ms: u64,
    #[serde(default = "RetryPolicy::default_max_interval_ms")]
    pub max_interval_ms: u64,
    /// Jitter in range [0.0, 1.0]
    #[serde(default = "RetryPolicy::default_randomization_factor")]
    pub randomization_factor: f64,
    #[serde(default = "RetryPolicy::default_multiplier")]
    pub multiplier: f64,
    /// Whichever of this and `max_attempts` is reached first stops retries
    #[serde(default)]
    pub max_elapsed_time_ms: Option<u64>,
}

impl RetryPolicy {
    fn default_max_attempts() -> Option<u32> {
        Some(3)
    }

    fn default_initial_interval_ms() -> u64 {
        1_000
    }

    fn default_max_interval_ms() -> u64 {
        30_000
    }

    fn default_randomization_factor() -> f64 {
        0.2
    }

    fn default_multiplier() -> f64 {
        2.0
    }

    pub fn build_exponential_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(self.initial_interval_ms.max(1)),
            current_interval: Duration::from_millis(self.initial_interval_ms.max(1)),
            max_interval: Duration::from_millis(self.max_interval_ms.max(self.initial_interval_ms)),
            randomization_factor: self.randomization_factor.clamp(0.0, 1.0),
            multiplier: self.multiplier.max(1.0),
            max_elapsed_time: self.max_elapsed_time_ms.map(Duration::from_millis),
            ..ExponentialBackoff::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: Self::default_max_attempts(),
            initial_interval_ms: Self::default_initial_interval_ms(),
            max_interval_ms: Self::default_max_interval_ms(),
            randomization_factor: Self::default_randomization_factor(),
            multiplier: Self::default_multiplier(),
            max_elapsed_time_ms: None,
        }
    }
}

/// S7 channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S7ChannelConfig {
    /// Remote host, or bind address in server mode
    pub host: String,
    /// Remote port (default 102)
    #[serde(default = "S7ChannelConfig::default_port")]
    pub port: u16,
    #[serde(default)]
    pub mode: ConnectMode,
    /// None means 0x0100 on both ends
    #[serde(default)]
    pub tsap: Option<TsapConfig>,
    /// Requested S7 PDU size in bytes
    #[serde(default = "S7ChannelConfig::default_pdu_size")]
    pub pdu_size: u16,
    #[serde(default = "S7ChannelConfig::default_amq")]
    pub amq_caller: u16,
    #[serde(default = "S7ChannelConfig::default_amq")]
    pub amq_callee: u16,
    #[serde(default = "S7ChannelConfig::default_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Wait for one response; elapsing it counts as no response
    #[serde(default = "S7ChannelConfig::default_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "S7ChannelConfig::default_timeout_ms")]
    pub handshake_timeout_ms: u64,
    /// Pause between commands of one cycle
    #[serde(default)]
    pub interval_ms: u64,
    #[serde(default = "S7ChannelConfig::default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "S7ChannelConfig::default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "S7ChannelConfig::default_await_write_ack")]
    pub await_write_ack: bool,
    #[serde(default)]
    pub reconnect: RetryPolicy,
}

impl S7ChannelConfig {
    fn default_port() -> u16 {
        102
    }

    fn default_pdu_size() -> u16 {
        960
    }

    fn default_amq() -> u16 {
        1
    }

    fn default_timeout_ms() -> u64 {
        3_000
    }

    fn default_retry_interval_ms() -> u64 {
        500
    }

    fn default_max_retries() -> u32 {
        2
    }

    fn default_await_write_ack() -> bool {
        true
    }

    /// Parse and validate a JSON channel configuration.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidConfiguration(format!("channel config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfiguration("host is empty".to_string()));
        }
        if self.pdu_size < DEFAULT_PDU_SIZE {
            return Err(Error::InvalidConfiguration(format!(
                "pduSize {} below minimum {DEFAULT_PDU_SIZE}",
                self.pdu_size
            )));
        }
        if self.amq_caller == 0 || self.amq_callee == 0 {
            return Err(Error::InvalidConfiguration(
                "amqCaller and amqCallee must be positive".to_string(),
            ));
        }
        if self.read_timeout_ms == 0 || self.handshake_timeout_ms == 0 {
            return Err(Error::InvalidConfiguration(
                "timeouts must be positive".to_string(),
            ));
        }
        self.tsap_pair().map(|_| ())
    }

    #[inline]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn tsap_pair(&self) -> Result<TsapPair> {
        self.tsap
            .as_ref()
            .map_or_else(|| Ok(TsapPair::default()), TsapConfig::resolve)
    }

    pub fn session_config(&self) -> Result<SessionConfig> {
        Ok(SessionConfig {
            tsap: self.tsap_pair()?,
            pdu_size: self.pdu_size,
            amq_caller: self.amq_caller,
            amq_callee: self.amq_callee,
            read_timeout: Duration::from_millis(self.read_timeout_ms),
            handshake_timeout: Duration::from_millis(self.handshake_timeout_ms),
        })
    }

    pub fn cycle_policy(&self) -> CyclePolicy {
        CyclePolicy {
            interval: Duration::from_millis(self.interval_ms),
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            max_retries: self.max_retries,
            await_write_ack: self.await_write_ack,
        }
    }

    /// Build a driver over TCP. Nothing is dialed yet in client mode; server
    /// mode binds the listener here and accepts on the first handshake.
    pub async fn open(&self) -> Result<S7Driver<TcpTransport>> {
        self.validate()?;
        let connect_timeout = Duration::from_millis(self.connect_timeout_ms);
        let transport = match self.mode {
            ConnectMode::Client => TcpTransport::client(self.socket_addr(), connect_timeout),
            ConnectMode::Server => {
                let listener = TcpListener::bind(self.socket_addr()).await?;
                info!(addr = %self.socket_addr(), "S7 listening for inbound device");
                TcpTransport::server(listener, connect_timeout)
            }
        };
        let session = Session::new(transport, self.session_config()?);
        Ok(S7Driver::new(session, self.cycle_policy()))
    }
}

/// One configured tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagDescriptor {
    pub name: String,
    pub address: String,
    pub kind: ValueKind,
    #[serde(default)]
    pub options: TagOptions,
}

impl TagDescriptor {
    pub fn new(name: impl Into<String>, address: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            kind,
            options: TagOptions::default(),
        }
    }

    #[inline]
    pub fn with_options(mut self, options: TagOptions) -> Self {
        self.options = options;
        self
    }
}
