use std::fs;
use std::io;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::prelude::ringkv_core::consts::DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS;
use crate::prelude::ringkv_core::consts::DEFAULT_FIX_FINGERS_INTERVAL_MS;
use crate::prelude::ringkv_core::consts::DEFAULT_LOOKUP_TIMEOUT_MS;
use crate::prelude::ringkv_core::consts::DEFAULT_MAX_LOOKUP_HOPS;
use crate::prelude::ringkv_core::consts::DEFAULT_STABILIZE_INTERVAL_MS;
use crate::prelude::ringkv_core::consts::DEFAULT_SUCCESSOR_LIST_SIZE;
use crate::prelude::SwarmConfig;
use crate::util::ensure_parent_dir;
use crate::util::expand_home;

pub const DEFAULT_CONFIG_LOCATION: &str = "~/.ringkv/config.yaml";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:50000";
pub const DEFAULT_RPC_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_FORWARD_TIMEOUT_MS: u64 = 10000;

/// Node configuration, as stored in YAML. Missing fields take defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Address the HTTP server listens on.
    pub bind: String,
    /// Address other nodes reach this node at. Falls back to `bind`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise: Option<String>,
    pub stabilize_interval_ms: u64,
    pub fix_fingers_interval_ms: u64,
    pub check_predecessor_interval_ms: u64,
    pub successor_list_size: u8,
    pub max_lookup_hops: usize,
    /// Budget of one maintenance call to another node.
    pub rpc_timeout_ms: u64,
    /// Budget of one forwarded storage request.
    pub forward_timeout_ms: u64,
    pub lookup_timeout_ms: u64,
    /// Complete member list to build the ring from at startup.
    pub network: Vec<String>,
    /// Contact to join through at startup.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub join: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND_ADDR.to_string(),
            advertise: None,
            stabilize_interval_ms: DEFAULT_STABILIZE_INTERVAL_MS,
            fix_fingers_interval_ms: DEFAULT_FIX_FINGERS_INTERVAL_MS,
            check_predecessor_interval_ms: DEFAULT_CHECK_PREDECESSOR_INTERVAL_MS,
            successor_list_size: DEFAULT_SUCCESSOR_LIST_SIZE,
            max_lookup_hops: DEFAULT_MAX_LOOKUP_HOPS,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            forward_timeout_ms: DEFAULT_FORWARD_TIMEOUT_MS,
            lookup_timeout_ms: DEFAULT_LOOKUP_TIMEOUT_MS,
            network: vec![],
            join: None,
        }
    }
}

impl Config {
    pub fn advertise_addr(&self) -> &str {
        self.advertise.as_deref().unwrap_or(&self.bind)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn forward_timeout(&self) -> Duration {
        Duration::from_millis(self.forward_timeout_ms)
    }

    pub fn write_fs<P>(&self, path: P) -> Result<String>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        ensure_parent_dir(&path)?;
        let f =
            fs::File::create(path.as_path()).map_err(|e| Error::CreateFileError(e.to_string()))?;
        let f_writer = io::BufWriter::new(f);
        serde_yaml::to_writer(f_writer, self).map_err(|_| Error::EncodeError)?;
        Ok(path.to_string_lossy().to_string())
    }

    pub fn read_fs<P>(path: P) -> Result<Config>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        tracing::debug!("Read config from: {:?}", path);
        let f = fs::File::open(path).map_err(|e| Error::OpenFileError(e.to_string()))?;
        let f_rdr = io::BufReader::new(f);
        Ok(serde_yaml::from_reader(f_rdr)?)
    }
}

impl TryFrom<&Config> for SwarmConfig {
    type Error = Error;
    fn try_from(config: &Config) -> Result<Self> {
        let advertise = config.advertise_addr();
        if advertise.parse::<std::net::SocketAddr>().is_err() {
            return Err(Error::InvalidAddress(advertise.to_string()));
        }
        let mut sc = SwarmConfig::new(advertise);
        sc.successor_list_size = config.successor_list_size;
        sc.max_lookup_hops = config.max_lookup_hops;
        sc.lookup_timeout = Duration::from_millis(config.lookup_timeout_ms);
        sc.stabilize_interval = Duration::from_millis(config.stabilize_interval_ms);
        sc.fix_fingers_interval = Duration::from_millis(config.fix_fingers_interval_ms);
        sc.check_predecessor_interval =
            Duration::from_millis(config.check_predecessor_interval_ms);
        sc.validate()?;
        Ok(sc)
    }
}
