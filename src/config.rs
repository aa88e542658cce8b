//! Runtime configuration.
//!
//! `RingConfig` holds the tunables shared by every member hosted in a process.
//! `NodeArgs` is what the `chord-node` binary reads from its command line.

use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{Result, RingError};

pub const DEFAULT_CAPACITY: u64 = 1_048_576;
pub const DEFAULT_PORT: u16 = 1099;

#[derive(Debug, Clone)]
pub struct RingConfig {
    /// Number of members the identifier space is sized for (power of two).
    pub capacity: u64,
    /// Deadline for a single remote call.
    pub rpc_timeout: Duration,
    /// Attempts per remote call when the transport itself fails.
    pub rpc_attempts: usize,
    /// How many times a join restarts its walk after losing a splice race.
    pub splice_retries: u32,
    /// Upper bound on hops for ring walks and probes.
    pub max_walk_hops: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            rpc_timeout: Duration::from_secs(2),
            rpc_attempts: 3,
            splice_retries: 3,
            max_walk_hops: 65_536,
        }
    }
}

impl RingConfig {
    /// Defaults overridden by `RING_CAPACITY`, `RING_RPC_TIMEOUT_MS` and
    /// `RING_RPC_ATTEMPTS` when set.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(capacity) = env_u64("RING_CAPACITY")? {
            config.capacity = capacity;
        }
        if let Some(ms) = env_u64("RING_RPC_TIMEOUT_MS")? {
            config.rpc_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = env_u64("RING_RPC_ATTEMPTS")? {
            config.rpc_attempts = attempts.max(1) as usize;
        }

        Ok(config)
    }
}

fn env_u64(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RingError::InvalidArgument(format!("{}={}: {}", name, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Where to join an existing ring: member `name` served at `addr`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactArg {
    pub name: String,
    pub addr: SocketAddr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeArgs {
    pub bind: SocketAddr,
    pub name: String,
    pub contact: Option<ContactArg>,
}

impl NodeArgs {
    pub const USAGE: &'static str = "--name <member> [--bind <addr:port>] [--join <member>@<addr:port>]";

    /// Parses `--bind`, `--name` and `--join` from `args` (program name first).
    pub fn parse(args: &[String]) -> Result<Self> {
        let mut bind: SocketAddr = SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT));
        let mut name: Option<String> = None;
        let mut contact: Option<ContactArg> = None;

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--bind" => {
                    bind = flag_value(args, i)?
                        .parse()
                        .map_err(|e| RingError::InvalidArgument(format!("--bind: {}", e)))?;
                    i += 2;
                }
                "--name" => {
                    name = Some(flag_value(args, i)?.to_string());
                    i += 2;
                }
                "--join" => {
                    contact = Some(parse_contact(flag_value(args, i)?)?);
                    i += 2;
                }
                other => {
                    return Err(RingError::InvalidArgument(format!(
                        "unknown argument {}",
                        other
                    )));
                }
            }
        }

        let name = name.ok_or_else(|| RingError::InvalidArgument("--name is required".into()))?;
        if name.is_empty() {
            return Err(RingError::InvalidArgument("member name is empty".into()));
        }

        Ok(Self {
            bind,
            name,
            contact,
        })
    }
}

fn flag_value(args: &[String], i: usize) -> Result<&str> {
    args.get(i + 1)
        .map(String::as_str)
        .ok_or_else(|| RingError::InvalidArgument(format!("{} expects a value", args[i])))
}

fn parse_contact(raw: &str) -> Result<ContactArg> {
    let (name, addr) = raw.split_once('@').ok_or_else(|| {
        RingError::InvalidArgument(format!("--join expects <member>@<addr:port>, got {}", raw))
    })?;
    let addr = addr
        .parse()
        .map_err(|e| RingError::InvalidArgument(format!("--join address: {}", e)))?;
    Ok(ContactArg {
        name: name.to_string(),
        addr,
    })
}
