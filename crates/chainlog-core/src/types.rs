//! Shared types for the log broadcasting pipeline.

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

// ─── LogEvent ─────────────────────────────────────────────────────────────────

/// A contract log as delivered by the chain client.
///
/// Deserializes directly from an Ethereum JSON-RPC log object
/// (`eth_getLogs` result item or `eth_subscription` payload).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEvent {
    /// Contract that emitted the log.
    pub address: Address,
    /// `topics[0]` is the event signature hash for non-anonymous events.
    pub topics: Vec<B256>,
    /// ABI-encoded non-indexed parameters.
    #[serde(default)]
    pub data: Bytes,
    #[serde(with = "quantity")]
    pub block_number: u64,
    pub block_hash: B256,
    #[serde(rename = "transactionHash", default)]
    pub tx_hash: B256,
    #[serde(rename = "transactionIndex", with = "quantity", default)]
    pub tx_index: u64,
    /// Position of the log within its block.
    #[serde(with = "quantity", default)]
    pub log_index: u64,
    /// Set by the node when the log was retracted by a reorg.
    #[serde(default)]
    pub removed: bool,
}

impl LogEvent {
    /// The deduplication identity of this log.
    pub fn identity(&self) -> LogIdentity {
        LogIdentity {
            block_hash: self.block_hash,
            tx_index: self.tx_index,
            log_index: self.log_index,
        }
    }

    /// The event signature topic, if present.
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }

    /// Sort key placing logs in chain order.
    pub fn chain_position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

// ─── LogIdentity ──────────────────────────────────────────────────────────────

/// Identity of a log for exactly-once purposes.
///
/// The block hash (not the block number) is part of the key: a reorg yields a
/// different hash at the same height, and that log is a new event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogIdentity {
    pub block_hash: B256,
    pub tx_index: u64,
    pub log_index: u64,
}

impl std::fmt::Display for LogIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.block_hash, self.tx_index, self.log_index)
    }
}

// ─── LogFilter ────────────────────────────────────────────────────────────────

/// Address filter for `get_logs` / `subscribe_logs`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogFilter {
    /// Contract addresses to watch.
    pub addresses: Vec<Address>,
    /// Start block (inclusive). Only meaningful for `get_logs`.
    pub from_block: Option<u64>,
}

impl LogFilter {
    /// Create a filter over the given addresses.
    pub fn addresses(addresses: impl IntoIterator<Item = Address>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
            from_block: None,
        }
    }

    /// Set the start block.
    pub fn from_block(mut self, block: u64) -> Self {
        self.from_block = Some(block);
        self
    }
}

// ─── ConsumerId ───────────────────────────────────────────────────────────────

/// What kind of component consumes a log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsumerKind {
    Job,
    Initiator,
}

impl std::fmt::Display for ConsumerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Job => write!(f, "job"),
            Self::Initiator => write!(f, "initiator"),
        }
    }
}

/// Identity of a log consumer; the second half of a consumption key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConsumerId {
    pub kind: ConsumerKind,
    pub id: String,
}

impl ConsumerId {
    pub fn job(id: impl Into<String>) -> Self {
        Self {
            kind: ConsumerKind::Job,
            id: id.into(),
        }
    }

    pub fn initiator(id: impl Into<String>) -> Self {
        Self {
            kind: ConsumerKind::Initiator,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

// ─── DecodedLog / BroadcastLog ────────────────────────────────────────────────

/// A log decoded against a known event type.
///
/// The raw log is retained so identity-relevant fields survive decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLog {
    pub raw: LogEvent,
    /// Event name, e.g. `"NewRound"`.
    pub event: String,
    /// Decoded parameters in declaration order.
    pub fields: Vec<(String, DynSolValue)>,
}

impl DecodedLog {
    /// Get a field value by name.
    pub fn field(&self, name: &str) -> Option<&DynSolValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

/// The log held by a broadcast: raw until a decoding listener replaces it.
#[derive(Debug, Clone, PartialEq)]
pub enum BroadcastLog {
    Raw(LogEvent),
    Decoded(DecodedLog),
}

impl BroadcastLog {
    /// The underlying chain log, regardless of decoding.
    pub fn raw(&self) -> &LogEvent {
        match self {
            Self::Raw(log) => log,
            Self::Decoded(decoded) => &decoded.raw,
        }
    }

    pub fn as_decoded(&self) -> Option<&DecodedLog> {
        match self {
            Self::Decoded(decoded) => Some(decoded),
            Self::Raw(_) => None,
        }
    }

    pub fn identity(&self) -> LogIdentity {
        self.raw().identity()
    }
}

impl From<LogEvent> for BroadcastLog {
    fn from(log: LogEvent) -> Self {
        Self::Raw(log)
    }
}

impl From<DecodedLog> for BroadcastLog {
    fn from(decoded: DecodedLog) -> Self {
        Self::Decoded(decoded)
    }
}

// ─── Hex quantities ───────────────────────────────────────────────────────────

/// Serde adapter for JSON-RPC quantities (`"0x1a"`), also accepting plain numbers.
mod quantity {
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Quantity {
        Hex(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{value:#x}"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        match Quantity::deserialize(deserializer)? {
            Quantity::Number(n) => Ok(n),
            Quantity::Hex(s) => {
                let digits = s.strip_prefix("0x").unwrap_or(&s);
                if digits.is_empty() {
                    return Ok(0);
                }
                u64::from_str_radix(digits, 16).map_err(D::Error::custom)
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
