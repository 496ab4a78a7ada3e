//! Topic → event table and the decoding listener wrapper.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::Event;
use alloy_primitives::B256;
use async_trait::async_trait;
use chainlog_core::{
    ConsumerId, DecodeError, DecodedLog, DeliveryError, LogBroadcast, LogEvent, LogListener,
};
use tracing::debug;

// ─── EventTypes ───────────────────────────────────────────────────────────────

/// Known event types of a contract, keyed by signature topic.
#[derive(Debug, Clone, Default)]
pub struct EventTypes {
    events: HashMap<B256, Event>,
}

impl EventTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from human-readable signatures, e.g.
    /// `"event NewRound(uint256 indexed roundId, address indexed startedBy, uint256 startedAt)"`.
    pub fn from_signatures<'a>(
        signatures: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, DecodeError> {
        let mut types = Self::new();
        for signature in signatures {
            let event = Event::parse(signature).map_err(|e| DecodeError::InvalidSignature {
                signature: signature.to_string(),
                reason: e.to_string(),
            })?;
            types.insert(event);
        }
        Ok(types)
    }

    /// Add an event. Anonymous events have no signature topic and are ignored.
    pub fn insert(&mut self, event: Event) {
        if event.anonymous {
            return;
        }
        self.events.insert(event.selector(), event);
    }

    pub fn get(&self, topic: &B256) -> Option<&Event> {
        self.events.get(topic)
    }

    /// Signature topic of the event named `name`.
    pub fn topic_of(&self, name: &str) -> Option<B256> {
        self.events
            .iter()
            .find(|(_, e)| e.name == name)
            .map(|(topic, _)| *topic)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Decode `log` if its primary topic is known.
    ///
    /// Returns `None` for logs without a topic or with an unknown one.
    pub fn decode(&self, log: &LogEvent) -> Option<Result<DecodedLog, DecodeError>> {
        let event = self.get(log.topic0()?)?;
        Some(decode_log(event, log))
    }
}

/// Decode `log` against `event`.
///
/// Indexed parameters come from `topics[1..]`, the rest from `data`. Fields
/// are returned in declaration order.
pub fn decode_log(event: &Event, log: &LogEvent) -> Result<DecodedLog, DecodeError> {
    let failed = |reason: String| DecodeError::AbiDecodeFailed {
        event: event.name.clone(),
        reason,
    };

    match log.topic0() {
        None => return Err(DecodeError::MissingTopic),
        Some(topic) if *topic != event.selector() => {
            return Err(DecodeError::TopicMismatch {
                topic: *topic,
                event: event.name.clone(),
            })
        }
        Some(_) => {}
    }

    let indexed_count = event.inputs.iter().filter(|p| p.indexed).count();
    if log.topics.len() != indexed_count + 1 {
        return Err(failed(format!(
            "expected {} topics, got {}",
            indexed_count + 1,
            log.topics.len()
        )));
    }

    let mut types = Vec::with_capacity(event.inputs.len());
    for param in &event.inputs {
        let ty = param.resolve().map_err(|e| failed(e.to_string()))?;
        types.push(ty);
    }

    let body_types: Vec<DynSolType> = event
        .inputs
        .iter()
        .zip(&types)
        .filter(|(p, _)| !p.indexed)
        .map(|(_, ty)| ty.clone())
        .collect();
    let body = if body_types.is_empty() {
        Vec::new()
    } else {
        match DynSolType::Tuple(body_types)
            .abi_decode_params(&log.data)
            .map_err(|e| failed(e.to_string()))?
        {
            DynSolValue::Tuple(values) => values,
            other => vec![other],
        }
    };

    let mut topics = log.topics[1..].iter();
    let mut body = body.into_iter();
    let mut fields = Vec::with_capacity(event.inputs.len());
    for (param, ty) in event.inputs.iter().zip(&types) {
        let value = if param.indexed {
            let topic = topics
                .next()
                .ok_or_else(|| failed(format!("missing topic for {}", param.name)))?;
            decode_topic(topic, ty).map_err(|e| failed(format!("{}: {e}", param.name)))?
        } else {
            body.next()
                .ok_or_else(|| failed(format!("missing data for {}", param.name)))?
        };
        fields.push((param.name.clone(), value));
    }

    Ok(DecodedLog {
        raw: log.clone(),
        event: event.name.clone(),
        fields,
    })
}

/// Decode one indexed topic.
///
/// Reference types are stored as the keccak256 of their encoding and cannot
/// be recovered; the raw 32-byte hash is returned for those.
fn decode_topic(topic: &B256, ty: &DynSolType) -> Result<DynSolValue, alloy_dyn_abi::Error> {
    match ty {
        DynSolType::String
        | DynSolType::Bytes
        | DynSolType::Array(_)
        | DynSolType::FixedArray(..)
        | DynSolType::Tuple(_) => Ok(DynSolValue::FixedBytes(*topic, 32)),
        _ => ty.abi_decode(topic.as_slice()),
    }
}

// ─── DecodingLogListener ──────────────────────────────────────────────────────

/// Wraps a listener, replacing raw logs of known event types with their
/// decoded form before forwarding.
///
/// - Incoming errors are forwarded unchanged.
/// - Unknown topics are forwarded raw.
/// - Decode failures are forwarded as [`DeliveryError::Decode`].
pub struct DecodingLogListener {
    types: Arc<EventTypes>,
    inner: Arc<dyn LogListener>,
}

impl DecodingLogListener {
    pub fn new(types: Arc<EventTypes>, inner: Arc<dyn LogListener>) -> Self {
        Self { types, inner }
    }

    pub fn inner(&self) -> &Arc<dyn LogListener> {
        &self.inner
    }
}

#[async_trait]
impl LogListener for DecodingLogListener {
    fn on_connect(&self) {
        self.inner.on_connect();
    }

    fn on_disconnect(&self) {
        self.inner.on_disconnect();
    }

    async fn handle_log(&self, broadcast: &mut dyn LogBroadcast, err: Option<DeliveryError>) {
        if err.is_some() {
            self.inner.handle_log(broadcast, err).await;
            return;
        }

        let outcome = self.types.decode(broadcast.log().raw());
        match outcome {
            None => self.inner.handle_log(broadcast, None).await,
            Some(Ok(decoded)) => {
                broadcast.update_log(decoded.into());
                self.inner.handle_log(broadcast, None).await;
            }
            Some(Err(e)) => {
                debug!(consumer = %self.inner.consumer(), error = %e, "log decode failed");
                self.inner.handle_log(broadcast, Some(e.into())).await;
            }
        }
    }

    fn consumer(&self) -> ConsumerId {
        self.inner.consumer()
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
