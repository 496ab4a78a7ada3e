//! FluxAggregator event table and typed projections.

use std::sync::Arc;

use alloy_dyn_abi::DynSolValue;
use alloy_primitives::{Address, I256, U256};
use chainlog_core::{DecodeError, DecodedLog, LogEvent};

use crate::decoding::EventTypes;

pub const NEW_ROUND_SIGNATURE: &str =
    "event NewRound(uint256 indexed roundId, address indexed startedBy, uint256 startedAt)";

pub const ANSWER_UPDATED_SIGNATURE: &str =
    "event AnswerUpdated(int256 indexed current, uint256 indexed roundId, uint256 timestamp)";

/// Event table for a FluxAggregator contract.
pub fn event_types() -> Result<Arc<EventTypes>, DecodeError> {
    EventTypes::from_signatures([NEW_ROUND_SIGNATURE, ANSWER_UPDATED_SIGNATURE]).map(Arc::new)
}

/// `NewRound` with its raw log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogNewRound {
    pub log: LogEvent,
    pub round_id: U256,
    pub started_by: Address,
    pub started_at: U256,
}

/// `AnswerUpdated` with its raw log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogAnswerUpdated {
    pub log: LogEvent,
    pub current: I256,
    pub round_id: U256,
    pub timestamp: U256,
}

impl TryFrom<&DecodedLog> for LogNewRound {
    type Error = DecodeError;

    fn try_from(decoded: &DecodedLog) -> Result<Self, Self::Error> {
        expect_event(decoded, "NewRound")?;
        Ok(Self {
            log: decoded.raw.clone(),
            round_id: uint(decoded, "roundId")?,
            started_by: field(decoded, "startedBy", DynSolValue::as_address)?,
            started_at: uint(decoded, "startedAt")?,
        })
    }
}

impl TryFrom<&DecodedLog> for LogAnswerUpdated {
    type Error = DecodeError;

    fn try_from(decoded: &DecodedLog) -> Result<Self, Self::Error> {
        expect_event(decoded, "AnswerUpdated")?;
        Ok(Self {
            log: decoded.raw.clone(),
            current: field(decoded, "current", |v| v.as_int().map(|(i, _)| i))?,
            round_id: uint(decoded, "roundId")?,
            timestamp: uint(decoded, "timestamp")?,
        })
    }
}

fn expect_event(decoded: &DecodedLog, name: &str) -> Result<(), DecodeError> {
    if decoded.event == name {
        Ok(())
    } else {
        Err(DecodeError::FieldType {
            event: decoded.event.clone(),
            field: format!("<event {name}>"),
        })
    }
}

fn uint(decoded: &DecodedLog, name: &str) -> Result<U256, DecodeError> {
    field(decoded, name, |v| v.as_uint().map(|(u, _)| u))
}

fn field<T>(
    decoded: &DecodedLog,
    name: &str,
    extract: impl Fn(&DynSolValue) -> Option<T>,
) -> Result<T, DecodeError> {
    decoded
        .field(name)
        .and_then(extract)
        .ok_or_else(|| DecodeError::FieldType {
            event: decoded.event.clone(),
            field: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, Bytes, B256};

    fn answer_updated_log(types: &EventTypes, current: I256) -> LogEvent {
        LogEvent {
            topics: vec![
                types.topic_of("AnswerUpdated").unwrap(),
                B256::from(current.to_be_bytes::<32>()),
                B256::from(U256::from(3).to_be_bytes::<32>()),
            ],
            data: Bytes::from(U256::from(1_700_000_000u64).to_be_bytes::<32>().to_vec()),
            block_number: 44,
            ..Default::default()
        }
    }

    #[test]
    fn answer_updated_projection() {
        let types = event_types().unwrap();
        assert_eq!(
            types.topic_of("AnswerUpdated").unwrap().to_string(),
            "0x0559884fd3a460db3073b7fc896cc77986f16e378210ded43186175bf646fc5f"
        );
        let current = I256::try_from(-42i64).unwrap();
        let raw = answer_updated_log(&types, current);
        let decoded = types.decode(&raw).unwrap().unwrap();

        let typed = LogAnswerUpdated::try_from(&decoded).unwrap();
        assert_eq!(typed.current, current);
        assert_eq!(typed.round_id, U256::from(3));
        assert_eq!(typed.timestamp, U256::from(1_700_000_000u64));
        assert_eq!(typed.log, raw);
    }

    #[test]
    fn projection_rejects_other_event() {
        let types = event_types().unwrap();
        let raw = answer_updated_log(&types, I256::ONE);
        let decoded = types.decode(&raw).unwrap().unwrap();
        assert!(LogNewRound::try_from(&decoded).is_err());
    }

    #[test]
    fn new_round_projection() {
        let types = event_types().unwrap();
        let started_by = address!("f17f52151ebef6c7334fad080c5704d77216b732");
        let raw = LogEvent {
            topics: vec![
                types.topic_of("NewRound").unwrap(),
                B256::from(U256::from(1).to_be_bytes::<32>()),
                started_by.into_word(),
            ],
            data: Bytes::from(U256::from(15).to_be_bytes::<32>().to_vec()),
            ..Default::default()
        };
        let decoded = types.decode(&raw).unwrap().unwrap();
        let typed = LogNewRound::try_from(&decoded).unwrap();
        assert_eq!(typed.round_id, U256::from(1));
        assert_eq!(typed.started_by, started_by);
        assert_eq!(typed.started_at, U256::from(15));
    }
}
