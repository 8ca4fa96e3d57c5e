//! MEMO CODEC
//!
//! Depositors signal validator intent through a base64 blob in a transfer memo.
//! Two wire forms coexist on chain:
//!
//! - **Legacy**: a bare run of 21-byte records, `[weight: u8][address: 20 bytes]`,
//!   with `weight` in `0..=200`.
//! - **TLV**: a stream of `[id: u8][len: u8][data: len bytes]` fields. Field
//!   `0x02` carries legacy-style weighted addresses; `0x00` maps the deposit to
//!   another account; `0x01` requests the minted assets be returned to sender.
//!
//! Historical memos carry no version tag, so [`MemoFormat::detect`] keeps the
//! legacy rule: a length divisible by 21 is legacy. Callers that know the
//! form can use [`decode_memo_as`] instead.

use crate::coin::Coins;
use crate::intent::ValidatorIntents;
use crate::math::{truncate, Dec, Int};
use crate::zone::{AddressCodec, AddressError, Zone};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::warn;
use num_traits::Signed;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// One weight byte plus a 20-byte address hash.
pub const WEIGHTED_ADDRESS_RECORD_LEN: usize = 21;
pub const ADDRESS_HASH_LEN: usize = 20;
/// Weight byte denominator; a record weighted 200 claims the full deposit.
pub const MAX_MEMO_WEIGHT: u8 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum MemoFieldId {
    /// Account the minted assets should be credited to.
    AccountMap = 0,
    /// Return minted assets to the sending chain.
    ReturnToSender = 1,
    /// Weighted validator addresses.
    StakingIntent = 2,
}

impl MemoFieldId {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MemoFieldId {
    type Error = MemoError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MemoFieldId::AccountMap),
            1 => Ok(MemoFieldId::ReturnToSender),
            2 => Ok(MemoFieldId::StakingIntent),
            other => Err(MemoError::UnknownField(other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoField {
    pub id: MemoFieldId,
    pub data: Vec<u8>,
}

impl MemoField {
    pub fn new(id: MemoFieldId, data: Vec<u8>) -> Self {
        MemoField { id, data }
    }

    pub fn validate(&self) -> Result<(), MemoError> {
        match self.id {
            MemoFieldId::AccountMap => verify_account_bytes(&self.data),
            MemoFieldId::ReturnToSender => Ok(()),
            MemoFieldId::StakingIntent => validate_weighted_addresses(&self.data),
        }
    }

    /// TLV encoding of this field.
    pub fn encode(&self) -> Result<Vec<u8>, MemoError> {
        let len = u8::try_from(self.data.len()).map_err(|_| MemoError::FieldTooLong {
            id: self.id.as_byte(),
            len: self.data.len(),
        })?;
        let mut out = Vec::with_capacity(self.data.len() + 2);
        out.push(self.id.as_byte());
        out.push(len);
        out.extend_from_slice(&self.data);
        Ok(out)
    }
}

/// Decoded memo, at most one field per id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoFields(BTreeMap<MemoFieldId, MemoField>);

impl MemoFields {
    pub fn new() -> Self {
        MemoFields(BTreeMap::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, id: MemoFieldId) -> Option<&MemoField> {
        self.0.get(&id)
    }

    pub fn insert(&mut self, field: MemoField) -> Result<(), MemoError> {
        if self.0.contains_key(&field.id) {
            return Err(MemoError::DuplicateField(field.id.as_byte()));
        }
        self.0.insert(field.id, field);
        Ok(())
    }

    /// Whether the depositor asked for minted assets to be returned to sender.
    pub fn rts(&self) -> bool {
        self.0.contains_key(&MemoFieldId::ReturnToSender)
    }

    pub fn account_map(&self) -> Option<&[u8]> {
        self.0.get(&MemoFieldId::AccountMap).map(|f| f.data.as_slice())
    }

    /// Ordinal validator weights carried by the memo, scaled by the deposit's
    /// base-denom amount. Addresses outside the zone's validator set are
    /// dropped. Returns `found = false` when the memo carries no usable intent.
    pub fn intent(&self, coins: &Coins, zone: &Zone) -> (ValidatorIntents, bool) {
        let Some(field) = self.0.get(&MemoFieldId::StakingIntent) else {
            return (ValidatorIntents::new(), false);
        };

        match zone.convert_memo_to_ordinal_intents(coins, &field.data) {
            Ok(mut intents) => {
                if !zone.validators.is_empty() {
                    intents.retain(|i| {
                        let known = zone.is_validator(&i.validator_id);
                        if !known {
                            warn!("memo intent names unknown validator {} on {}", i.validator_id, zone.chain_id);
                        }
                        known
                    });
                }
                let found = !intents.is_empty();
                (intents, found)
            }
            Err(e) => {
                warn!("unable to derive intent from memo on {}: {}", zone.chain_id, e);
                (ValidatorIntents::new(), false)
            }
        }
    }

    /// TLV encoding of every field, in id order.
    pub fn encode(&self) -> Result<Vec<u8>, MemoError> {
        let mut out = Vec::new();
        for field in self.0.values() {
            out.extend(field.encode()?);
        }
        Ok(out)
    }
}

/// Wire form of a raw memo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoFormat {
    Legacy,
    Tlv,
}

impl MemoFormat {
    /// Historical rule: non-empty and a multiple of 21 bytes means legacy.
    pub fn detect(raw: &[u8]) -> Self {
        if !raw.is_empty() && raw.len() % WEIGHTED_ADDRESS_RECORD_LEN == 0 {
            MemoFormat::Legacy
        } else {
            MemoFormat::Tlv
        }
    }
}

/// Decode raw memo bytes, choosing the wire form with [`MemoFormat::detect`].
pub fn decode_memo(raw: &[u8]) -> Result<MemoFields, MemoError> {
    decode_memo_as(raw, MemoFormat::detect(raw))
}

/// Decode raw memo bytes in an explicitly chosen wire form.
pub fn decode_memo_as(raw: &[u8], format: MemoFormat) -> Result<MemoFields, MemoError> {
    match format {
        MemoFormat::Legacy => {
            validate_weighted_addresses(raw)?;
            let mut fields = MemoFields::new();
            fields.insert(MemoField::new(MemoFieldId::StakingIntent, raw.to_vec()))?;
            Ok(fields)
        }
        MemoFormat::Tlv => parse_memo_fields(raw),
    }
}

/// Decode a base64 memo string. An empty string means "no intent signaled".
pub fn decode_memo_base64(memo: &str) -> Result<MemoFields, MemoError> {
    if memo.is_empty() {
        return Ok(MemoFields::new());
    }
    let raw = STANDARD
        .decode(memo)
        .map_err(|e| MemoError::InvalidBase64(e.to_string()))?;
    decode_memo(&raw)
}

pub fn encode_memo_base64(fields: &MemoFields) -> Result<String, MemoError> {
    Ok(STANDARD.encode(fields.encode()?))
}

/// Parse a TLV field stream. At least one field is required.
pub fn parse_memo_fields(raw: &[u8]) -> Result<MemoFields, MemoError> {
    if raw.is_empty() {
        return Err(MemoError::EmptyMemo);
    }

    let mut fields = MemoFields::new();
    let mut idx = 0;
    while idx < raw.len() {
        if idx + 2 > raw.len() {
            return Err(MemoError::TruncatedField { offset: idx });
        }
        let id = MemoFieldId::try_from(raw[idx])?;
        let start = idx + 2;
        let end = start + raw[idx + 1] as usize;
        if end > raw.len() {
            return Err(MemoError::TruncatedField { offset: idx });
        }

        let field = MemoField::new(id, raw[start..end].to_vec());
        field.validate()?;
        fields.insert(field)?;
        idx = end;
    }

    Ok(fields)
}

pub fn validate_weighted_addresses(data: &[u8]) -> Result<(), MemoError> {
    if data.is_empty() || data.len() % WEIGHTED_ADDRESS_RECORD_LEN != 0 {
        return Err(MemoError::InvalidLength(data.len()));
    }
    for record in data.chunks_exact(WEIGHTED_ADDRESS_RECORD_LEN) {
        if record[0] > MAX_MEMO_WEIGHT {
            return Err(MemoError::WeightOutOfBounds(record[0]));
        }
    }
    Ok(())
}

/// Each record contributes `(weight / 200) × base_amount` to its validator.
pub fn ordinal_intents_from_weighted_addresses(
    data: &[u8],
    base_amount: &Int,
    codec: &dyn AddressCodec,
) -> Result<ValidatorIntents, MemoError> {
    validate_weighted_addresses(data)?;

    let mut out = ValidatorIntents::new();
    for record in data.chunks_exact(WEIGHTED_ADDRESS_RECORD_LEN) {
        let validator_id = codec.encode(&record[1..])?;
        let ordinal = Dec::new(Int::from(record[0]), Int::from(MAX_MEMO_WEIGHT)) * Dec::from_integer(base_amount.clone());
        out.add_weight(&validator_id, &ordinal);
    }
    Ok(out)
}

/// Pack `(weight, address hash)` pairs into legacy records.
pub fn encode_weighted_addresses(entries: &[(u8, [u8; ADDRESS_HASH_LEN])]) -> Result<Vec<u8>, MemoError> {
    let mut out = Vec::with_capacity(entries.len() * WEIGHTED_ADDRESS_RECORD_LEN);
    for (weight, address) in entries {
        if *weight > MAX_MEMO_WEIGHT {
            return Err(MemoError::WeightOutOfBounds(*weight));
        }
        out.push(*weight);
        out.extend_from_slice(address);
    }
    Ok(out)
}

/// Quantize a fractional weight in `[0, 1]` to a memo weight byte (rounding down).
pub fn weight_byte_from_fraction(fraction: &Dec) -> Result<u8, MemoError> {
    if fraction.is_negative() || *fraction > Dec::from_integer(Int::from(1)) {
        return Err(MemoError::InvalidWeight(fraction.to_string()));
    }
    let scaled = truncate(&(fraction * Dec::from_integer(Int::from(MAX_MEMO_WEIGHT))));
    u8::try_from(scaled).map_err(|_| MemoError::InvalidWeight(fraction.to_string()))
}

fn verify_account_bytes(data: &[u8]) -> Result<(), MemoError> {
    match data.len() {
        20 | 32 => Ok(()),
        0 => Err(MemoError::InvalidAddress("empty address".to_string())),
        n => Err(MemoError::InvalidAddress(format!("unexpected address length {}", n))),
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum MemoError {
    #[error("Memo length unexpectedly zero")]
    EmptyMemo,
    #[error("Failed to decode base64 memo: {0}")]
    InvalidBase64(String),
    #[error("Weighted address data must be a non-zero multiple of 21 bytes, got {0}")]
    InvalidLength(usize),
    #[error("Out of bounds memo weight; expected 0-200, got {0}")]
    WeightOutOfBounds(u8),
    #[error("Unknown memo field id {0}")]
    UnknownField(u8),
    #[error("Memo field at offset {offset} reads past the end of the memo")]
    TruncatedField { offset: usize },
    #[error("Duplicate memo field id {0}")]
    DuplicateField(u8),
    #[error("Invalid address bytes in memo: {0}")]
    InvalidAddress(String),
    #[error("Memo field {id} is {len} bytes, longer than 255")]
    FieldTooLong { id: u8, len: usize },
    #[error("Invalid memo weight {0}")]
    InvalidWeight(String),
    #[error("Address error: {0}")]
    Address(#[from] AddressError),
}
