// Escrow contract datum, in Plutus JSON constructor form.
//
// The datum travels as `{"constructor": n, "fields": [...]}` with
// leaf values `{"bytes": hex}` / `{"int": n}`. The engine re-derives a
// new datum for each business intent, carrying the immutable fields
// (participant key hashes, identifier, timing) forward unchanged.

use serde_json::{json, Value};

use crate::error::ChainError;

/// On-chain business state of one escrow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscrowState {
    FundsLocked,
    ResultSubmitted,
    RefundRequested,
    Disputed,
}

impl EscrowState {
    pub fn alternative(&self) -> u64 {
        match self {
            EscrowState::FundsLocked => 0,
            EscrowState::ResultSubmitted => 1,
            EscrowState::RefundRequested => 2,
            EscrowState::Disputed => 3,
        }
    }

    pub fn from_alternative(alt: u64) -> Result<Self, ChainError> {
        match alt {
            0 => Ok(EscrowState::FundsLocked),
            1 => Ok(EscrowState::ResultSubmitted),
            2 => Ok(EscrowState::RefundRequested),
            3 => Ok(EscrowState::Disputed),
            other => Err(ChainError::InvalidDatum(format!(
                "unknown escrow state constructor {}",
                other
            ))),
        }
    }
}

/// Redeemer for spending the escrow output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpendRedeemer {
    Withdraw,
    RequestRefund,
    CancelRefund,
    WithdrawRefund,
    SubmitResult,
    DenyRefund,
}

impl SpendRedeemer {
    pub fn alternative(&self) -> u64 {
        match self {
            SpendRedeemer::Withdraw => 0,
            SpendRedeemer::RequestRefund => 1,
            SpendRedeemer::CancelRefund => 2,
            SpendRedeemer::WithdrawRefund => 3,
            SpendRedeemer::SubmitResult => 4,
            SpendRedeemer::DenyRefund => 5,
        }
    }

    pub fn to_plutus(&self) -> Value {
        constr(self.alternative(), vec![])
    }
}

/// Redeemer for the registry minting policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MintRedeemer {
    Mint,
    Burn,
}

impl MintRedeemer {
    pub fn to_plutus(&self) -> Value {
        let alt = match self {
            MintRedeemer::Mint => 0,
            MintRedeemer::Burn => 1,
        };
        constr(alt, vec![])
    }
}

/// Decoded escrow datum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowDatum {
    pub buyer_vkey: String,
    pub seller_vkey: String,
    pub blockchain_identifier: String,
    pub result_hash: String,
    pub result_time: i64,
    pub unlock_time: i64,
    pub refund_time: i64,
    pub refund_requested: bool,
    pub cooldown_time: i64,
    pub new_cooldown_time: i64,
    pub state: EscrowState,
}

impl EscrowDatum {
    /// Parse the 11-field escrow constructor
    pub fn decode(value: &Value) -> Result<Self, ChainError> {
        let fields = constructor_fields(value, 0)?;
        if fields.len() != 11 {
            return Err(ChainError::InvalidDatum(format!(
                "expected 11 datum fields, got {}",
                fields.len()
            )));
        }

        Ok(Self {
            buyer_vkey: bytes_field(&fields[0])?,
            seller_vkey: bytes_field(&fields[1])?,
            blockchain_identifier: bytes_field(&fields[2])?,
            result_hash: bytes_field(&fields[3])?,
            result_time: int_field(&fields[4])?,
            unlock_time: int_field(&fields[5])?,
            refund_time: int_field(&fields[6])?,
            refund_requested: bool_field(&fields[7])?,
            cooldown_time: int_field(&fields[8])?,
            new_cooldown_time: int_field(&fields[9])?,
            state: EscrowState::from_alternative(constructor_alternative(&fields[10])?)?,
        })
    }

    pub fn encode(&self) -> Value {
        constr(
            0,
            vec![
                bytes(&self.buyer_vkey),
                bytes(&self.seller_vkey),
                bytes(&self.blockchain_identifier),
                bytes(&self.result_hash),
                int(self.result_time),
                int(self.unlock_time),
                int(self.refund_time),
                plutus_bool(self.refund_requested),
                int(self.cooldown_time),
                int(self.new_cooldown_time),
                constr(self.state.alternative(), vec![]),
            ],
        )
    }

    /// Datum for a submitted result: the requested hash replaces the
    /// stored one, the cooldown resets, and a pending refund request
    /// escalates to a dispute instead of a plain result submission.
    pub fn with_result_submitted(&self, result_hash: &str) -> Self {
        let mut next = self.clone();
        next.result_hash = result_hash.to_string();
        next.cooldown_time = next.new_cooldown_time;
        next.new_cooldown_time = 0;
        next.state = if self.refund_requested {
            EscrowState::Disputed
        } else {
            EscrowState::ResultSubmitted
        };
        next
    }

    /// Datum for a buyer-initiated refund request
    pub fn with_refund_requested(&self) -> Self {
        let mut next = self.clone();
        next.refund_requested = true;
        next.cooldown_time = next.new_cooldown_time;
        next.new_cooldown_time = 0;
        next.state = if next.result_hash.is_empty() {
            EscrowState::RefundRequested
        } else {
            EscrowState::Disputed
        };
        next
    }

    /// Datum for a seller denying a refund request
    pub fn with_refund_denied(&self) -> Self {
        let mut next = self.clone();
        next.refund_requested = false;
        next.cooldown_time = next.new_cooldown_time;
        next.new_cooldown_time = 0;
        next.state = EscrowState::ResultSubmitted;
        next
    }
}

// ---- Plutus JSON helpers ----

pub fn constr(alternative: u64, fields: Vec<Value>) -> Value {
    json!({ "constructor": alternative, "fields": fields })
}

pub fn bytes(hex_str: &str) -> Value {
    json!({ "bytes": hex_str })
}

pub fn int(n: i64) -> Value {
    json!({ "int": n })
}

pub fn plutus_bool(b: bool) -> Value {
    // Plutus Bool: False = constructor 0, True = constructor 1
    constr(if b { 1 } else { 0 }, vec![])
}

fn constructor_alternative(value: &Value) -> Result<u64, ChainError> {
    value
        .get("constructor")
        .and_then(Value::as_u64)
        .ok_or_else(|| ChainError::InvalidDatum("missing constructor tag".into()))
}

fn constructor_fields(value: &Value, expected: u64) -> Result<Vec<Value>, ChainError> {
    let alt = constructor_alternative(value)?;
    if alt != expected {
        return Err(ChainError::InvalidDatum(format!(
            "expected constructor {}, got {}",
            expected, alt
        )));
    }
    value
        .get("fields")
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| ChainError::InvalidDatum("missing constructor fields".into()))
}

fn bytes_field(value: &Value) -> Result<String, ChainError> {
    value
        .get("bytes")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ChainError::InvalidDatum("expected bytes field".into()))
}

fn int_field(value: &Value) -> Result<i64, ChainError> {
    value
        .get("int")
        .and_then(Value::as_i64)
        .ok_or_else(|| ChainError::InvalidDatum("expected int field".into()))
}

fn bool_field(value: &Value) -> Result<bool, ChainError> {
    match constructor_alternative(value)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(ChainError::InvalidDatum(format!(
            "expected bool constructor, got {}",
            other
        ))),
    }
}
