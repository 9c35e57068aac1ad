//! # Transaction Model
//!
//! Immutable transaction values and the [`TransactionBuilder`] that produces them.
//!
//! A [`Transaction`] is identified by the SHA-256 digest of its content, so two
//! transactions with the same inputs and outputs share one [`TransactionId`] and
//! compare equal. The identifier is recomputed whenever a transaction is built
//! or decoded and is never taken on trust from the wire.

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// A 32-byte content-derived transaction identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TransactionId([u8; 32]);

impl TransactionId {
    /// The sentinel meaning "no such transaction". No real content hashes to it.
    pub const INVALID: TransactionId = TransactionId([0u8; 32]);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_invalid(&self) -> bool {
        *self == Self::INVALID
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransactionId({self})")
    }
}

impl FromStr for TransactionId {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// A 20-byte spending condition that outputs pay to.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address([u8; 20]);

impl Address {
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Derives the address controlled by the given public key.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let digest = Sha256::digest(public_key);
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest[..20]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl FromStr for Address {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut bytes = [0u8; 20];
        hex::decode_to_slice(s.trim(), &mut bytes)?;
        Ok(Self(bytes))
    }
}

/// A reference to output `index` of transaction `txid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub txid: TransactionId,
    pub index: u32,
}

impl OutPoint {
    /// The source of a generation input, which spends nothing.
    pub const GENERATION: OutPoint = OutPoint {
        txid: TransactionId::INVALID,
        index: u32::MAX,
    };

    pub fn new(txid: TransactionId, index: u32) -> Self {
        Self { txid, index }
    }

    pub fn is_generation(&self) -> bool {
        *self == Self::GENERATION
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionInput {
    pub source: OutPoint,
}

impl TransactionInput {
    /// An input spending output `index` of `txid`.
    pub fn spend(txid: TransactionId, index: u32) -> Self {
        Self {
            source: OutPoint::new(txid, index),
        }
    }

    /// An input that creates value instead of spending a prior output.
    pub fn generation() -> Self {
        Self {
            source: OutPoint::GENERATION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub amount: i64,
    pub address: Address,
}

impl TransactionOutput {
    pub fn pay_to(address: Address, amount: i64) -> Self {
        Self { amount, address }
    }
}

/// The content of a transaction as it travels on the wire.
#[derive(Serialize, Deserialize)]
struct TransactionBody {
    inputs: Vec<TransactionInput>,
    outputs: Vec<TransactionOutput>,
}

/// An immutable, content-addressed transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "TransactionBody", into = "TransactionBody")]
pub struct Transaction {
    id: TransactionId,
    inputs: Vec<TransactionInput>,
    outputs: Vec<TransactionOutput>,
}

impl Transaction {
    pub fn builder() -> TransactionBuilder {
        TransactionBuilder::new()
    }

    pub(crate) fn from_parts(inputs: Vec<TransactionInput>, outputs: Vec<TransactionOutput>) -> Self {
        let id = compute_id(&inputs, &outputs);
        Self {
            id,
            inputs,
            outputs,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn inputs(&self) -> &[TransactionInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TransactionOutput] {
        &self.outputs
    }

    /// The sum of all output amounts. Saturates for values decoded from an
    /// untrusted source; built transactions are checked against overflow.
    pub fn total_output(&self) -> i64 {
        self.outputs
            .iter()
            .fold(0i64, |acc, o| acc.saturating_add(o.amount))
    }

    /// Whether this transaction creates value from a single generation input.
    pub fn is_generation(&self) -> bool {
        matches!(self.inputs.as_slice(), [input] if input.source.is_generation())
    }
}

impl From<TransactionBody> for Transaction {
    fn from(body: TransactionBody) -> Self {
        Transaction::from_parts(body.inputs, body.outputs)
    }
}

impl From<Transaction> for TransactionBody {
    fn from(tx: Transaction) -> Self {
        TransactionBody {
            inputs: tx.inputs,
            outputs: tx.outputs,
        }
    }
}

/// Hashes a length-prefixed, little-endian rendering of the content.
fn compute_id(inputs: &[TransactionInput], outputs: &[TransactionOutput]) -> TransactionId {
    let mut hasher = Sha256::new();
    hasher.update((inputs.len() as u64).to_le_bytes());
    for input in inputs {
        hasher.update(input.source.txid.as_bytes());
        hasher.update(input.source.index.to_le_bytes());
    }
    hasher.update((outputs.len() as u64).to_le_bytes());
    for output in outputs {
        hasher.update(output.amount.to_le_bytes());
        hasher.update(output.address.as_bytes());
    }
    TransactionId(hasher.finalize().into())
}

/// Accumulates inputs and outputs and produces a validated [`Transaction`].
#[derive(Debug, Clone, Default)]
pub struct TransactionBuilder {
    inputs: Vec<TransactionInput>,
    outputs: Vec<TransactionOutput>,
}

impl TransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input(mut self, input: TransactionInput) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn inputs(mut self, inputs: impl IntoIterator<Item = TransactionInput>) -> Self {
        self.inputs.extend(inputs);
        self
    }

    pub fn output(mut self, output: TransactionOutput) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn outputs(mut self, outputs: impl IntoIterator<Item = TransactionOutput>) -> Self {
        self.outputs.extend(outputs);
        self
    }

    /// Finalizes the transaction.
    ///
    /// # Errors
    ///
    /// * [`ValidationError::NoOutputs`] if no output was added.
    /// * [`ValidationError::NegativeAmount`] for the first output paying a negative amount.
    /// * [`ValidationError::AmountOverflow`] if the output amounts do not fit in an `i64`.
    pub fn build(self) -> Result<Transaction, ValidationError> {
        if self.outputs.is_empty() {
            return Err(ValidationError::NoOutputs);
        }

        let mut total: i64 = 0;
        for (index, output) in self.outputs.iter().enumerate() {
            if output.amount < 0 {
                return Err(ValidationError::NegativeAmount {
                    index,
                    amount: output.amount,
                });
            }
            total = total
                .checked_add(output.amount)
                .ok_or(ValidationError::AmountOverflow)?;
        }

        Ok(Transaction::from_parts(self.inputs, self.outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(byte: u8) -> Address {
        Address::from_bytes([byte; 20])
    }

    #[test]
    fn identical_content_yields_identical_id() {
        let a = Transaction::builder()
            .input(TransactionInput::generation())
            .output(TransactionOutput::pay_to(address(1), 50))
            .build()
            .unwrap();
        let b = Transaction::builder()
            .input(TransactionInput::generation())
            .output(TransactionOutput::pay_to(address(1), 50))
            .build()
            .unwrap();

        assert_eq!(a, b);
        assert_eq!(a.id(), b.id());
        assert!(!a.id().is_invalid());
    }

    #[test]
    fn id_depends_on_every_field() {
        let base = Transaction::builder()
            .input(TransactionInput::generation())
            .output(TransactionOutput::pay_to(address(1), 50))
            .build()
            .unwrap();
        let other_amount = Transaction::builder()
            .input(TransactionInput::generation())
            .output(TransactionOutput::pay_to(address(1), 51))
            .build()
            .unwrap();
        let other_address = Transaction::builder()
            .input(TransactionInput::generation())
            .output(TransactionOutput::pay_to(address(2), 50))
            .build()
            .unwrap();
        let other_input = Transaction::builder()
            .input(TransactionInput::spend(base.id(), 0))
            .output(TransactionOutput::pay_to(address(1), 50))
            .build()
            .unwrap();

        assert_ne!(base.id(), other_amount.id());
        assert_ne!(base.id(), other_address.id());
        assert_ne!(base.id(), other_input.id());
    }

    #[test]
    fn rejects_missing_outputs() {
        let err = Transaction::builder()
            .input(TransactionInput::generation())
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::NoOutputs);
    }

    #[test]
    fn rejects_negative_amount() {
        let err = Transaction::builder()
            .output(TransactionOutput::pay_to(address(1), 10))
            .output(TransactionOutput::pay_to(address(2), -1))
            .build()
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::NegativeAmount {
                index: 1,
                amount: -1
            }
        );
    }

    #[test]
    fn rejects_overflowing_sum() {
        let err = Transaction::builder()
            .output(TransactionOutput::pay_to(address(1), i64::MAX))
            .output(TransactionOutput::pay_to(address(2), 1))
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::AmountOverflow);
    }

    #[test]
    fn zero_value_outputs_are_allowed() {
        let tx = Transaction::builder()
            .input(TransactionInput::generation())
            .output(TransactionOutput::pay_to(address(3), 0))
            .build()
            .unwrap();
        assert_eq!(tx.total_output(), 0);
        assert!(tx.is_generation());
    }

    #[test]
    fn decoding_recomputes_the_id() {
        let tx = Transaction::builder()
            .input(TransactionInput::generation())
            .output(TransactionOutput::pay_to(address(4), 7))
            .build()
            .unwrap();

        let bytes = bincode::serde::encode_to_vec(&tx, bincode::config::standard()).unwrap();
        let (decoded, _): (Transaction, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();

        assert_eq!(decoded, tx);
        assert_eq!(decoded.id(), tx.id());
    }

    #[test]
    fn ids_and_addresses_parse_from_hex() {
        let tx = Transaction::builder()
            .output(TransactionOutput::pay_to(address(5), 1))
            .build()
            .unwrap();
        let parsed: TransactionId = tx.id().to_string().parse().unwrap();
        assert_eq!(parsed, tx.id());

        let addr = Address::from_public_key(b"some public key");
        let parsed: Address = addr.to_string().parse().unwrap();
        assert_eq!(parsed, addr);

        assert!("abc".parse::<TransactionId>().is_err());
    }
}
