//! Single-payment transaction envelopes in the ledger's XDR wire format.
//!
//! Every transaction built here carries exactly one native-asset payment
//! operation. Layout of the transaction body (all integers big-endian, XDR
//! four-byte aligned):
//!
//! ```text
//! ┌───────────────┬──────────┬───────────────────────────────────────┐
//! │ source        │ 36 bytes │ key type (0 = ed25519) + public key   │
//! │ fee           │ 4 bytes  │ total fee in stroops                  │
//! │ sequence      │ 8 bytes  │ account sequence + 1                  │
//! │ preconditions │ 20 bytes │ type 1 (time bounds) + min + max      │
//! │ memo          │ 4 bytes  │ 0 = none                              │
//! │ op count      │ 4 bytes  │ always 1                              │
//! │ operation     │ 56 bytes │ no source, PAYMENT, dest, native, amt │
//! │ ext           │ 4 bytes  │ 0                                     │
//! └───────────────┴──────────┴───────────────────────────────────────┘
//! ```
//!
//! The signature covers `sha256(network_id || ENVELOPE_TYPE_TX || body)`.

use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use crate::{
    address::AccountAddress,
    keys::Keypair,
    model::{Amount, TransferPlan},
};

const ENVELOPE_TYPE_TX: u32 = 2;
const KEY_TYPE_ED25519: u32 = 0;
const PRECOND_TIME: u32 = 1;
const MEMO_NONE: u32 = 0;
const OPERATION_PAYMENT: u32 = 1;
const ASSET_TYPE_NATIVE: u32 = 0;

/// Encoded size of a single-payment transaction body.
pub const PAYMENT_TX_BODY_LEN: usize = 136;

/// `sha256(passphrase)`, mixed into every signature payload.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NetworkId([u8; 32]);

impl NetworkId {
    pub fn from_passphrase(passphrase: &str) -> Self {
        Self(Sha256::digest(passphrase.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for NetworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NetworkId({})", hex::encode(self.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBounds {
    pub min_time: u64,
    pub max_time: u64,
}

/// Unsigned transaction moving `amount` from `source` to `destination`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentTransaction {
    source: AccountAddress,
    destination: AccountAddress,
    amount: Amount,
    fee: u32,
    sequence: i64,
    time_bounds: TimeBounds,
}

impl PaymentTransaction {
    /// Builds the transaction for `plan`, consuming the next sequence number
    /// after `current_sequence` and expiring `plan.timeout_seconds` after `now`.
    pub fn from_plan(
        source: &AccountAddress,
        current_sequence: i64,
        plan: &TransferPlan,
        now_unix: u64,
    ) -> Self {
        Self {
            source: source.clone(),
            destination: plan.destination.clone(),
            amount: plan.amount,
            fee: plan.fee,
            sequence: current_sequence.saturating_add(1),
            time_bounds: TimeBounds {
                min_time: 0,
                max_time: now_unix.saturating_add(plan.timeout_seconds),
            },
        }
    }

    pub fn source(&self) -> &AccountAddress {
        &self.source
    }

    pub fn destination(&self) -> &AccountAddress {
        &self.destination
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn fee(&self) -> u32 {
        self.fee
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn time_bounds(&self) -> TimeBounds {
        self.time_bounds
    }

    pub fn operation_count(&self) -> usize {
        1
    }

    pub fn to_xdr(&self) -> Vec<u8> {
        let mut out = XdrWriter::with_capacity(PAYMENT_TX_BODY_LEN);
        out.account(&self.source);
        out.u32(self.fee);
        out.i64(self.sequence);

        out.u32(PRECOND_TIME);
        out.u64(self.time_bounds.min_time);
        out.u64(self.time_bounds.max_time);

        out.u32(MEMO_NONE);

        out.u32(self.operation_count() as u32);
        out.u32(0); // operation source account absent
        out.u32(OPERATION_PAYMENT);
        out.account(&self.destination);
        out.u32(ASSET_TYPE_NATIVE);
        out.i64(self.amount.stroops());

        out.u32(0); // ext
        out.finish()
    }

    /// Hash the ledger uses to identify the transaction on `network`.
    pub fn hash(&self, network: &NetworkId) -> [u8; 32] {
        let mut payload = XdrWriter::with_capacity(36 + PAYMENT_TX_BODY_LEN);
        payload.fixed(network.as_bytes());
        payload.u32(ENVELOPE_TYPE_TX);
        payload.fixed(&self.to_xdr());
        Sha256::digest(payload.finish()).into()
    }

    pub fn sign(self, keypair: &Keypair, network: &NetworkId) -> SignedTransaction {
        let hash = self.hash(network);
        let signature = keypair.sign(&hash);

        let mut envelope = XdrWriter::with_capacity(4 + PAYMENT_TX_BODY_LEN + 4 + 72);
        envelope.u32(ENVELOPE_TYPE_TX);
        envelope.fixed(&self.to_xdr());
        envelope.u32(1);
        envelope.fixed(&keypair.signature_hint());
        envelope.var_opaque(&signature);

        SignedTransaction {
            transaction: self,
            hash,
            envelope_xdr: STANDARD.encode(envelope.finish()),
        }
    }
}

/// Signed envelope ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    transaction: PaymentTransaction,
    hash: [u8; 32],
    envelope_xdr: String,
}

impl SignedTransaction {
    pub fn transaction(&self) -> &PaymentTransaction {
        &self.transaction
    }

    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }

    /// Base64 envelope as accepted by the submission endpoint.
    pub fn envelope_xdr(&self) -> &str {
        &self.envelope_xdr
    }
}

struct XdrWriter {
    buf: Vec<u8>,
}

impl XdrWriter {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    fn i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Fixed-length opaque; callers only pass multiples of four.
    fn fixed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    fn var_opaque(&mut self, bytes: &[u8]) {
        self.u32(bytes.len() as u32);
        self.buf.extend_from_slice(bytes);
        let padding = (4 - bytes.len() % 4) % 4;
        self.buf.extend(std::iter::repeat(0u8).take(padding));
    }

    fn account(&mut self, address: &AccountAddress) {
        self.u32(KEY_TYPE_ED25519);
        self.fixed(address.as_bytes());
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}
