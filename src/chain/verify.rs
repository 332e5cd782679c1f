//! Receipt-log verification against the PayrollVault and confidential
//! token event signatures.
//!
//! Every check is a pure boolean: logs that fail to parse or belong to a
//! different contract/event are skipped, and an absent receipt is simply a
//! negative result. Callers decide whether a negative means retry or
//! reject.

use sha3::{Digest, Keccak256};

use crate::chain::address::Address;
use crate::chain::models::{LogEntry, TxReceipt};
use crate::payroll::merkle::Hash32;

fn event_topic(signature: &str) -> Hash32 {
    Keccak256::digest(signature.as_bytes()).into()
}

/// `PayrollCreated(uint256 indexed payrollId, address token, bytes32 root,
/// uint256 total)` emitted by the vault.
pub(crate) fn payroll_created_topic() -> Hash32 {
    event_topic("PayrollCreated(uint256,address,bytes32,uint256)")
}

/// `Claimed(uint256 indexed payrollId, uint32 indexed index, address
/// indexed employee, bytes32 leaf, bytes32 netHandle)` emitted by the vault.
pub(crate) fn claimed_topic() -> Hash32 {
    event_topic("Claimed(uint256,uint32,address,bytes32,bytes32)")
}

/// `TransferPrivate(address indexed from, address indexed to, bytes32
/// handle)` emitted by the confidential token; the amount stays an opaque
/// ciphertext handle.
pub(crate) fn transfer_private_topic() -> Hash32 {
    event_topic("TransferPrivate(address,address,bytes32)")
}

fn word(data: &[u8], i: usize) -> Option<&[u8]> {
    data.get(i * 32..(i + 1) * 32)
}

/// Decode a 32-byte ABI word as a u64 quantity; values above u64 range
/// fail the match rather than wrapping.
fn word_as_u64(w: &[u8]) -> Option<u64> {
    if w[..24].iter().any(|b| *b != 0) {
        return None;
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&w[24..]);
    Some(u64::from_be_bytes(buf))
}

/// Decode a left-padded 32-byte ABI word as an address.
fn word_as_address(w: &[u8]) -> Option<Address> {
    if w[..12].iter().any(|b| *b != 0) {
        return None;
    }
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&w[12..]);
    Some(Address::from(bytes))
}

fn topic_as_u64(log: &LogEntry, i: usize) -> Option<u64> {
    log.topics.get(i).and_then(|t| word_as_u64(t))
}

fn topic_as_address(log: &LogEntry, i: usize) -> Option<Address> {
    log.topics.get(i).and_then(|t| word_as_address(t))
}

/// True when the receipt contains a `PayrollCreated` event from `vault`
/// whose (payrollId, token, root, total) all match.
pub fn has_payroll_created(
    receipt: &TxReceipt,
    vault: &Address,
    payroll_id: u64,
    token: &Address,
    root: &Hash32,
    total: u64,
) -> bool {
    let topic0 = payroll_created_topic();

    receipt.logs.iter().any(|log| {
        if log.address != *vault || log.topics.first() != Some(&topic0) {
            return false;
        }
        let Some(got_pid) = topic_as_u64(log, 1) else {
            return false;
        };
        let (Some(got_token), Some(got_root), Some(got_total)) = (
            word(&log.data, 0).and_then(word_as_address),
            word(&log.data, 1),
            word(&log.data, 2).and_then(word_as_u64),
        ) else {
            return false;
        };
        got_pid == payroll_id
            && got_token == *token
            && got_root == root.as_slice()
            && got_total == total
    })
}

/// True when the receipt contains a `TransferPrivate` on `token` whose
/// destination is the payout vault.
pub fn has_private_transfer_to_vault(
    receipt: &TxReceipt,
    token: &Address,
    vault: &Address,
) -> bool {
    let topic0 = transfer_private_topic();

    receipt.logs.iter().any(|log| {
        log.address == *token
            && log.topics.first() == Some(&topic0)
            && topic_as_address(log, 2) == Some(*vault)
    })
}

/// True when the receipt contains a `Claimed` event from `vault` for the
/// given (payrollId, index, employee).
pub fn has_claimed(
    receipt: &TxReceipt,
    vault: &Address,
    payroll_id: u64,
    index: u32,
    employee: &Address,
) -> bool {
    let topic0 = claimed_topic();

    receipt.logs.iter().any(|log| {
        log.address == *vault
            && log.topics.first() == Some(&topic0)
            && topic_as_u64(log, 1) == Some(payroll_id)
            && topic_as_u64(log, 2) == Some(index as u64)
            && topic_as_address(log, 3) == Some(*employee)
    })
}
