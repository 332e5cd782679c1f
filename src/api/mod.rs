pub mod chain;
pub mod models;
pub mod payroll;

use std::sync::Arc;

use crate::chain::address::Address;
use crate::chain::provider::ReceiptProvider;
use crate::payroll::commit::CommitmentBuilder;
use crate::store::{ChainTxStore, PayrollStore};

/// Chain parameters every handler needs: where runs settle and which token
/// pays them.
#[derive(Debug, Clone)]
pub struct ChainContext {
    pub chain_id: i64,
    pub token: Address,
    pub vault: Address,
}

#[derive(Clone)]
pub struct AppState {
    pub payroll: Arc<dyn PayrollStore>,
    pub chain_txs: Arc<dyn ChainTxStore>,
    pub commitment: Arc<CommitmentBuilder>,
    pub provider: Arc<dyn ReceiptProvider>,
    pub chain: ChainContext,
}
