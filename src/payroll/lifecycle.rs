//! Run and claim state machines, plus the receipt gates that guard the
//! forward transitions requiring on-chain evidence.

use crate::chain::address::Address;
use crate::chain::models::TxReceipt;
use crate::chain::verify;
use crate::error::LifecycleError;
use crate::payroll::merkle;
use crate::payroll::models::{ClaimStatus, PayrollClaim, PayrollRun, RunStatus};

type Result<T> = std::result::Result<T, LifecycleError>;

/// Forward-only run transitions. Everything else is rejected, including
/// self-transitions.
pub fn validate_run_transition(from: RunStatus, to: RunStatus) -> Result<()> {
    let ok = matches!(
        (from, to),
        (RunStatus::Draft, RunStatus::Committed)
            | (RunStatus::Committed, RunStatus::OnchainCreated)
            | (RunStatus::OnchainCreated, RunStatus::Open)
            | (RunStatus::Open, RunStatus::Closed)
    );
    if ok {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

pub fn validate_claim_transition(from: ClaimStatus, to: ClaimStatus) -> Result<()> {
    if from == ClaimStatus::Unclaimed && to == ClaimStatus::Claimed {
        Ok(())
    } else {
        Err(LifecycleError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

fn stored_address(s: &str, what: &str) -> Result<Address> {
    s.parse()
        .map_err(|_| LifecycleError::EventMismatch(format!("Stored {} is malformed: {}", what, s)))
}

fn stored_root(run: &PayrollRun) -> Result<merkle::Hash32> {
    merkle::from_hex(&run.merkle_root).ok_or_else(|| {
        LifecycleError::EventMismatch(format!("Run has no valid commitment root: {:?}", run.merkle_root))
    })
}

/// Gate for Committed -> OnchainCreated: the creation receipt must have
/// succeeded and carry a `PayrollCreated` event whose payroll id, token,
/// root and recipient count all match the run.
pub fn check_creation(run: &PayrollRun, receipt: &TxReceipt) -> Result<()> {
    if !receipt.success {
        return Err(LifecycleError::EventMismatch(
            "Creation transaction reverted".to_string(),
        ));
    }
    let vault = stored_address(&run.vault, "vault")?;
    let token = stored_address(&run.token, "token")?;
    let root = stored_root(run)?;

    if verify::has_payroll_created(
        receipt,
        &vault,
        run.payroll_id as u64,
        &token,
        &root,
        run.total as u64,
    ) {
        Ok(())
    } else {
        Err(LifecycleError::EventMismatch(format!(
            "No PayrollCreated event for payroll {} in creation receipt",
            run.payroll_id
        )))
    }
}

/// Gate for OnchainCreated -> Open: the funding receipt must have succeeded
/// and carry a confidential transfer whose destination is the vault.
pub fn check_funding(run: &PayrollRun, receipt: &TxReceipt) -> Result<()> {
    if !receipt.success {
        return Err(LifecycleError::EventMismatch(
            "Funding transaction reverted".to_string(),
        ));
    }
    let vault = stored_address(&run.vault, "vault")?;
    let token = stored_address(&run.token, "token")?;

    if verify::has_private_transfer_to_vault(receipt, &token, &vault) {
        Ok(())
    } else {
        Err(LifecycleError::EventMismatch(
            "No confidential transfer into the vault in funding receipt".to_string(),
        ))
    }
}

/// Gate for flipping a claim to Claimed: the receipt must carry a `Claimed`
/// event matching (payroll id, leaf index, employee).
pub fn check_claim(run: &PayrollRun, claim: &PayrollClaim, receipt: &TxReceipt) -> Result<()> {
    if !receipt.success {
        return Err(LifecycleError::EventMismatch(
            "Claim transaction reverted".to_string(),
        ));
    }
    let vault = stored_address(&run.vault, "vault")?;
    let employee = stored_address(&claim.employee_wallet, "employee wallet")?;

    if verify::has_claimed(
        receipt,
        &vault,
        run.payroll_id as u64,
        claim.index as u32,
        &employee,
    ) {
        Ok(())
    } else {
        Err(LifecycleError::EventMismatch(format!(
            "No Claimed event for index {} of payroll {}",
            claim.index, run.payroll_id
        )))
    }
}
