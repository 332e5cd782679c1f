//! Builds a run's Merkle commitment from employer-supplied ciphertexts and
//! applies it atomically.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, AppResult, CommitError};
use crate::payroll::merkle;
use crate::payroll::models::{PayrollClaim, PayrollRun, RunStatus};
use crate::store::{ClaimCommitment, PayrollStore};

/// One recipient's payload: the encrypted net amount and the 32-byte
/// reference into the employer's off-chain record.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitItem {
    pub wallet: String,
    pub net_ciphertext_b64: String,
    pub encrypted_ref: String,
}

pub struct CommitmentBuilder {
    store: Arc<dyn PayrollStore>,
}

impl CommitmentBuilder {
    pub fn new(store: Arc<dyn PayrollStore>) -> Self {
        Self { store }
    }

    /// Validate the payload against the run's claim set, compute the leaf
    /// hashes, tree and per-claim proofs, and flip the run to Committed in
    /// one storage transaction. Nothing is persisted on any failure.
    pub async fn commit(&self, run_id: Uuid, items: Vec<CommitItem>) -> AppResult<PayrollRun> {
        let run = self
            .store
            .run(run_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Run {}", run_id)))?;
        if run.status != RunStatus::Draft {
            return Err(CommitError::InvalidRunState {
                current: run.status.to_string(),
                expected: RunStatus::Draft.to_string(),
            }
            .into());
        }

        let claims = self.store.claims_for_run(run_id).await?;
        let matched = match_items(&claims, items)?;

        let token = run
            .token
            .parse()
            .map_err(|_| AppError::Internal(format!("Run {} has a malformed token", run_id)))?;

        // leaves in index order, which is also the claims' storage order
        let mut leaves = Vec::with_capacity(claims.len());
        for (claim, item) in &matched {
            let employee = claim
                .employee_wallet
                .parse()
                .map_err(|_| AppError::Internal(format!("Claim {} has a malformed wallet", claim.id)))?;
            let ciphertext = BASE64.decode(&item.net_ciphertext_b64).map_err(|_| {
                AppError::InvalidInput(format!(
                    "Ciphertext for {} is not valid base64",
                    item.wallet
                ))
            })?;
            let encrypted_ref = merkle::parse_encrypted_ref(&item.encrypted_ref)?;

            leaves.push(merkle::leaf_hash(
                run.payroll_id as u64,
                claim.index as u32,
                &employee,
                &token,
                &ciphertext,
                &encrypted_ref,
            ));
        }

        let tree = merkle::build_tree(&leaves)?;
        let root = merkle::root(&tree);

        let mut commitments = Vec::with_capacity(matched.len());
        for (i, (claim, item)) in matched.iter().enumerate() {
            let proof = merkle::proof(&tree, i)?;
            commitments.push(ClaimCommitment {
                claim_id: claim.id,
                net_ciphertext_b64: item.net_ciphertext_b64.clone(),
                encrypted_ref: item.encrypted_ref.clone(),
                leaf: merkle::to_hex(&leaves[i]),
                proof: proof.iter().map(merkle::to_hex).collect(),
            });
        }

        let committed = self
            .store
            .apply_commitment(run_id, &merkle::to_hex(&root), run.total_amount_units, commitments)
            .await?;
        info!(
            run_id = %run_id,
            payroll_id = run.payroll_id,
            root = %committed.merkle_root,
            "✓ Run committed"
        );
        Ok(committed)
    }
}

/// Pair every claim with exactly one payload item, by wallet. The payload
/// must cover the claim set exactly.
fn match_items(
    claims: &[PayrollClaim],
    items: Vec<CommitItem>,
) -> Result<Vec<(PayrollClaim, CommitItem)>, AppError> {
    let mut by_wallet: HashMap<String, CommitItem> = HashMap::with_capacity(items.len());
    for item in items {
        if by_wallet.insert(item.wallet.to_lowercase(), item.clone()).is_some() {
            return Err(AppError::InvalidInput(format!(
                "Duplicate recipient in commitment payload: {}",
                item.wallet
            )));
        }
    }

    // a wallet outside the run is reported before any count mismatch
    for item in by_wallet.values() {
        let known = claims
            .iter()
            .any(|c| c.employee_wallet.eq_ignore_ascii_case(&item.wallet));
        if !known {
            return Err(CommitError::UnknownRecipient(item.wallet.clone()).into());
        }
    }

    if by_wallet.len() != claims.len() {
        return Err(CommitError::IncompleteCommitment {
            expected: claims.len(),
            got: by_wallet.len(),
        }
        .into());
    }

    let mut matched = Vec::with_capacity(claims.len());
    for claim in claims {
        let item = by_wallet
            .remove(&claim.employee_wallet.to_lowercase())
            .ok_or_else(|| CommitError::IncompleteCommitment {
                expected: claims.len(),
                got: claims.len() - 1,
            })?;
        if item.net_ciphertext_b64.is_empty() {
            return Err(CommitError::MissingCiphertext(claim.employee_wallet.clone()).into());
        }
        matched.push((claim.clone(), item));
    }
    Ok(matched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::address::Address;
    use crate::payroll::models::{ClaimStatus, Employee, ZERO_REF};
    use crate::payroll::scheduler::build_draft_claims;
    use crate::store::MemoryStore;
    use chrono::Utc;

    fn addr(n: u8) -> Address {
        Address::from([n; 20])
    }

    async fn seed_draft_run(store: &MemoryStore, salaries: &[i64]) -> PayrollRun {
        let employer = Uuid::new_v4();
        let employees: Vec<Employee> = salaries
            .iter()
            .enumerate()
            .map(|(i, s)| Employee {
                id: Uuid::new_v4(),
                employer_id: employer,
                wallet: addr(0x10 + i as u8).to_checksum(),
                salary_units: *s,
                active: true,
                created_at: Utc::now(),
            })
            .collect();

        let run_id = Uuid::new_v4();
        let claims = build_draft_claims(run_id, &employees);
        let run = PayrollRun {
            id: run_id,
            employer_id: employer,
            schedule_id: None,
            run_nonce: None,
            payroll_id: 42,
            token: addr(0xbb).to_checksum(),
            vault: addr(0xaa).to_checksum(),
            merkle_root: String::new(),
            total: claims.len() as i32,
            total_amount_units: salaries.iter().sum(),
            status: RunStatus::Draft,
            create_tx_hash: String::new(),
            fund_tx_hash: String::new(),
            claim_window_days: 14,
            close_at: None,
            created_at: Utc::now(),
        };
        store.insert_run(run.clone(), claims).await.unwrap();
        run
    }

    fn item_for(wallet: &str, seed: u8) -> CommitItem {
        CommitItem {
            wallet: wallet.to_string(),
            net_ciphertext_b64: BASE64.encode(vec![seed; 48]),
            encrypted_ref: format!("0x{}", hex::encode([seed; 32])),
        }
    }

    #[tokio::test]
    async fn commit_builds_a_verifiable_tree() {
        let store = Arc::new(MemoryStore::new());
        let run = seed_draft_run(&store, &[100, 200, 300]).await;
        let claims = store.claims_for_run(run.id).await.unwrap();

        let items: Vec<CommitItem> = claims
            .iter()
            .map(|c| item_for(&c.employee_wallet, c.index as u8 + 1))
            .collect();

        let committed = CommitmentBuilder::new(store.clone())
            .commit(run.id, items)
            .await
            .unwrap();
        assert_eq!(committed.status, RunStatus::Committed);
        let root = merkle::from_hex(&committed.merkle_root).unwrap();

        // every stored proof recomputes the stored root
        let claims = store.claims_for_run(run.id).await.unwrap();
        for claim in &claims {
            assert_eq!(claim.status, ClaimStatus::Unclaimed);
            assert_ne!(claim.encrypted_ref, ZERO_REF);
            let leaf = merkle::from_hex(&claim.leaf).unwrap();
            let proof: Vec<_> = claim
                .proof
                .iter()
                .map(|p| merkle::from_hex(p).unwrap())
                .collect();
            assert!(merkle::verify_proof(&leaf, claim.index as usize, &proof, &root));
        }

        // independently recomputed root agrees
        let token: Address = committed.token.parse().unwrap();
        let leaves: Vec<_> = claims
            .iter()
            .map(|c| {
                let employee: Address = c.employee_wallet.parse().unwrap();
                merkle::leaf_hash(
                    committed.payroll_id as u64,
                    c.index as u32,
                    &employee,
                    &token,
                    &BASE64.decode(&c.net_ciphertext_b64).unwrap(),
                    &merkle::parse_encrypted_ref(&c.encrypted_ref).unwrap(),
                )
            })
            .collect();
        let tree = merkle::build_tree(&leaves).unwrap();
        assert_eq!(merkle::root(&tree), root);
    }

    #[tokio::test]
    async fn incomplete_payload_leaves_the_run_untouched() {
        let store = Arc::new(MemoryStore::new());
        let run = seed_draft_run(&store, &[100, 200, 300]).await;
        let claims = store.claims_for_run(run.id).await.unwrap();

        let items = vec![item_for(&claims[0].employee_wallet, 1)];
        let err = CommitmentBuilder::new(store.clone())
            .commit(run.id, items)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::Commit(CommitError::IncompleteCommitment { expected: 3, got: 1 })
        ));

        let run = store.run(run.id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Draft);
        assert!(run.merkle_root.is_empty());
    }

    #[tokio::test]
    async fn unknown_recipient_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let run = seed_draft_run(&store, &[100, 200]).await;
        let claims = store.claims_for_run(run.id).await.unwrap();

        let items = vec![
            item_for(&claims[0].employee_wallet, 1),
            item_for(&addr(0xee).to_checksum(), 2),
        ];
        let err = CommitmentBuilder::new(store.clone())
            .commit(run.id, items)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Commit(CommitError::UnknownRecipient(_))));
    }

    #[tokio::test]
    async fn missing_ciphertext_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let run = seed_draft_run(&store, &[100]).await;
        let claims = store.claims_for_run(run.id).await.unwrap();

        let mut item = item_for(&claims[0].employee_wallet, 1);
        item.net_ciphertext_b64 = String::new();
        let err = CommitmentBuilder::new(store.clone())
            .commit(run.id, vec![item])
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Commit(CommitError::MissingCiphertext(_))));
    }

    #[tokio::test]
    async fn second_commit_is_an_invalid_state() {
        let store = Arc::new(MemoryStore::new());
        let run = seed_draft_run(&store, &[100]).await;
        let claims = store.claims_for_run(run.id).await.unwrap();
        let builder = CommitmentBuilder::new(store.clone());

        let items = vec![item_for(&claims[0].employee_wallet, 1)];
        builder.commit(run.id, items.clone()).await.unwrap();

        let err = builder.commit(run.id, items).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Commit(CommitError::InvalidRunState { .. })
        ));
    }

    #[tokio::test]
    async fn single_recipient_run_commits_with_empty_proof() {
        let store = Arc::new(MemoryStore::new());
        let run = seed_draft_run(&store, &[500]).await;
        let claims = store.claims_for_run(run.id).await.unwrap();

        let committed = CommitmentBuilder::new(store.clone())
            .commit(run.id, vec![item_for(&claims[0].employee_wallet, 9)])
            .await
            .unwrap();

        let claims = store.claims_for_run(run.id).await.unwrap();
        assert!(claims[0].proof.is_empty());
        assert_eq!(claims[0].leaf, committed.merkle_root);
    }
}
