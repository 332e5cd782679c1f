use sha3::{Digest, Keccak256};

use crate::chain::address::Address;
use crate::error::MerkleError;

pub type Hash32 = [u8; 32];

fn keccak256(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Leaf hash for one claim, byte-for-byte compatible with the on-chain
/// verifier. The preimage is the tightly packed tuple
/// `(payroll_id: u256 BE, index: u32 BE, employee, token,
///   keccak256(ciphertext), encrypted_ref)` with no padding between fields.
pub fn leaf_hash(
    payroll_id: u64,
    index: u32,
    employee: &Address,
    token: &Address,
    ciphertext: &[u8],
    encrypted_ref: &Hash32,
) -> Hash32 {
    let ciphertext_hash = keccak256(ciphertext);

    let mut packed = Vec::with_capacity(32 + 4 + 20 + 20 + 32 + 32);
    let mut pid = [0u8; 32];
    pid[24..].copy_from_slice(&payroll_id.to_be_bytes());
    packed.extend_from_slice(&pid);
    packed.extend_from_slice(&index.to_be_bytes());
    packed.extend_from_slice(employee.as_bytes());
    packed.extend_from_slice(token.as_bytes());
    packed.extend_from_slice(&ciphertext_hash);
    packed.extend_from_slice(encrypted_ref);

    keccak256(&packed)
}

/// Parse a `0x`-prefixed bytes32 hex string (the encrypted reference as it
/// arrives over the API and lives in storage).
pub fn parse_encrypted_ref(hex_str: &str) -> Result<Hash32, MerkleError> {
    let stripped = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    let raw = hex::decode(stripped).map_err(|_| MerkleError::InvalidEncryptedRef(0))?;
    if raw.len() != 32 {
        return Err(MerkleError::InvalidEncryptedRef(raw.len()));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&raw);
    Ok(out)
}

fn parent(left: &Hash32, right: &Hash32) -> Hash32 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left);
    buf[32..].copy_from_slice(right);
    keccak256(&buf)
}

/// Binary hash tree over an ordered list of leaves. Level 0 is the leaves
/// unchanged; the last node of an odd-length level is paired with itself.
/// A single leaf yields a degenerate tree whose root is that leaf.
pub fn build_tree(leaves: &[Hash32]) -> Result<Vec<Vec<Hash32>>, MerkleError> {
    if leaves.is_empty() {
        return Err(MerkleError::EmptyInput);
    }

    let mut tree = vec![leaves.to_vec()];
    while tree.last().map(Vec::len) != Some(1) {
        let level = tree.last().expect("tree has at least one level");
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let left = &pair[0];
            let right = pair.get(1).unwrap_or(left);
            next.push(parent(left, right));
        }
        tree.push(next);
    }
    Ok(tree)
}

pub fn root(tree: &[Vec<Hash32>]) -> Hash32 {
    tree.last().expect("non-empty tree")[0]
}

/// Sibling path from the leaf level up to (excluding) the root. At each
/// level the sibling is `i ^ 1`; when that falls off the end the node is
/// its own sibling, mirroring the self-pairing rule in `build_tree`.
pub fn proof(tree: &[Vec<Hash32>], index: usize) -> Result<Vec<Hash32>, MerkleError> {
    let total = tree[0].len();
    if index >= total {
        return Err(MerkleError::IndexOutOfRange { index, total });
    }

    let mut path = Vec::with_capacity(tree.len().saturating_sub(1));
    let mut idx = index;
    for level in &tree[..tree.len() - 1] {
        let sibling = idx ^ 1;
        path.push(if sibling < level.len() {
            level[sibling]
        } else {
            level[idx]
        });
        idx /= 2;
    }
    Ok(path)
}

/// Recompute the root from a leaf and its sibling path. Even indices sit on
/// the left of their pair.
pub fn verify_proof(leaf: &Hash32, index: usize, path: &[Hash32], expected_root: &Hash32) -> bool {
    let mut node = *leaf;
    let mut idx = index;
    for sibling in path {
        node = if idx % 2 == 0 {
            parent(&node, sibling)
        } else {
            parent(sibling, &node)
        };
        idx /= 2;
    }
    &node == expected_root
}

pub fn to_hex(hash: &Hash32) -> String {
    format!("0x{}", hex::encode(hash))
}

pub fn from_hex(s: &str) -> Option<Hash32> {
    let stripped = s.strip_prefix("0x")?;
    let raw = hex::decode(stripped).ok()?;
    let mut out = [0u8; 32];
    if raw.len() != 32 {
        return None;
    }
    out.copy_from_slice(&raw);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> Address {
        Address::from([n; 20])
    }

    fn leaves(n: usize) -> Vec<Hash32> {
        (0..n)
            .map(|i| keccak256(format!("leaf-{}", i).as_bytes()))
            .collect()
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(build_tree(&[]).unwrap_err(), MerkleError::EmptyInput);
    }

    #[test]
    fn single_leaf_root_is_the_leaf() {
        let ls = leaves(1);
        let tree = build_tree(&ls).unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(root(&tree), ls[0]);
        assert!(proof(&tree, 0).unwrap().is_empty());
    }

    #[test]
    fn odd_level_self_pairs_its_last_node() {
        let ls = leaves(3);
        let tree = build_tree(&ls).unwrap();
        // level 1 has two nodes, the second built from leaf 2 paired with itself
        assert_eq!(tree[1].len(), 2);
        assert_eq!(tree[1][1], parent(&ls[2], &ls[2]));
        assert_eq!(root(&tree), parent(&tree[1][0], &tree[1][1]));
    }

    #[test]
    fn every_proof_recomputes_the_root() {
        for n in [1usize, 2, 3, 4, 5, 7, 8, 13] {
            let ls = leaves(n);
            let tree = build_tree(&ls).unwrap();
            let r = root(&tree);
            for (i, leaf) in ls.iter().enumerate() {
                let path = proof(&tree, i).unwrap();
                assert!(verify_proof(leaf, i, &path, &r), "n={} i={}", n, i);
            }
        }
    }

    #[test]
    fn tampered_proof_fails_verification() {
        let ls = leaves(4);
        let tree = build_tree(&ls).unwrap();
        let r = root(&tree);
        let mut path = proof(&tree, 1).unwrap();
        path[0][0] ^= 0xff;
        assert!(!verify_proof(&ls[1], 1, &path, &r));
    }

    #[test]
    fn proof_index_out_of_range() {
        let tree = build_tree(&leaves(2)).unwrap();
        assert!(matches!(
            proof(&tree, 2),
            Err(MerkleError::IndexOutOfRange { index: 2, total: 2 })
        ));
    }

    #[test]
    fn leaf_hash_packs_the_documented_tuple() {
        let employee = addr(0x11);
        let token = addr(0x22);
        let ciphertext = b"ciphertext bytes";
        let enc_ref = [0x33u8; 32];

        let got = leaf_hash(7, 2, &employee, &token, ciphertext, &enc_ref);

        let mut packed = Vec::new();
        let mut pid = [0u8; 32];
        pid[31] = 7;
        packed.extend_from_slice(&pid);
        packed.extend_from_slice(&[0, 0, 0, 2]);
        packed.extend_from_slice(&[0x11u8; 20]);
        packed.extend_from_slice(&[0x22u8; 20]);
        packed.extend_from_slice(&keccak256(ciphertext));
        packed.extend_from_slice(&enc_ref);
        assert_eq!(packed.len(), 140);
        assert_eq!(got, keccak256(&packed));
    }

    #[test]
    fn leaf_hash_depends_on_every_field() {
        let base = leaf_hash(1, 0, &addr(1), &addr(2), b"ct", &[0u8; 32]);
        assert_ne!(base, leaf_hash(2, 0, &addr(1), &addr(2), b"ct", &[0u8; 32]));
        assert_ne!(base, leaf_hash(1, 1, &addr(1), &addr(2), b"ct", &[0u8; 32]));
        assert_ne!(base, leaf_hash(1, 0, &addr(3), &addr(2), b"ct", &[0u8; 32]));
        assert_ne!(base, leaf_hash(1, 0, &addr(1), &addr(3), b"ct", &[0u8; 32]));
        assert_ne!(base, leaf_hash(1, 0, &addr(1), &addr(2), b"other", &[0u8; 32]));
        assert_ne!(base, leaf_hash(1, 0, &addr(1), &addr(2), b"ct", &[1u8; 32]));
    }

    #[test]
    fn encrypted_ref_must_be_32_bytes() {
        assert!(parse_encrypted_ref(&format!("0x{}", "00".repeat(32))).is_ok());
        assert_eq!(
            parse_encrypted_ref(&format!("0x{}", "00".repeat(31))),
            Err(MerkleError::InvalidEncryptedRef(31))
        );
        assert!(parse_encrypted_ref("0xzz").is_err());
    }
}
