//! Domain-separated struct hashing and signature recovery.
//!
//! Every signed path in the crate goes through this module: build the struct
//! hash with `SolStruct::eip712_hash_struct`, combine it with the verifying
//! contract's domain separator via [`signing_digest`], and recover the
//! signer with [`recover_signer`]. Domain version is fixed at "1".

use alloy::primitives::{keccak256, Address, Signature, B256, U256};

const EIP712_DOMAIN_TYPEHASH_INPUT: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";

/// Domain separator binding a schema to one contract on one chain.
pub fn domain_separator(name: &str, chain_id: u64, verifying_contract: Address) -> B256 {
    let mut data = Vec::with_capacity(160);
    data.extend_from_slice(keccak256(EIP712_DOMAIN_TYPEHASH_INPUT).as_slice());
    data.extend_from_slice(keccak256(name.as_bytes()).as_slice());
    data.extend_from_slice(keccak256(b"1").as_slice());
    data.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    let mut contract_word = [0u8; 32];
    contract_word[12..].copy_from_slice(verifying_contract.as_slice());
    data.extend_from_slice(&contract_word);
    keccak256(&data)
}

/// EIP-191 digest: `0x19 0x01 || domainSeparator || structHash`.
pub fn signing_digest(domain_separator: B256, struct_hash: B256) -> B256 {
    let mut data = [0u8; 66];
    data[0] = 0x19;
    data[1] = 0x01;
    data[2..34].copy_from_slice(domain_separator.as_slice());
    data[34..66].copy_from_slice(struct_hash.as_slice());
    keccak256(data)
}

/// Recover the signer of a 65-byte `r || s || v` signature over `digest`.
/// Returns `None` on malformed input or failed recovery; callers map that to
/// their interface's `InvalidSignature`.
pub fn recover_signer(digest: &B256, signature: &[u8]) -> Option<Address> {
    if signature.len() != 65 {
        return None;
    }
    let sig = Signature::try_from(signature).ok()?;
    sig.recover_address_from_prehash(digest).ok()
}
