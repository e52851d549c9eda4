//! Session key registry: time- and scope-limited delegated signing.

use alloy::{
    primitives::{keccak256, Address, FixedBytes, IntoLogData, B256, U256},
    sol_types::SolStruct,
};
use patron_contracts::{
    ISessionKeyRegistry, RegisterSessionKey, SessionKeyRegistryError, SessionKeyRegistryEvent,
    SessionOperation, MAX_SESSION_DURATION_SECS, SESSION_KEY_REGISTRY_ADDRESS,
};

use crate::{
    eip712, nonces,
    storage::{
        slots::{address_to_word, double_mapping_slot, mapping_slot, to_u256, word_to_address},
        StorageProvider,
    },
    Result,
};

mod slots {
    use alloy::primitives::U256;

    use crate::storage::slots::to_u256;

    // grants[owner][sessionKey] -> grant record (see layout below)
    pub(super) const GRANTS: U256 = to_u256(0);
    // registrationNonces[owner] -> u64
    pub(super) const REG_NONCES: U256 = to_u256(1);
}

// Grant record layout, relative to the grant's base slot:
// +0  packed header: validAfter (u64) | validUntil (u64) | usage nonce (u64)
//     | selector count (u32)
// +1  allowedContract
// +2  spendingLimit
// +3  spent
// +4+i  allowedSelectors[i], left-aligned bytes4
const HEADER_OFFSET: u64 = 0;
const CONTRACT_OFFSET: u64 = 1;
const LIMIT_OFFSET: u64 = 2;
const SPENT_OFFSET: u64 = 3;
const SELECTORS_OFFSET: u64 = 4;

/// Packed fixed-width portion of a grant. A grant exists iff
/// `valid_until != 0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GrantHeader {
    valid_after: u64,
    valid_until: u64,
    nonce: u64,
    selector_count: u32,
}

impl GrantHeader {
    fn exists(&self) -> bool {
        self.valid_until != 0
    }

    fn encode(self) -> U256 {
        U256::from_limbs([
            self.valid_after,
            self.valid_until,
            self.nonce,
            self.selector_count as u64,
        ])
    }

    fn decode(word: U256) -> Self {
        let limbs = word.as_limbs();
        Self {
            valid_after: limbs[0],
            valid_until: limbs[1],
            nonce: limbs[2],
            selector_count: limbs[3] as u32,
        }
    }
}

fn selector_to_word(selector: FixedBytes<4>) -> U256 {
    let mut bytes = [0u8; 32];
    bytes[..4].copy_from_slice(selector.as_slice());
    U256::from_be_bytes(bytes)
}

fn word_to_selector(word: U256) -> FixedBytes<4> {
    FixedBytes::from_slice(&word.to_be_bytes::<32>()[..4])
}

/// keccak256 of the packed selector list, as committed to by
/// `RegisterSessionKey.allowedSelectorsHash`.
pub fn selectors_hash(selectors: &[FixedBytes<4>]) -> B256 {
    let mut data = Vec::with_capacity(selectors.len() * 4);
    for selector in selectors {
        data.extend_from_slice(selector.as_slice());
    }
    keccak256(&data)
}

/// Session key registry contract.
#[derive(Debug)]
pub struct SessionKeyRegistry<'a, S: StorageProvider> {
    address: Address,
    storage: &'a mut S,
}

impl<'a, S: StorageProvider> SessionKeyRegistry<'a, S> {
    pub fn new(storage: &'a mut S) -> Self {
        Self {
            address: SESSION_KEY_REGISTRY_ADDRESS,
            storage,
        }
    }

    pub fn domain_separator(&mut self) -> B256 {
        eip712::domain_separator("SessionKeyRegistry", self.storage.chain_id(), self.address)
    }

    fn grant_base_slot(owner: Address, session_key: Address) -> U256 {
        double_mapping_slot(owner, session_key, slots::GRANTS)
    }

    fn load_header(&mut self, base: U256) -> GrantHeader {
        GrantHeader::decode(self.storage.sload(self.address, base + to_u256(HEADER_OFFSET)))
    }

    fn store_header(&mut self, base: U256, header: GrantHeader) {
        self.storage
            .sstore(self.address, base + to_u256(HEADER_OFFSET), header.encode());
    }

    /// Register a session key for `msg_sender`'s account.
    pub fn register(
        &mut self,
        msg_sender: Address,
        call: ISessionKeyRegistry::registerCall,
    ) -> Result<()> {
        self.write_grant(
            msg_sender,
            call.sessionKey,
            call.validAfter,
            call.validUntil,
            call.allowedContract,
            &call.allowedSelectors,
            call.spendingLimit,
        )
    }

    /// Register on behalf of `call.owner`, authorized by an owner-signed
    /// `RegisterSessionKey` message over the owner's registration nonce.
    pub fn register_with_signature(
        &mut self,
        call: ISessionKeyRegistry::registerWithSignatureCall,
    ) -> Result<()> {
        if U256::from(self.storage.timestamp()) > call.deadline {
            return Err(SessionKeyRegistryError::signature_expired().into());
        }

        let nonce_slot = mapping_slot(call.owner, slots::REG_NONCES);
        let nonce = nonces::load(self.storage, self.address, nonce_slot);

        let struct_hash = RegisterSessionKey {
            owner: call.owner,
            sessionKey: call.sessionKey,
            validAfter: call.validAfter,
            validUntil: call.validUntil,
            allowedContract: call.allowedContract,
            allowedSelectorsHash: selectors_hash(&call.allowedSelectors),
            spendingLimit: call.spendingLimit,
            nonce,
            deadline: call.deadline,
        }
        .eip712_hash_struct();
        let digest = eip712::signing_digest(self.domain_separator(), struct_hash);

        match eip712::recover_signer(&digest, &call.signature) {
            Some(signer) if signer == call.owner => {}
            _ => return Err(SessionKeyRegistryError::invalid_signature().into()),
        }
        nonces::consume(self.storage, self.address, nonce_slot)?;

        self.write_grant(
            call.owner,
            call.sessionKey,
            call.validAfter,
            call.validUntil,
            call.allowedContract,
            &call.allowedSelectors,
            call.spendingLimit,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn write_grant(
        &mut self,
        owner: Address,
        session_key: Address,
        valid_after: u64,
        valid_until: u64,
        allowed_contract: Address,
        selectors: &[FixedBytes<4>],
        spending_limit: U256,
    ) -> Result<()> {
        if session_key.is_zero() || allowed_contract.is_zero() {
            return Err(SessionKeyRegistryError::zero_address().into());
        }
        if valid_after >= valid_until || valid_until - valid_after > MAX_SESSION_DURATION_SECS {
            return Err(SessionKeyRegistryError::invalid_time_range().into());
        }

        let base = Self::grant_base_slot(owner, session_key);
        let existing = self.load_header(base);
        if existing.exists() && self.storage.timestamp() <= existing.valid_until {
            return Err(SessionKeyRegistryError::session_key_already_exists().into());
        }

        // An expired grant is replaced wholesale: spent and usage nonce
        // restart and stale selector slots beyond the new list are cleared.
        let new_count = selectors.len() as u32;
        for stale in new_count..existing.selector_count {
            self.storage.sstore(
                self.address,
                base + to_u256(SELECTORS_OFFSET + stale as u64),
                U256::ZERO,
            );
        }

        self.store_header(
            base,
            GrantHeader {
                valid_after,
                valid_until,
                nonce: 0,
                selector_count: new_count,
            },
        );
        self.storage.sstore(
            self.address,
            base + to_u256(CONTRACT_OFFSET),
            address_to_word(allowed_contract),
        );
        self.storage
            .sstore(self.address, base + to_u256(LIMIT_OFFSET), spending_limit);
        self.storage
            .sstore(self.address, base + to_u256(SPENT_OFFSET), U256::ZERO);
        for (i, selector) in selectors.iter().enumerate() {
            self.storage.sstore(
                self.address,
                base + to_u256(SELECTORS_OFFSET + i as u64),
                selector_to_word(*selector),
            );
        }

        self.storage.emit_event(
            self.address,
            SessionKeyRegistryEvent::SessionKeyRegistered(
                ISessionKeyRegistry::SessionKeyRegistered {
                    owner,
                    sessionKey: session_key,
                    validAfter: valid_after,
                    validUntil: valid_until,
                    allowedContract: allowed_contract,
                    spendingLimit: spending_limit,
                },
            )
            .into_log_data(),
        );

        Ok(())
    }

    /// Delete `msg_sender`'s grant for `call.sessionKey` unconditionally.
    pub fn revoke(
        &mut self,
        msg_sender: Address,
        call: ISessionKeyRegistry::revokeCall,
    ) -> Result<()> {
        let base = Self::grant_base_slot(msg_sender, call.sessionKey);
        let header = self.load_header(base);
        if !header.exists() {
            return Err(SessionKeyRegistryError::invalid_session_key().into());
        }

        for offset in 0..SELECTORS_OFFSET + header.selector_count as u64 {
            self.storage
                .sstore(self.address, base + to_u256(offset), U256::ZERO);
        }

        self.storage.emit_event(
            self.address,
            SessionKeyRegistryEvent::SessionKeyRevoked(ISessionKeyRegistry::SessionKeyRevoked {
                owner: msg_sender,
                sessionKey: call.sessionKey,
            })
            .into_log_data(),
        );

        Ok(())
    }

    /// Granular scope check behind [`Self::validate`]. Read-only.
    pub fn check_session_key(
        &mut self,
        owner: Address,
        session_key: Address,
        target: Address,
        selector: FixedBytes<4>,
        value: U256,
    ) -> Result<()> {
        let base = Self::grant_base_slot(owner, session_key);
        let header = self.load_header(base);
        if !header.exists() {
            return Err(SessionKeyRegistryError::invalid_session_key().into());
        }

        let now = self.storage.timestamp();
        if now < header.valid_after {
            return Err(SessionKeyRegistryError::session_key_not_active().into());
        }
        if now > header.valid_until {
            return Err(SessionKeyRegistryError::session_key_expired().into());
        }

        let allowed_contract =
            word_to_address(self.storage.sload(self.address, base + to_u256(CONTRACT_OFFSET)));
        if target != allowed_contract {
            return Err(SessionKeyRegistryError::unauthorized_contract().into());
        }

        let mut found = false;
        for i in 0..header.selector_count as u64 {
            let stored = self
                .storage
                .sload(self.address, base + to_u256(SELECTORS_OFFSET + i));
            if word_to_selector(stored) == selector {
                found = true;
                break;
            }
        }
        if !found {
            return Err(SessionKeyRegistryError::unauthorized_selector().into());
        }

        let limit = self.storage.sload(self.address, base + to_u256(LIMIT_OFFSET));
        let spent = self.storage.sload(self.address, base + to_u256(SPENT_OFFSET));
        match spent.checked_add(value) {
            Some(total) if total <= limit => Ok(()),
            _ => Err(SessionKeyRegistryError::spending_limit_exceeded().into()),
        }
    }

    /// Read-only scope check: false on any failure, never errors.
    pub fn validate(&mut self, call: ISessionKeyRegistry::validateCall) -> bool {
        self.check_session_key(
            call.owner,
            call.sessionKey,
            call.target,
            call.selector,
            call.value,
        )
        .is_ok()
    }

    /// Digest a session key must sign to authorize one use of the grant at
    /// its current usage nonce.
    pub fn session_operation_digest(
        &mut self,
        call: &ISessionKeyRegistry::validateAndUseCall,
    ) -> B256 {
        let base = Self::grant_base_slot(call.owner, call.sessionKey);
        let nonce = self.load_header(base).nonce;
        let struct_hash = SessionOperation {
            owner: call.owner,
            sessionKey: call.sessionKey,
            target: call.target,
            selector: call.selector,
            callDigest: call.callDigest,
            value: call.value,
            nonce,
            deadline: call.deadline,
        }
        .eip712_hash_struct();
        eip712::signing_digest(self.domain_separator(), struct_hash)
    }

    /// Consume one use of the grant: session-key signature over the current
    /// usage nonce, then nonce bump and spent update, atomically.
    pub fn validate_and_use(
        &mut self,
        call: ISessionKeyRegistry::validateAndUseCall,
    ) -> Result<()> {
        if U256::from(self.storage.timestamp()) > call.deadline {
            return Err(SessionKeyRegistryError::signature_expired().into());
        }

        if self
            .check_session_key(
                call.owner,
                call.sessionKey,
                call.target,
                call.selector,
                call.value,
            )
            .is_err()
        {
            return Err(SessionKeyRegistryError::session_key_not_active().into());
        }

        let digest = self.session_operation_digest(&call);
        match eip712::recover_signer(&digest, &call.signature) {
            Some(signer) if signer == call.sessionKey => {}
            _ => return Err(SessionKeyRegistryError::invalid_signature().into()),
        }

        let base = Self::grant_base_slot(call.owner, call.sessionKey);
        let mut header = self.load_header(base);
        let used_nonce = header.nonce;
        header.nonce = used_nonce
            .checked_add(1)
            .ok_or_else(|| crate::PatronError::Fatal("usage nonce overflow".into()))?;
        self.store_header(base, header);

        let spent_slot = base + to_u256(SPENT_OFFSET);
        let spent = self.storage.sload(self.address, spent_slot);
        self.storage.sstore(self.address, spent_slot, spent + call.value);

        self.storage.emit_event(
            self.address,
            SessionKeyRegistryEvent::SessionKeyUsed(ISessionKeyRegistry::SessionKeyUsed {
                owner: call.owner,
                sessionKey: call.sessionKey,
                target: call.target,
                selector: call.selector,
                value: call.value,
                nonce: used_nonce,
            })
            .into_log_data(),
        );

        Ok(())
    }

    /// Full grant data; zeroed if no grant exists.
    pub fn get_session_key(
        &mut self,
        call: ISessionKeyRegistry::getSessionKeyCall,
    ) -> ISessionKeyRegistry::SessionKeyData {
        let base = Self::grant_base_slot(call.owner, call.sessionKey);
        let header = self.load_header(base);
        if !header.exists() {
            return ISessionKeyRegistry::SessionKeyData {
                sessionKey: Address::ZERO,
                validAfter: 0,
                validUntil: 0,
                allowedContract: Address::ZERO,
                allowedSelectors: Vec::new(),
                spendingLimit: U256::ZERO,
                spent: U256::ZERO,
                nonce: 0,
            };
        }

        let mut selectors = Vec::with_capacity(header.selector_count as usize);
        for i in 0..header.selector_count as u64 {
            let stored = self
                .storage
                .sload(self.address, base + to_u256(SELECTORS_OFFSET + i));
            selectors.push(word_to_selector(stored));
        }

        ISessionKeyRegistry::SessionKeyData {
            sessionKey: call.sessionKey,
            validAfter: header.valid_after,
            validUntil: header.valid_until,
            allowedContract: word_to_address(
                self.storage.sload(self.address, base + to_u256(CONTRACT_OFFSET)),
            ),
            allowedSelectors: selectors,
            spendingLimit: self.storage.sload(self.address, base + to_u256(LIMIT_OFFSET)),
            spent: self.storage.sload(self.address, base + to_u256(SPENT_OFFSET)),
            nonce: header.nonce,
        }
    }

    /// Current registration nonce for owner-signed registrations.
    pub fn registration_nonce(&mut self, owner: Address) -> u64 {
        let slot = mapping_slot(owner, slots::REG_NONCES);
        nonces::load(self.storage, self.address, slot)
    }

    /// Digest an owner must sign to authorize a third-party registration at
    /// the owner's current registration nonce.
    pub fn registration_digest(
        &mut self,
        call: &ISessionKeyRegistry::registerWithSignatureCall,
    ) -> B256 {
        let nonce = self.registration_nonce(call.owner);
        let struct_hash = RegisterSessionKey {
            owner: call.owner,
            sessionKey: call.sessionKey,
            validAfter: call.validAfter,
            validUntil: call.validUntil,
            allowedContract: call.allowedContract,
            allowedSelectorsHash: selectors_hash(&call.allowedSelectors),
            spendingLimit: call.spendingLimit,
            nonce,
            deadline: call.deadline,
        }
        .eip712_hash_struct();
        eip712::signing_digest(self.domain_separator(), struct_hash)
    }
}
