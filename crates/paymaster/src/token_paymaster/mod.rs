//! Token-denominated sponsorship ledger.
//!
//! Same pessimistic charge-then-refund lifecycle as the base-asset ledger,
//! but balances are kept per (account, token) and the cost ceiling is
//! converted through a [`PriceOracle`] plus a bounded basis-point markup.
//! Settlement reprices the actual base-asset cost at the settlement-time
//! rate, not the rate captured during validation.

use alloy::primitives::{Address, IntoLogData, B256, U256};
use alloy::sol_types::SolStruct;
use patron_contracts::{
    ITokenPaymaster, SessionKeyTokenUserOp, TokenPaymasterError, TokenPaymasterEvent,
    BPS_DENOMINATOR, MAX_MARKUP_BPS, TOKEN_PAYMASTER_ADDRESS,
};

use crate::{
    calls, eip712, nonces,
    oracle::PriceOracle,
    session_keys::SessionKeyRegistry,
    sponsor_paymaster::{Allowance, ChargeKind},
    storage::{
        slots::{address_to_word, double_mapping_slot, mapping_slot, pair_key, word_to_address},
        StorageProvider,
    },
    Result, SponsoredOp,
};

mod data;
pub use data::TokenPaymasterData;

mod slots {
    use alloy::primitives::U256;

    use crate::storage::slots::to_u256;

    pub(super) const ADMIN: U256 = to_u256(0);
    pub(super) const REGISTRY: U256 = to_u256(1);
    // oracle identity; zero means no oracle is configured
    pub(super) const ORACLE: U256 = to_u256(2);
    pub(super) const MARKUP_BPS: U256 = to_u256(3);
    // supported[token] -> bool
    pub(super) const SUPPORTED: U256 = to_u256(4);
    // balances[account][token] -> U256
    pub(super) const BALANCES: U256 = to_u256(5);
    // allowanceAmount[pairKey(sponsor, spender)][token] -> U256
    pub(super) const ALLOWANCE_AMOUNT: U256 = to_u256(6);
    // allowanceUnlimited[pairKey(sponsor, spender)][token] -> bool
    pub(super) const ALLOWANCE_UNLIMITED: U256 = to_u256(7);
    // chargeNonces[owner][sessionKey] -> u64
    pub(super) const CHARGE_NONCES: U256 = to_u256(8);
}

/// Opaque context handed from `validate_op` to the matching `post_op`,
/// denominated in token units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTokenCharge {
    pub kind: ChargeKind,
    pub payer: Address,
    pub spender: Address,
    pub token: Address,
    pub pre_charged: U256,
    pub allowance_debited: U256,
    pub op_hash: B256,
}

/// Token sponsorship ledger contract.
#[derive(Debug)]
pub struct TokenPaymaster<'a, S: StorageProvider> {
    address: Address,
    storage: &'a mut S,
}

impl<'a, S: StorageProvider> TokenPaymaster<'a, S> {
    pub fn new(storage: &'a mut S) -> Self {
        Self {
            address: TOKEN_PAYMASTER_ADDRESS,
            storage,
        }
    }

    /// One-time setup of the admin identity and the registry consulted in
    /// session-key mode (zero to disable mode 1).
    pub fn initialize(&mut self, admin: Address, registry: Address) -> Result<()> {
        if admin.is_zero() {
            return Err(TokenPaymasterError::zero_address().into());
        }
        if !self.storage.sload(self.address, slots::ADMIN).is_zero() {
            return Err(TokenPaymasterError::unauthorized().into());
        }
        self.storage
            .sstore(self.address, slots::ADMIN, address_to_word(admin));
        self.storage
            .sstore(self.address, slots::REGISTRY, address_to_word(registry));
        Ok(())
    }

    fn require_admin(&mut self, msg_sender: Address) -> Result<()> {
        let admin = word_to_address(self.storage.sload(self.address, slots::ADMIN));
        if msg_sender != admin {
            return Err(TokenPaymasterError::unauthorized().into());
        }
        Ok(())
    }

    pub fn domain_separator(&mut self) -> B256 {
        eip712::domain_separator("TokenPaymaster", self.storage.chain_id(), self.address)
    }

    pub fn set_token_support(
        &mut self,
        msg_sender: Address,
        call: ITokenPaymaster::setTokenSupportCall,
    ) -> Result<()> {
        self.require_admin(msg_sender)?;
        if call.token.is_zero() {
            return Err(TokenPaymasterError::zero_address().into());
        }
        let slot = mapping_slot(call.token, slots::SUPPORTED);
        self.storage.sstore(
            self.address,
            slot,
            if call.supported { U256::ONE } else { U256::ZERO },
        );
        self.storage.emit_event(
            self.address,
            TokenPaymasterEvent::TokenSupportUpdated(ITokenPaymaster::TokenSupportUpdated {
                token: call.token,
                supported: call.supported,
            })
            .into_log_data(),
        );
        Ok(())
    }

    pub fn is_token_supported(&mut self, token: Address) -> bool {
        let slot = mapping_slot(token, slots::SUPPORTED);
        !self.storage.sload(self.address, slot).is_zero()
    }

    /// Record which oracle identity conversions are priced against. The host
    /// resolves this identity to a [`PriceOracle`] instance and passes it to
    /// `validate_op`/`post_op`.
    pub fn set_oracle(
        &mut self,
        msg_sender: Address,
        call: ITokenPaymaster::setOracleCall,
    ) -> Result<()> {
        self.require_admin(msg_sender)?;
        if call.oracle.is_zero() {
            return Err(TokenPaymasterError::zero_address().into());
        }
        self.storage
            .sstore(self.address, slots::ORACLE, address_to_word(call.oracle));
        self.storage.emit_event(
            self.address,
            TokenPaymasterEvent::OracleUpdated(ITokenPaymaster::OracleUpdated {
                oracle: call.oracle,
            })
            .into_log_data(),
        );
        Ok(())
    }

    pub fn oracle_address(&mut self) -> Address {
        word_to_address(self.storage.sload(self.address, slots::ORACLE))
    }

    pub fn set_markup(
        &mut self,
        msg_sender: Address,
        call: ITokenPaymaster::setMarkupCall,
    ) -> Result<()> {
        self.require_admin(msg_sender)?;
        if call.markupBps > MAX_MARKUP_BPS {
            return Err(TokenPaymasterError::invalid_markup().into());
        }
        self.storage
            .sstore(self.address, slots::MARKUP_BPS, U256::from(call.markupBps));
        self.storage.emit_event(
            self.address,
            TokenPaymasterEvent::MarkupUpdated(ITokenPaymaster::MarkupUpdated {
                markupBps: call.markupBps,
            })
            .into_log_data(),
        );
        Ok(())
    }

    pub fn markup_bps(&mut self) -> u16 {
        self.storage
            .sload(self.address, slots::MARKUP_BPS)
            .saturating_to::<u16>()
    }

    fn balance_slot(account: Address, token: Address) -> U256 {
        double_mapping_slot(account, token, slots::BALANCES)
    }

    pub fn balance_of(&mut self, account: Address, token: Address) -> U256 {
        let slot = Self::balance_slot(account, token);
        self.storage.sload(self.address, slot)
    }

    fn set_balance(&mut self, account: Address, token: Address, amount: U256) {
        self.storage
            .sstore(self.address, Self::balance_slot(account, token), amount);
    }

    pub fn deposit(&mut self, call: ITokenPaymaster::depositCall) -> Result<()> {
        if call.token.is_zero() || call.account.is_zero() {
            return Err(TokenPaymasterError::zero_address().into());
        }
        if call.amount.is_zero() {
            return Err(TokenPaymasterError::zero_amount().into());
        }
        if !self.is_token_supported(call.token) {
            return Err(TokenPaymasterError::token_not_supported().into());
        }

        let balance = self.balance_of(call.account, call.token);
        let updated = balance
            .checked_add(call.amount)
            .ok_or_else(|| crate::PatronError::Fatal("token balance overflow".into()))?;
        self.set_balance(call.account, call.token, updated);

        self.storage.emit_event(
            self.address,
            TokenPaymasterEvent::TokenDeposited(ITokenPaymaster::TokenDeposited {
                sponsor: call.account,
                token: call.token,
                amount: call.amount,
            })
            .into_log_data(),
        );
        Ok(())
    }

    /// Withdrawal never checks token support, so funds deposited before a
    /// token was delisted stay reachable.
    pub fn withdraw(
        &mut self,
        msg_sender: Address,
        call: ITokenPaymaster::withdrawCall,
    ) -> Result<()> {
        if call.amount.is_zero() {
            return Err(TokenPaymasterError::zero_amount().into());
        }
        let balance = self.balance_of(msg_sender, call.token);
        if balance < call.amount {
            return Err(TokenPaymasterError::insufficient_token_balance().into());
        }
        self.set_balance(msg_sender, call.token, balance - call.amount);

        self.storage.emit_event(
            self.address,
            TokenPaymasterEvent::TokenWithdrawn(ITokenPaymaster::TokenWithdrawn {
                sponsor: msg_sender,
                token: call.token,
                amount: call.amount,
            })
            .into_log_data(),
        );
        Ok(())
    }

    fn allowance_slots(sponsor: Address, spender: Address, token: Address) -> (U256, U256) {
        let pair = pair_key(sponsor, spender);
        (
            double_mapping_slot(pair, token, slots::ALLOWANCE_AMOUNT),
            double_mapping_slot(pair, token, slots::ALLOWANCE_UNLIMITED),
        )
    }

    pub fn allowance(&mut self, sponsor: Address, spender: Address, token: Address) -> Allowance {
        let (amount_slot, unlimited_slot) = Self::allowance_slots(sponsor, spender, token);
        if !self.storage.sload(self.address, unlimited_slot).is_zero() {
            Allowance::Unlimited
        } else {
            Allowance::Limited(self.storage.sload(self.address, amount_slot))
        }
    }

    fn store_allowance(
        &mut self,
        sponsor: Address,
        spender: Address,
        token: Address,
        allowance: Allowance,
    ) {
        let (amount_slot, unlimited_slot) = Self::allowance_slots(sponsor, spender, token);
        let (amount, unlimited) = match allowance {
            Allowance::Unlimited => (U256::ZERO, U256::ONE),
            Allowance::Limited(amount) => (amount, U256::ZERO),
        };
        self.storage.sstore(self.address, amount_slot, amount);
        self.storage.sstore(self.address, unlimited_slot, unlimited);
    }

    fn emit_allowance_updated(
        &mut self,
        sponsor: Address,
        spender: Address,
        token: Address,
        allowance: Allowance,
    ) {
        let (amount, unlimited) = match allowance {
            Allowance::Unlimited => (U256::ZERO, true),
            Allowance::Limited(amount) => (amount, false),
        };
        self.storage.emit_event(
            self.address,
            TokenPaymasterEvent::TokenAllowanceUpdated(ITokenPaymaster::TokenAllowanceUpdated {
                sponsor,
                spender,
                token,
                amount,
                unlimited,
            })
            .into_log_data(),
        );
    }

    pub fn set_allowance(
        &mut self,
        msg_sender: Address,
        call: ITokenPaymaster::setAllowanceCall,
    ) -> Result<()> {
        if call.spender.is_zero() || call.token.is_zero() {
            return Err(TokenPaymasterError::zero_address().into());
        }
        let allowance = Allowance::Limited(call.amount);
        self.store_allowance(msg_sender, call.spender, call.token, allowance);
        self.emit_allowance_updated(msg_sender, call.spender, call.token, allowance);
        Ok(())
    }

    pub fn set_unlimited_allowance(
        &mut self,
        msg_sender: Address,
        call: ITokenPaymaster::setUnlimitedAllowanceCall,
    ) -> Result<()> {
        if call.spender.is_zero() || call.token.is_zero() {
            return Err(TokenPaymasterError::zero_address().into());
        }
        self.store_allowance(msg_sender, call.spender, call.token, Allowance::Unlimited);
        self.emit_allowance_updated(msg_sender, call.spender, call.token, Allowance::Unlimited);
        Ok(())
    }

    fn charge_nonce_slot(owner: Address, session_key: Address) -> U256 {
        double_mapping_slot(owner, session_key, slots::CHARGE_NONCES)
    }

    /// Ledger-local charge-authorization nonce, separate from both the
    /// base-asset ledger's nonce space and the registry's usage nonce.
    pub fn charge_nonce(&mut self, owner: Address, session_key: Address) -> u64 {
        let slot = Self::charge_nonce_slot(owner, session_key);
        nonces::load(self.storage, self.address, slot)
    }

    /// Digest a session key must sign to authorize one token-denominated
    /// gas charge at the current charge nonce.
    pub fn charge_digest(
        &mut self,
        owner: Address,
        session_key: Address,
        token: Address,
        op_hash: B256,
        deadline: U256,
    ) -> B256 {
        let nonce = self.charge_nonce(owner, session_key);
        let struct_hash = SessionKeyTokenUserOp {
            owner,
            sessionKey: session_key,
            token,
            opHash: op_hash,
            nonce,
            deadline,
        }
        .eip712_hash_struct();
        eip712::signing_digest(self.domain_separator(), struct_hash)
    }

    /// Token units needed to cover `cost` base-asset units at the oracle's
    /// current rate, surcharged by the configured markup and rounded up.
    pub fn required_token_amount(
        &mut self,
        oracle: &dyn PriceOracle,
        token: Address,
        cost: U256,
    ) -> Result<U256> {
        let base = oracle.token_amount_for_cost(token, cost);
        let markup = U256::from(BPS_DENOMINATOR) + U256::from(self.markup_bps());
        let scaled = base
            .checked_mul(markup)
            .ok_or_else(|| crate::PatronError::Fatal("token cost overflow".into()))?;
        Ok(scaled.div_ceil(U256::from(BPS_DENOMINATOR)))
    }

    /// Validation phase: decode the payload, convert the cost ceiling into
    /// token units, resolve payer and spender, then pre-debit the payer's
    /// token balance (and a bounded allowance when they differ).
    pub fn validate_op(
        &mut self,
        op: &SponsoredOp,
        op_hash: B256,
        max_cost: U256,
        oracle: &dyn PriceOracle,
    ) -> Result<PendingTokenCharge> {
        let decoded = TokenPaymasterData::decode(&op.paymaster_data)?;
        let (token, max_token_cost) = match &decoded {
            TokenPaymasterData::Token {
                token,
                max_token_cost,
            }
            | TokenPaymasterData::SessionKey {
                token,
                max_token_cost,
                ..
            } => (*token, *max_token_cost),
        };

        if !self.is_token_supported(token) {
            return Err(TokenPaymasterError::token_not_supported().into());
        }
        if self.oracle_address().is_zero() {
            return Err(TokenPaymasterError::price_oracle_not_set().into());
        }

        let required = self.required_token_amount(oracle, token, max_cost)?;
        if max_token_cost < required {
            return Err(TokenPaymasterError::token_cost_too_high().into());
        }

        let (kind, payer, spender, nonce_slot) = match decoded {
            TokenPaymasterData::Token { .. } => (ChargeKind::Sponsor, op.sender, op.sender, None),
            TokenPaymasterData::SessionKey {
                owner,
                session_key,
                deadline,
                signature,
                ..
            } => {
                if U256::from(self.storage.timestamp()) > deadline {
                    return Err(TokenPaymasterError::signature_expired().into());
                }

                let digest = self.charge_digest(owner, session_key, token, op_hash, deadline);
                match eip712::recover_signer(&digest, &signature) {
                    Some(signer) if signer == session_key => {}
                    _ => return Err(TokenPaymasterError::invalid_signature().into()),
                }

                // Scope check applies only when a registry is wired; an
                // unconfigured registry leaves mode 1 gated by signature,
                // nonce, and deadline alone.
                let registry = word_to_address(self.storage.sload(self.address, slots::REGISTRY));
                if !registry.is_zero() {
                    let call = calls::unwrap_execute(&op.call_data);
                    let scoped = SessionKeyRegistry::new(&mut *self.storage).validate(
                        patron_contracts::ISessionKeyRegistry::validateCall {
                            owner,
                            sessionKey: session_key,
                            target: call.target,
                            selector: call.selector,
                            value: U256::ZERO,
                        },
                    );
                    if !scoped {
                        return Err(TokenPaymasterError::invalid_session_key().into());
                    }
                }

                (
                    ChargeKind::SessionKey { owner, session_key },
                    owner,
                    op.sender,
                    Some(Self::charge_nonce_slot(owner, session_key)),
                )
            }
        };

        let balance = self.balance_of(payer, token);
        if balance < required {
            return Err(TokenPaymasterError::insufficient_token_balance().into());
        }

        let allowance_debited = if payer != spender {
            match self.allowance(payer, spender, token) {
                Allowance::Unlimited => U256::ZERO,
                Allowance::Limited(amount) if amount >= required => required,
                Allowance::Limited(_) => {
                    return Err(TokenPaymasterError::insufficient_token_allowance().into())
                }
            }
        } else {
            U256::ZERO
        };

        // All checks have passed; every mutation from here on is part of a
        // successful validate, so a rejection never advances the nonce.
        if let Some(slot) = nonce_slot {
            nonces::consume(self.storage, self.address, slot)?;
        }
        if !allowance_debited.is_zero() {
            if let Allowance::Limited(amount) = self.allowance(payer, spender, token) {
                self.store_allowance(
                    payer,
                    spender,
                    token,
                    Allowance::Limited(amount - allowance_debited),
                );
            }
        }
        self.set_balance(payer, token, balance - required);

        Ok(PendingTokenCharge {
            kind,
            payer,
            spender,
            token,
            pre_charged: required,
            allowance_debited,
            op_hash,
        })
    }

    /// Settlement phase: reprice the actual base-asset cost at the current
    /// oracle rate, keep that many token units (capped by the pre-charge),
    /// and refund the rest, or everything if the wrapped call reverted.
    pub fn post_op(
        &mut self,
        charge: PendingTokenCharge,
        actual_cost: U256,
        op_reverted: bool,
        oracle: &dyn PriceOracle,
    ) -> Result<()> {
        let kept = if op_reverted {
            U256::ZERO
        } else {
            self.required_token_amount(oracle, charge.token, actual_cost)?
                .min(charge.pre_charged)
        };
        let refund = charge.pre_charged - kept;

        if !refund.is_zero() {
            let balance = self.balance_of(charge.payer, charge.token);
            let updated = balance
                .checked_add(refund)
                .ok_or_else(|| crate::PatronError::Fatal("token balance overflow".into()))?;
            self.set_balance(charge.payer, charge.token, updated);
        }

        let restore = charge.allowance_debited.saturating_sub(kept);
        if !restore.is_zero() {
            if let Allowance::Limited(amount) =
                self.allowance(charge.payer, charge.spender, charge.token)
            {
                self.store_allowance(
                    charge.payer,
                    charge.spender,
                    charge.token,
                    Allowance::Limited(amount.saturating_add(restore)),
                );
            }
        }

        if !op_reverted {
            let event = match charge.kind {
                ChargeKind::Sponsor => {
                    TokenPaymasterEvent::TokenGasPaid(ITokenPaymaster::TokenGasPaid {
                        opHash: charge.op_hash,
                        payer: charge.payer,
                        token: charge.token,
                        spender: charge.spender,
                        tokenAmount: kept,
                        actualCost: actual_cost,
                    })
                }
                ChargeKind::SessionKey { owner, session_key } => {
                    TokenPaymasterEvent::SessionKeyTokenGasPaid(
                        ITokenPaymaster::SessionKeyTokenGasPaid {
                            opHash: charge.op_hash,
                            owner,
                            sessionKey: session_key,
                            token: charge.token,
                            tokenAmount: kept,
                            actualCost: actual_cost,
                        },
                    )
                }
            };
            self.storage.emit_event(self.address, event.into_log_data());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        oracle::FixedRateOracle, storage::HashMapStorageProvider, PatronError,
        SESSION_KEY_REGISTRY_ADDRESS,
    };
    use alloy::{
        primitives::{keccak256, Bytes, FixedBytes},
        signers::{local::PrivateKeySigner, SignerSync},
        sol_types::SolCall,
    };
    use patron_contracts::{IAccountExecute, ISessionKeyRegistry};

    const ADMIN: Address = Address::new([0x0a; 20]);
    const ORACLE_ID: Address = Address::new([0x0c; 20]);

    fn token_err<T: std::fmt::Debug>(result: Result<T>) -> TokenPaymasterError {
        match result.unwrap_err() {
            PatronError::TokenPaymaster(e) => e,
            other => panic!("expected token paymaster error, got: {other:?}"),
        }
    }

    fn setup_ledger<'a>(
        storage: &'a mut HashMapStorageProvider,
        token: Address,
        markup_bps: u16,
    ) -> TokenPaymaster<'a, HashMapStorageProvider> {
        let mut ledger = TokenPaymaster::new(storage);
        ledger.initialize(ADMIN, SESSION_KEY_REGISTRY_ADDRESS).unwrap();
        ledger
            .set_token_support(
                ADMIN,
                ITokenPaymaster::setTokenSupportCall {
                    token,
                    supported: true,
                },
            )
            .unwrap();
        ledger
            .set_oracle(ADMIN, ITokenPaymaster::setOracleCall { oracle: ORACLE_ID })
            .unwrap();
        ledger
            .set_markup(
                ADMIN,
                ITokenPaymaster::setMarkupCall {
                    markupBps: markup_bps,
                },
            )
            .unwrap();
        ledger
    }

    fn token_payload(token: Address, max_token_cost: U256) -> Bytes {
        let mut payload = TOKEN_PAYMASTER_ADDRESS.to_vec();
        payload.push(0);
        payload.extend_from_slice(token.as_slice());
        payload.extend_from_slice(&max_token_cost.to_be_bytes::<32>());
        payload.into()
    }

    #[allow(clippy::too_many_arguments)]
    fn session_key_payload(
        token: Address,
        max_token_cost: U256,
        owner: Address,
        session_key: Address,
        deadline: U256,
        signature: &[u8],
    ) -> Bytes {
        let mut payload = TOKEN_PAYMASTER_ADDRESS.to_vec();
        payload.push(1);
        payload.extend_from_slice(token.as_slice());
        payload.extend_from_slice(&max_token_cost.to_be_bytes::<32>());
        payload.extend_from_slice(owner.as_slice());
        payload.extend_from_slice(session_key.as_slice());
        payload.extend_from_slice(&deadline.to_be_bytes::<32>());
        payload.extend_from_slice(signature);
        payload.into()
    }

    #[test]
    fn test_admin_gating_and_markup_bounds() {
        let mut storage = HashMapStorageProvider::new(1);
        let token = Address::from([0x11; 20]);
        let mut ledger = TokenPaymaster::new(&mut storage);
        ledger.initialize(ADMIN, Address::ZERO).unwrap();

        let stranger = Address::from([0x0b; 20]);
        assert_eq!(
            token_err(ledger.set_token_support(
                stranger,
                ITokenPaymaster::setTokenSupportCall {
                    token,
                    supported: true,
                }
            )),
            TokenPaymasterError::unauthorized()
        );
        assert_eq!(
            token_err(ledger.set_markup(
                ADMIN,
                ITokenPaymaster::setMarkupCall {
                    markupBps: MAX_MARKUP_BPS + 1,
                }
            )),
            TokenPaymasterError::invalid_markup()
        );

        ledger
            .set_markup(
                ADMIN,
                ITokenPaymaster::setMarkupCall {
                    markupBps: MAX_MARKUP_BPS,
                },
            )
            .unwrap();
        assert_eq!(ledger.markup_bps(), MAX_MARKUP_BPS);
    }

    #[test]
    fn test_deposit_requires_supported_token() {
        let mut storage = HashMapStorageProvider::new(1);
        let token = Address::from([0x11; 20]);
        let sponsor = Address::from([0x01; 20]);
        let mut ledger = TokenPaymaster::new(&mut storage);
        ledger.initialize(ADMIN, Address::ZERO).unwrap();

        assert_eq!(
            token_err(ledger.deposit(ITokenPaymaster::depositCall {
                token,
                account: sponsor,
                amount: U256::from(100),
            })),
            TokenPaymasterError::token_not_supported()
        );

        ledger
            .set_token_support(
                ADMIN,
                ITokenPaymaster::setTokenSupportCall {
                    token,
                    supported: true,
                },
            )
            .unwrap();
        ledger
            .deposit(ITokenPaymaster::depositCall {
                token,
                account: sponsor,
                amount: U256::from(100),
            })
            .unwrap();
        assert_eq!(ledger.balance_of(sponsor, token), U256::from(100));

        // withdrawal works even after the token is delisted
        ledger
            .set_token_support(
                ADMIN,
                ITokenPaymaster::setTokenSupportCall {
                    token,
                    supported: false,
                },
            )
            .unwrap();
        ledger
            .withdraw(
                sponsor,
                ITokenPaymaster::withdrawCall {
                    token,
                    amount: U256::from(100),
                },
            )
            .unwrap();
        assert_eq!(ledger.balance_of(sponsor, token), U256::ZERO);
    }

    #[test]
    fn test_markup_rejects_insufficient_max_token_cost() {
        let mut storage = HashMapStorageProvider::new(1);
        let token = Address::from([0x11; 20]);
        let sender = Address::from([0x01; 20]);
        let oracle = FixedRateOracle::new().with_rate(token, 2000, 1);

        // rate 2000 tokens per cost unit, 3% markup: cost 1 needs 2060
        let mut ledger = setup_ledger(&mut storage, token, 300);
        ledger
            .deposit(ITokenPaymaster::depositCall {
                token,
                account: sender,
                amount: U256::from(10_000),
            })
            .unwrap();

        let op = SponsoredOp {
            sender,
            call_data: Bytes::new(),
            paymaster_data: token_payload(token, U256::from(2000)),
        };
        assert_eq!(
            token_err(ledger.validate_op(&op, keccak256(b"op"), U256::ONE, &oracle)),
            TokenPaymasterError::token_cost_too_high()
        );
        assert_eq!(ledger.balance_of(sender, token), U256::from(10_000));

        let op = SponsoredOp {
            paymaster_data: token_payload(token, U256::from(2060)),
            ..op
        };
        let charge = ledger
            .validate_op(&op, keccak256(b"op"), U256::ONE, &oracle)
            .unwrap();
        assert_eq!(charge.pre_charged, U256::from(2060));
    }

    #[test]
    fn test_required_amount_monotonic_in_markup() {
        let mut storage = HashMapStorageProvider::new(1);
        let token = Address::from([0x11; 20]);
        let oracle = FixedRateOracle::new().with_rate(token, 2000, 1);
        let mut ledger = setup_ledger(&mut storage, token, 0);

        let mut previous = U256::ZERO;
        for markup in [0u16, 1, 50, 300, 999, 1000] {
            ledger
                .set_markup(ADMIN, ITokenPaymaster::setMarkupCall { markupBps: markup })
                .unwrap();
            let required = ledger
                .required_token_amount(&oracle, token, U256::from(7))
                .unwrap();
            assert!(required >= previous);
            previous = required;
        }
    }

    #[test]
    fn test_charge_and_settle_reprices_at_settlement() {
        let mut storage = HashMapStorageProvider::new(1);
        let token = Address::from([0x11; 20]);
        let sender = Address::from([0x01; 20]);
        let mut ledger = setup_ledger(&mut storage, token, 0);
        ledger
            .deposit(ITokenPaymaster::depositCall {
                token,
                account: sender,
                amount: U256::from(10_000),
            })
            .unwrap();

        let op = SponsoredOp {
            sender,
            call_data: Bytes::new(),
            paymaster_data: token_payload(token, U256::from(6_000)),
        };
        let op_hash = keccak256(b"op-reprice");

        // validation at 2000 tokens per unit: maxCost 3 pre-charges 6000
        let validation_oracle = FixedRateOracle::new().with_rate(token, 2000, 1);
        let charge = ledger
            .validate_op(&op, op_hash, U256::from(3), &validation_oracle)
            .unwrap();
        assert_eq!(charge.pre_charged, U256::from(6_000));
        assert_eq!(ledger.balance_of(sender, token), U256::from(4_000));

        // settlement at 1500 tokens per unit: actualCost 2 keeps 3000
        let settlement_oracle = FixedRateOracle::new().with_rate(token, 1500, 1);
        ledger
            .post_op(charge, U256::from(2), false, &settlement_oracle)
            .unwrap();
        assert_eq!(ledger.balance_of(sender, token), U256::from(7_000));

        let paid = storage
            .events_for(TOKEN_PAYMASTER_ADDRESS)
            .last()
            .cloned()
            .unwrap();
        let expected = TokenPaymasterEvent::TokenGasPaid(ITokenPaymaster::TokenGasPaid {
            opHash: op_hash,
            payer: sender,
            token,
            spender: sender,
            tokenAmount: U256::from(3_000),
            actualCost: U256::from(2),
        })
        .into_log_data();
        assert_eq!(paid, expected);
    }

    #[test]
    fn test_settlement_keep_is_capped_by_pre_charge() {
        let mut storage = HashMapStorageProvider::new(1);
        let token = Address::from([0x11; 20]);
        let sender = Address::from([0x01; 20]);
        let mut ledger = setup_ledger(&mut storage, token, 0);
        ledger
            .deposit(ITokenPaymaster::depositCall {
                token,
                account: sender,
                amount: U256::from(10_000),
            })
            .unwrap();

        let op = SponsoredOp {
            sender,
            call_data: Bytes::new(),
            paymaster_data: token_payload(token, U256::from(6_000)),
        };
        let validation_oracle = FixedRateOracle::new().with_rate(token, 2000, 1);
        let charge = ledger
            .validate_op(&op, keccak256(b"op-cap"), U256::from(3), &validation_oracle)
            .unwrap();

        // rate spikes: repricing would exceed the pre-charge, keep is capped
        let settlement_oracle = FixedRateOracle::new().with_rate(token, 4000, 1);
        ledger
            .post_op(charge, U256::from(3), false, &settlement_oracle)
            .unwrap();
        assert_eq!(ledger.balance_of(sender, token), U256::from(4_000));
    }

    #[test]
    fn test_reverted_op_refunds_full_pre_charge() {
        let mut storage = HashMapStorageProvider::new(1);
        let token = Address::from([0x11; 20]);
        let sender = Address::from([0x01; 20]);
        let oracle = FixedRateOracle::new().with_rate(token, 2000, 1);
        let mut ledger = setup_ledger(&mut storage, token, 300);
        ledger
            .deposit(ITokenPaymaster::depositCall {
                token,
                account: sender,
                amount: U256::from(10_000),
            })
            .unwrap();

        let op = SponsoredOp {
            sender,
            call_data: Bytes::new(),
            paymaster_data: token_payload(token, U256::from(10_000)),
        };
        let charge = ledger
            .validate_op(&op, keccak256(b"op-rev"), U256::from(3), &oracle)
            .unwrap();
        assert!(ledger.balance_of(sender, token) < U256::from(10_000));

        ledger.post_op(charge, U256::from(3), true, &oracle).unwrap();
        assert_eq!(ledger.balance_of(sender, token), U256::from(10_000));
    }

    #[test]
    fn test_validate_requires_oracle_and_support() {
        let mut storage = HashMapStorageProvider::new(1);
        let token = Address::from([0x11; 20]);
        let sender = Address::from([0x01; 20]);
        let oracle = FixedRateOracle::new().with_rate(token, 2000, 1);

        let mut ledger = TokenPaymaster::new(&mut storage);
        ledger.initialize(ADMIN, Address::ZERO).unwrap();

        let op = SponsoredOp {
            sender,
            call_data: Bytes::new(),
            paymaster_data: token_payload(token, U256::from(10_000)),
        };

        assert_eq!(
            token_err(ledger.validate_op(&op, keccak256(b"op"), U256::ONE, &oracle)),
            TokenPaymasterError::token_not_supported()
        );

        ledger
            .set_token_support(
                ADMIN,
                ITokenPaymaster::setTokenSupportCall {
                    token,
                    supported: true,
                },
            )
            .unwrap();
        assert_eq!(
            token_err(ledger.validate_op(&op, keccak256(b"op"), U256::ONE, &oracle)),
            TokenPaymasterError::price_oracle_not_set()
        );
    }

    #[test]
    fn test_session_key_mode_charges_owner_balance() {
        let mut storage = HashMapStorageProvider::new(1);
        let now = storage.timestamp();
        let token = Address::from([0x11; 20]);
        let target = Address::from([0x04; 20]);
        let oracle = FixedRateOracle::new().with_rate(token, 1000, 1);

        let signer = PrivateKeySigner::random();
        let session_key = signer.address();
        let owner = Address::from([0x01; 20]);
        let sender = Address::from([0x05; 20]);

        {
            let mut registry = SessionKeyRegistry::new(&mut storage);
            registry
                .register(
                    owner,
                    ISessionKeyRegistry::registerCall {
                        sessionKey: session_key,
                        validAfter: now,
                        validUntil: now + 3600,
                        allowedContract: target,
                        allowedSelectors: vec![FixedBytes::from([0xaa, 0xbb, 0xcc, 0xdd])],
                        spendingLimit: U256::from(1_000),
                    },
                )
                .unwrap();
        }

        let mut ledger = setup_ledger(&mut storage, token, 0);
        ledger
            .deposit(ITokenPaymaster::depositCall {
                token,
                account: owner,
                amount: U256::from(10_000),
            })
            .unwrap();
        ledger
            .set_allowance(
                owner,
                ITokenPaymaster::setAllowanceCall {
                    spender: sender,
                    token,
                    amount: U256::from(5_000),
                },
            )
            .unwrap();

        let call_data: Bytes = IAccountExecute::executeCall {
            target,
            value: U256::ZERO,
            data: Bytes::from(vec![0xaa, 0xbb, 0xcc, 0xdd]),
        }
        .abi_encode()
        .into();

        let op_hash = keccak256(b"token-userop");
        let deadline = U256::from(now + 60);
        let digest = ledger.charge_digest(owner, session_key, token, op_hash, deadline);
        let signature = signer.sign_hash_sync(&digest).unwrap().as_bytes();

        let op = SponsoredOp {
            sender,
            call_data,
            paymaster_data: session_key_payload(
                token,
                U256::from(3_000),
                owner,
                session_key,
                deadline,
                &signature,
            ),
        };

        let charge = ledger
            .validate_op(&op, op_hash, U256::from(3), &oracle)
            .unwrap();
        assert_eq!(charge.payer, owner);
        assert_eq!(charge.spender, sender);
        assert_eq!(charge.pre_charged, U256::from(3_000));
        assert_eq!(ledger.balance_of(owner, token), U256::from(7_000));
        assert_eq!(
            ledger.allowance(owner, sender, token),
            Allowance::Limited(U256::from(2_000))
        );
        assert_eq!(ledger.charge_nonce(owner, session_key), 1);

        ledger.post_op(charge, U256::from(2), false, &oracle).unwrap();
        assert_eq!(ledger.balance_of(owner, token), U256::from(8_000));
        assert_eq!(
            ledger.allowance(owner, sender, token),
            Allowance::Limited(U256::from(3_000))
        );

        // replay fails on the consumed charge nonce
        assert_eq!(
            token_err(ledger.validate_op(&op, op_hash, U256::from(3), &oracle)),
            TokenPaymasterError::invalid_signature()
        );
    }

    #[test]
    fn test_session_key_mode_without_registry_skips_scope_check() {
        let mut storage = HashMapStorageProvider::new(1);
        let now = storage.timestamp();
        let token = Address::from([0x11; 20]);
        let oracle = FixedRateOracle::new().with_rate(token, 1000, 1);

        let signer = PrivateKeySigner::random();
        let session_key = signer.address();
        let owner = Address::from([0x01; 20]);
        let sender = Address::from([0x05; 20]);

        let mut ledger = TokenPaymaster::new(&mut storage);
        ledger.initialize(ADMIN, Address::ZERO).unwrap();
        ledger
            .set_token_support(
                ADMIN,
                ITokenPaymaster::setTokenSupportCall {
                    token,
                    supported: true,
                },
            )
            .unwrap();
        ledger
            .set_oracle(ADMIN, ITokenPaymaster::setOracleCall { oracle: ORACLE_ID })
            .unwrap();
        ledger
            .deposit(ITokenPaymaster::depositCall {
                token,
                account: owner,
                amount: U256::from(10_000),
            })
            .unwrap();
        ledger
            .set_allowance(
                owner,
                ITokenPaymaster::setAllowanceCall {
                    spender: sender,
                    token,
                    amount: U256::from(5_000),
                },
            )
            .unwrap();

        let op_hash = keccak256(b"token-userop-2");
        let deadline = U256::from(now + 60);
        let digest = ledger.charge_digest(owner, session_key, token, op_hash, deadline);
        let signature = signer.sign_hash_sync(&digest).unwrap().as_bytes();

        // no grant anywhere; with no registry configured the signature,
        // deadline, and nonce are the whole gate
        let op = SponsoredOp {
            sender,
            call_data: Bytes::new(),
            paymaster_data: session_key_payload(
                token,
                U256::from(3_000),
                owner,
                session_key,
                deadline,
                &signature,
            ),
        };
        let charge = ledger
            .validate_op(&op, op_hash, U256::from(3), &oracle)
            .unwrap();
        assert_eq!(charge.payer, owner);
        assert_eq!(ledger.balance_of(owner, token), U256::from(7_000));
        assert_eq!(ledger.charge_nonce(owner, session_key), 1);
    }

    #[test]
    fn test_rejected_charge_leaves_nonce_untouched() {
        let mut storage = HashMapStorageProvider::new(1);
        let now = storage.timestamp();
        let token = Address::from([0x11; 20]);
        let oracle = FixedRateOracle::new().with_rate(token, 1000, 1);

        let signer = PrivateKeySigner::random();
        let session_key = signer.address();
        let owner = Address::from([0x01; 20]);
        let sender = Address::from([0x05; 20]);

        let mut ledger = TokenPaymaster::new(&mut storage);
        ledger.initialize(ADMIN, Address::ZERO).unwrap();
        ledger
            .set_token_support(
                ADMIN,
                ITokenPaymaster::setTokenSupportCall {
                    token,
                    supported: true,
                },
            )
            .unwrap();
        ledger
            .set_oracle(ADMIN, ITokenPaymaster::setOracleCall { oracle: ORACLE_ID })
            .unwrap();

        let op_hash = keccak256(b"token-userop-3");
        let deadline = U256::from(now + 60);
        let digest = ledger.charge_digest(owner, session_key, token, op_hash, deadline);
        let signature = signer.sign_hash_sync(&digest).unwrap().as_bytes();

        let op = SponsoredOp {
            sender,
            call_data: Bytes::new(),
            paymaster_data: session_key_payload(
                token,
                U256::from(3_000),
                owner,
                session_key,
                deadline,
                &signature,
            ),
        };

        // unfunded owner
        assert_eq!(
            token_err(ledger.validate_op(&op, op_hash, U256::from(3), &oracle)),
            TokenPaymasterError::insufficient_token_balance()
        );
        assert_eq!(ledger.charge_nonce(owner, session_key), 0);

        // funded, but no allowance for the op sender
        ledger
            .deposit(ITokenPaymaster::depositCall {
                token,
                account: owner,
                amount: U256::from(10_000),
            })
            .unwrap();
        assert_eq!(
            token_err(ledger.validate_op(&op, op_hash, U256::from(3), &oracle)),
            TokenPaymasterError::insufficient_token_allowance()
        );
        assert_eq!(ledger.charge_nonce(owner, session_key), 0);

        // the signature remains usable once the owner approves the sender
        ledger
            .set_allowance(
                owner,
                ITokenPaymaster::setAllowanceCall {
                    spender: sender,
                    token,
                    amount: U256::from(5_000),
                },
            )
            .unwrap();
        ledger
            .validate_op(&op, op_hash, U256::from(3), &oracle)
            .unwrap();
        assert_eq!(ledger.charge_nonce(owner, session_key), 1);
    }
}
