//! Base-asset sponsorship ledger.
//!
//! Sponsors deposit the base asset and let spenders draw it down for gas.
//! Charging is pessimistic: [`SponsorPaymaster::validate_op`] debits the
//! full cost ceiling up front and [`SponsorPaymaster::post_op`] refunds the
//! unused surplus, or everything if the wrapped call reverted. The
//! dispatcher guarantees the two phases run as one atomic operation.

use alloy::primitives::{Address, IntoLogData, B256, U256};
use alloy::sol_types::SolStruct;
use patron_contracts::{
    ISponsorPaymaster, SessionKeyUserOp, SponsorPaymasterError, SponsorPaymasterEvent,
    SPONSOR_PAYMASTER_ADDRESS,
};

use crate::{
    calls, eip712,
    entry_point::EntryPointReserve,
    nonces,
    session_keys::SessionKeyRegistry,
    storage::{
        slots::{address_to_word, double_mapping_slot, mapping_slot, word_to_address},
        StorageProvider,
    },
    Result, SponsoredOp,
};

mod data;
pub use data::SponsorPaymasterData;

mod slots {
    use alloy::primitives::U256;

    use crate::storage::slots::to_u256;

    pub(super) const ADMIN: U256 = to_u256(0);
    // registry address consulted in session-key mode; zero disables mode 1
    pub(super) const REGISTRY: U256 = to_u256(1);
    // balances[sponsor] -> U256
    pub(super) const BALANCES: U256 = to_u256(2);
    // allowanceAmount[sponsor][spender] -> U256
    pub(super) const ALLOWANCE_AMOUNT: U256 = to_u256(3);
    // allowanceUnlimited[sponsor][spender] -> bool
    pub(super) const ALLOWANCE_UNLIMITED: U256 = to_u256(4);
    // chargeNonces[owner][sessionKey] -> u64
    pub(super) const CHARGE_NONCES: U256 = to_u256(5);
}

/// A spender's draw-down right against one sponsor. `Unlimited` is never
/// decremented or restored by charges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Allowance {
    Unlimited,
    Limited(U256),
}

/// Which validation branch produced a charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeKind {
    /// Mode 0: the sponsor named inline pays for the operation's sender.
    Sponsor,
    /// Mode 1: a session key charged the sponsor on the owner's behalf.
    SessionKey {
        owner: Address,
        session_key: Address,
    },
}

/// Opaque context handed from `validate_op` to the matching `post_op`.
/// Never persisted beyond one validate/settle pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingCharge {
    pub kind: ChargeKind,
    pub sponsor: Address,
    pub spender: Address,
    pub pre_charged: U256,
    pub allowance_debited: U256,
    pub op_hash: B256,
}

/// Base-asset sponsorship ledger contract.
#[derive(Debug)]
pub struct SponsorPaymaster<'a, S: StorageProvider> {
    address: Address,
    storage: &'a mut S,
}

impl<'a, S: StorageProvider> SponsorPaymaster<'a, S> {
    pub fn new(storage: &'a mut S) -> Self {
        Self {
            address: SPONSOR_PAYMASTER_ADDRESS,
            storage,
        }
    }

    /// One-time setup of the admin identity and the registry consulted in
    /// session-key mode (zero to disable mode 1).
    pub fn initialize(&mut self, admin: Address, registry: Address) -> Result<()> {
        if admin.is_zero() {
            return Err(SponsorPaymasterError::zero_address().into());
        }
        if !self.storage.sload(self.address, slots::ADMIN).is_zero() {
            return Err(SponsorPaymasterError::unauthorized().into());
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
            return Err(SponsorPaymasterError::unauthorized().into());
        }
        Ok(())
    }

    pub fn domain_separator(&mut self) -> B256 {
        eip712::domain_separator("SponsorPaymaster", self.storage.chain_id(), self.address)
    }

    fn balance_slot(account: Address) -> U256 {
        mapping_slot(account, slots::BALANCES)
    }

    pub fn balance_of(&mut self, account: Address) -> U256 {
        let slot = Self::balance_slot(account);
        self.storage.sload(self.address, slot)
    }

    fn set_balance(&mut self, account: Address, amount: U256) {
        self.storage
            .sstore(self.address, Self::balance_slot(account), amount);
    }

    /// Credit `call.amount` to `call.account`'s sponsor balance.
    pub fn deposit(&mut self, call: ISponsorPaymaster::depositCall) -> Result<()> {
        if call.account.is_zero() {
            return Err(SponsorPaymasterError::zero_address().into());
        }
        if call.amount.is_zero() {
            return Err(SponsorPaymasterError::zero_amount().into());
        }

        let balance = self.balance_of(call.account);
        let updated = balance
            .checked_add(call.amount)
            .ok_or_else(|| crate::PatronError::Fatal("sponsor balance overflow".into()))?;
        self.set_balance(call.account, updated);

        self.storage.emit_event(
            self.address,
            SponsorPaymasterEvent::Deposited(ISponsorPaymaster::Deposited {
                sponsor: call.account,
                amount: call.amount,
            })
            .into_log_data(),
        );
        Ok(())
    }

    pub fn withdraw(
        &mut self,
        msg_sender: Address,
        call: ISponsorPaymaster::withdrawCall,
    ) -> Result<()> {
        if call.amount.is_zero() {
            return Err(SponsorPaymasterError::zero_amount().into());
        }
        self.withdraw_amount(msg_sender, call.amount)
    }

    pub fn withdraw_all(&mut self, msg_sender: Address) -> Result<()> {
        let balance = self.balance_of(msg_sender);
        self.withdraw_amount(msg_sender, balance)
    }

    fn withdraw_amount(&mut self, msg_sender: Address, amount: U256) -> Result<()> {
        let balance = self.balance_of(msg_sender);
        if balance < amount {
            return Err(SponsorPaymasterError::insufficient_balance().into());
        }
        self.set_balance(msg_sender, balance - amount);

        self.storage.emit_event(
            self.address,
            SponsorPaymasterEvent::Withdrawn(ISponsorPaymaster::Withdrawn {
                sponsor: msg_sender,
                amount,
            })
            .into_log_data(),
        );
        Ok(())
    }

    fn allowance_slots(sponsor: Address, spender: Address) -> (U256, U256) {
        (
            double_mapping_slot(sponsor, spender, slots::ALLOWANCE_AMOUNT),
            double_mapping_slot(sponsor, spender, slots::ALLOWANCE_UNLIMITED),
        )
    }

    pub fn allowance(&mut self, sponsor: Address, spender: Address) -> Allowance {
        let (amount_slot, unlimited_slot) = Self::allowance_slots(sponsor, spender);
        if !self.storage.sload(self.address, unlimited_slot).is_zero() {
            Allowance::Unlimited
        } else {
            Allowance::Limited(self.storage.sload(self.address, amount_slot))
        }
    }

    fn store_allowance(&mut self, sponsor: Address, spender: Address, allowance: Allowance) {
        let (amount_slot, unlimited_slot) = Self::allowance_slots(sponsor, spender);
        let (amount, unlimited) = match allowance {
            Allowance::Unlimited => (U256::ZERO, U256::ONE),
            Allowance::Limited(amount) => (amount, U256::ZERO),
        };
        self.storage.sstore(self.address, amount_slot, amount);
        self.storage.sstore(self.address, unlimited_slot, unlimited);
    }

    fn emit_allowance_updated(&mut self, sponsor: Address, spender: Address, allowance: Allowance) {
        let (amount, unlimited) = match allowance {
            Allowance::Unlimited => (U256::ZERO, true),
            Allowance::Limited(amount) => (amount, false),
        };
        self.storage.emit_event(
            self.address,
            SponsorPaymasterEvent::AllowanceUpdated(ISponsorPaymaster::AllowanceUpdated {
                sponsor,
                spender,
                amount,
                unlimited,
            })
            .into_log_data(),
        );
    }

    pub fn set_allowance(
        &mut self,
        msg_sender: Address,
        call: ISponsorPaymaster::setAllowanceCall,
    ) -> Result<()> {
        if call.spender.is_zero() {
            return Err(SponsorPaymasterError::zero_address().into());
        }
        let allowance = Allowance::Limited(call.amount);
        self.store_allowance(msg_sender, call.spender, allowance);
        self.emit_allowance_updated(msg_sender, call.spender, allowance);
        Ok(())
    }

    pub fn set_unlimited_allowance(
        &mut self,
        msg_sender: Address,
        call: ISponsorPaymaster::setUnlimitedAllowanceCall,
    ) -> Result<()> {
        if call.spender.is_zero() {
            return Err(SponsorPaymasterError::zero_address().into());
        }
        self.store_allowance(msg_sender, call.spender, Allowance::Unlimited);
        self.emit_allowance_updated(msg_sender, call.spender, Allowance::Unlimited);
        Ok(())
    }

    /// No-op on an unlimited allowance.
    pub fn increase_allowance(
        &mut self,
        msg_sender: Address,
        call: ISponsorPaymaster::increaseAllowanceCall,
    ) -> Result<()> {
        if call.spender.is_zero() {
            return Err(SponsorPaymasterError::zero_address().into());
        }
        if let Allowance::Limited(current) = self.allowance(msg_sender, call.spender) {
            let updated = current
                .checked_add(call.amount)
                .ok_or_else(|| crate::PatronError::Fatal("allowance overflow".into()))?;
            let allowance = Allowance::Limited(updated);
            self.store_allowance(msg_sender, call.spender, allowance);
            self.emit_allowance_updated(msg_sender, call.spender, allowance);
        }
        Ok(())
    }

    /// Clamps at zero instead of underflowing. No-op on an unlimited
    /// allowance.
    pub fn decrease_allowance(
        &mut self,
        msg_sender: Address,
        call: ISponsorPaymaster::decreaseAllowanceCall,
    ) -> Result<()> {
        if call.spender.is_zero() {
            return Err(SponsorPaymasterError::zero_address().into());
        }
        if let Allowance::Limited(current) = self.allowance(msg_sender, call.spender) {
            let allowance = Allowance::Limited(current.saturating_sub(call.amount));
            self.store_allowance(msg_sender, call.spender, allowance);
            self.emit_allowance_updated(msg_sender, call.spender, allowance);
        }
        Ok(())
    }

    fn charge_nonce_slot(owner: Address, session_key: Address) -> U256 {
        double_mapping_slot(owner, session_key, slots::CHARGE_NONCES)
    }

    /// Ledger-local charge-authorization nonce, independent of the
    /// registry's usage nonce.
    pub fn charge_nonce(&mut self, owner: Address, session_key: Address) -> u64 {
        let slot = Self::charge_nonce_slot(owner, session_key);
        nonces::load(self.storage, self.address, slot)
    }

    /// Digest a session key must sign to authorize one gas charge at the
    /// current charge nonce.
    pub fn charge_digest(
        &mut self,
        owner: Address,
        session_key: Address,
        op_hash: B256,
        deadline: U256,
    ) -> B256 {
        let nonce = self.charge_nonce(owner, session_key);
        let struct_hash = SessionKeyUserOp {
            owner,
            sessionKey: session_key,
            opHash: op_hash,
            nonce,
            deadline,
        }
        .eip712_hash_struct();
        eip712::signing_digest(self.domain_separator(), struct_hash)
    }

    /// Validation phase: decode the authorization payload, resolve who pays
    /// and who spends, then pre-debit the full `max_cost` from the sponsor
    /// (and from a bounded allowance when sponsor and spender differ).
    pub fn validate_op(
        &mut self,
        op: &SponsoredOp,
        op_hash: B256,
        max_cost: U256,
    ) -> Result<PendingCharge> {
        let (kind, sponsor, spender, nonce_slot) =
            match SponsorPaymasterData::decode(&op.paymaster_data)? {
                SponsorPaymasterData::Sponsor { sponsor } => {
                    (ChargeKind::Sponsor, sponsor, op.sender, None)
                }
                SponsorPaymasterData::SessionKey {
                    owner,
                    session_key,
                    sponsor,
                    deadline,
                    signature,
                } => {
                    if U256::from(self.storage.timestamp()) > deadline {
                        return Err(SponsorPaymasterError::signature_expired().into());
                    }

                    let digest = self.charge_digest(owner, session_key, op_hash, deadline);
                    match eip712::recover_signer(&digest, &signature) {
                        Some(signer) if signer == session_key => {}
                        _ => return Err(SponsorPaymasterError::invalid_signature().into()),
                    }

                    // Scope check applies only when a registry is wired; an
                    // unconfigured registry leaves mode 1 gated by signature,
                    // nonce, and deadline alone.
                    let registry =
                        word_to_address(self.storage.sload(self.address, slots::REGISTRY));
                    if !registry.is_zero() {
                        let decoded = calls::unwrap_execute(&op.call_data);
                        let scoped = SessionKeyRegistry::new(&mut *self.storage).validate(
                            patron_contracts::ISessionKeyRegistry::validateCall {
                                owner,
                                sessionKey: session_key,
                                target: decoded.target,
                                selector: decoded.selector,
                                value: U256::ZERO,
                            },
                        );
                        if !scoped {
                            return Err(SponsorPaymasterError::invalid_session_key().into());
                        }
                    }

                    (
                        ChargeKind::SessionKey { owner, session_key },
                        sponsor,
                        owner,
                        Some(Self::charge_nonce_slot(owner, session_key)),
                    )
                }
            };

        if sponsor.is_zero() {
            return Err(SponsorPaymasterError::zero_address().into());
        }

        let balance = self.balance_of(sponsor);
        if balance < max_cost {
            return Err(SponsorPaymasterError::insufficient_balance().into());
        }

        let allowance_debited = if sponsor != spender {
            match self.allowance(sponsor, spender) {
                Allowance::Unlimited => U256::ZERO,
                Allowance::Limited(amount) if amount >= max_cost => max_cost,
                Allowance::Limited(_) => {
                    return Err(SponsorPaymasterError::insufficient_allowance().into())
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
            if let Allowance::Limited(amount) = self.allowance(sponsor, spender) {
                self.store_allowance(
                    sponsor,
                    spender,
                    Allowance::Limited(amount - allowance_debited),
                );
            }
        }
        self.set_balance(sponsor, balance - max_cost);

        Ok(PendingCharge {
            kind,
            sponsor,
            spender,
            pre_charged: max_cost,
            allowance_debited,
            op_hash,
        })
    }

    /// Settlement phase: refund the pre-charge surplus, or the whole
    /// pre-charge if the wrapped call reverted, and emit the payment event
    /// on success.
    pub fn post_op(
        &mut self,
        charge: PendingCharge,
        actual_cost: U256,
        op_reverted: bool,
    ) -> Result<()> {
        let refund = if op_reverted {
            charge.pre_charged
        } else {
            charge.pre_charged.saturating_sub(actual_cost)
        };
        if !refund.is_zero() {
            let balance = self.balance_of(charge.sponsor);
            let updated = balance
                .checked_add(refund)
                .ok_or_else(|| crate::PatronError::Fatal("sponsor balance overflow".into()))?;
            self.set_balance(charge.sponsor, updated);
        }

        let restore = if op_reverted {
            charge.allowance_debited
        } else {
            charge.allowance_debited.saturating_sub(actual_cost)
        };
        if !restore.is_zero() {
            if let Allowance::Limited(amount) = self.allowance(charge.sponsor, charge.spender) {
                self.store_allowance(
                    charge.sponsor,
                    charge.spender,
                    Allowance::Limited(amount.saturating_add(restore)),
                );
            }
        }

        if !op_reverted {
            let event = match charge.kind {
                ChargeKind::Sponsor => {
                    SponsorPaymasterEvent::GasPaid(ISponsorPaymaster::GasPaid {
                        opHash: charge.op_hash,
                        sponsor: charge.sponsor,
                        spender: charge.spender,
                        actualCost: actual_cost,
                    })
                }
                ChargeKind::SessionKey { owner, session_key } => {
                    SponsorPaymasterEvent::SessionKeyGasPaid(ISponsorPaymaster::SessionKeyGasPaid {
                        opHash: charge.op_hash,
                        owner,
                        sessionKey: session_key,
                        sponsor: charge.sponsor,
                        actualCost: actual_cost,
                    })
                }
            };
            self.storage.emit_event(self.address, event.into_log_data());
        }

        Ok(())
    }

    /// Fund the ledger's own gas reserve held with the dispatcher. Open to
    /// anyone, like `deposit`.
    pub fn fund_reserve(&mut self, entry_point: &mut dyn EntryPointReserve, amount: U256) {
        entry_point.deposit_to(self.address, amount);
    }

    pub fn reserve_balance(&mut self, entry_point: &dyn EntryPointReserve) -> U256 {
        entry_point.balance_of(self.address)
    }

    pub fn withdraw_reserve(
        &mut self,
        msg_sender: Address,
        entry_point: &mut dyn EntryPointReserve,
        to: Address,
        amount: U256,
    ) -> Result<()> {
        self.require_admin(msg_sender)?;
        if to.is_zero() {
            return Err(SponsorPaymasterError::zero_address().into());
        }
        if !entry_point.withdraw_to(self.address, to, amount) {
            return Err(SponsorPaymasterError::insufficient_balance().into());
        }
        Ok(())
    }

    pub fn add_stake(
        &mut self,
        msg_sender: Address,
        entry_point: &mut dyn EntryPointReserve,
        amount: U256,
        unstake_delay_secs: u32,
    ) -> Result<()> {
        self.require_admin(msg_sender)?;
        entry_point.add_stake(self.address, amount, unstake_delay_secs);
        Ok(())
    }

    pub fn unlock_stake(
        &mut self,
        msg_sender: Address,
        entry_point: &mut dyn EntryPointReserve,
    ) -> Result<()> {
        self.require_admin(msg_sender)?;
        entry_point.unlock_stake(self.address);
        Ok(())
    }

    pub fn withdraw_stake(
        &mut self,
        msg_sender: Address,
        entry_point: &mut dyn EntryPointReserve,
        to: Address,
    ) -> Result<()> {
        self.require_admin(msg_sender)?;
        if to.is_zero() {
            return Err(SponsorPaymasterError::zero_address().into());
        }
        entry_point.withdraw_stake(self.address, to);
        Ok(())
    }
}
