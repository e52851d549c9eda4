//! Typed decoder for the base-asset ledger's authorization payload.
//!
//! Layout: 20 bytes naming the ledger, one mode byte, then the mode's
//! fields. Length is validated against the mode's full shape before any
//! field is read; truncation fails closed.

use alloy::primitives::{Address, Bytes, U256};
use patron_contracts::SponsorPaymasterError;

use crate::Result;

/// Decoded authorization payload for the base-asset ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SponsorPaymasterData {
    /// Mode 0: the named sponsor pays for the operation's sender.
    Sponsor { sponsor: Address },
    /// Mode 1: a session key charges the named sponsor on the owner's
    /// behalf, authorized by a `SessionKeyUserOp` signature.
    SessionKey {
        owner: Address,
        session_key: Address,
        sponsor: Address,
        deadline: U256,
        signature: Bytes,
    },
}

impl SponsorPaymasterData {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 21 {
            return Err(SponsorPaymasterError::invalid_paymaster_data().into());
        }
        let mode = payload[20];
        let mut rest = &payload[21..];
        let mut consume = |n: usize| -> Option<&[u8]> {
            if rest.len() < n {
                return None;
            }
            let (head, tail) = rest.split_at(n);
            rest = tail;
            Some(head)
        };

        match mode {
            0 => {
                let sponsor =
                    consume(20).ok_or(SponsorPaymasterError::invalid_paymaster_data())?;
                Ok(Self::Sponsor {
                    sponsor: Address::from_slice(sponsor),
                })
            }
            1 => {
                let mut field = |n: usize| -> Result<&[u8]> {
                    consume(n).ok_or(SponsorPaymasterError::invalid_session_key().into())
                };
                let owner = Address::from_slice(field(20)?);
                let session_key = Address::from_slice(field(20)?);
                let sponsor = Address::from_slice(field(20)?);
                let deadline = U256::from_be_slice(field(32)?);
                let signature = Bytes::copy_from_slice(field(65)?);
                Ok(Self::SessionKey {
                    owner,
                    session_key,
                    sponsor,
                    deadline,
                    signature,
                })
            }
            _ => Err(SponsorPaymasterError::invalid_paymaster_data().into()),
        }
    }
}
