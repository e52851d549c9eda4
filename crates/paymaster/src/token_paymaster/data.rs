//! Typed decoder for the token ledger's authorization payload.
//!
//! Same envelope shape as the base-asset ledger: 20 bytes naming the
//! ledger, one mode byte, then the mode's fields, with the full length
//! validated before any field is read.

use alloy::primitives::{Address, Bytes, U256};
use patron_contracts::TokenPaymasterError;

use crate::Result;

/// Decoded authorization payload for the token ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenPaymasterData {
    /// Mode 0: the operation's sender pays its own gas in `token`, bounded
    /// by `max_token_cost`.
    Token {
        token: Address,
        max_token_cost: U256,
    },
    /// Mode 1: a session key charges the owner's token balance, authorized
    /// by a `SessionKeyTokenUserOp` signature.
    SessionKey {
        token: Address,
        max_token_cost: U256,
        owner: Address,
        session_key: Address,
        deadline: U256,
        signature: Bytes,
    },
}

impl TokenPaymasterData {
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 21 {
            return Err(TokenPaymasterError::invalid_paymaster_data().into());
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
                let token = consume(20).ok_or(TokenPaymasterError::invalid_paymaster_data())?;
                let max_cost = consume(32).ok_or(TokenPaymasterError::invalid_paymaster_data())?;
                Ok(Self::Token {
                    token: Address::from_slice(token),
                    max_token_cost: U256::from_be_slice(max_cost),
                })
            }
            1 => {
                let mut field = |n: usize| -> Result<&[u8]> {
                    consume(n).ok_or(TokenPaymasterError::invalid_session_key().into())
                };
                let token = Address::from_slice(field(20)?);
                let max_token_cost = U256::from_be_slice(field(32)?);
                let owner = Address::from_slice(field(20)?);
                let session_key = Address::from_slice(field(20)?);
                let deadline = U256::from_be_slice(field(32)?);
                let signature = Bytes::copy_from_slice(field(65)?);
                Ok(Self::SessionKey {
                    token,
                    max_token_cost,
                    owner,
                    session_key,
                    deadline,
                    signature,
                })
            }
            _ => Err(TokenPaymasterError::invalid_paymaster_data().into()),
        }
    }
}
