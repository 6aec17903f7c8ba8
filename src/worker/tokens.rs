//! Pending reply tokens.
//!
//! At most one continuation is registered per token; resolving removes it,
//! so a second reply for the same token finds nothing and has no effect.

use std::collections::HashMap;
use std::time::Instant;

use crate::runtime::ids::ReplyToken;

/// Token bookkeeping errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Token {0} is already pending")]
    Duplicate(ReplyToken),
}

#[derive(Debug)]
struct Pending<T> {
    continuation: T,
    deadline: Option<Instant>,
}

/// Map of outstanding tokens to their continuations.
#[derive(Debug)]
pub struct PendingTokens<T> {
    pending: HashMap<ReplyToken, Pending<T>>,
}

impl<T> Default for PendingTokens<T> {
    fn default() -> Self {
        Self {
            pending: HashMap::new(),
        }
    }
}

impl<T> PendingTokens<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a continuation, optionally failing after `deadline`.
    pub fn register(
        &mut self,
        token: ReplyToken,
        continuation: T,
        deadline: Option<Instant>,
    ) -> Result<(), TokenError> {
        if self.pending.contains_key(&token) {
            return Err(TokenError::Duplicate(token));
        }
        self.pending.insert(
            token,
            Pending {
                continuation,
                deadline,
            },
        );
        Ok(())
    }

    /// Take the continuation for `token`. Unknown or expired tokens yield `None`.
    pub fn resolve(
        &mut self,
        token: &ReplyToken,
    ) -> Option<T> {
        self.pending.remove(token).map(|p| p.continuation)
    }

    /// Remove and return every entry whose deadline is at or before `now`.
    pub fn expire(
        &mut self,
        now: Instant,
    ) -> Vec<(ReplyToken, T)> {
        let expired: Vec<ReplyToken> = self
            .pending
            .iter()
            .filter(|(_, p)| p.deadline.is_some_and(|d| d <= now))
            .map(|(token, _)| token.clone())
            .collect();
        expired
            .into_iter()
            .filter_map(|token| {
                let pending = self.pending.remove(&token)?;
                Some((token, pending.continuation))
            })
            .collect()
    }

    /// Drop entries whose continuation fails `keep`.
    pub fn retain(
        &mut self,
        mut keep: impl FnMut(&T) -> bool,
    ) {
        self.pending.retain(|_, p| keep(&p.continuation));
    }

    #[inline]
    pub fn contains(
        &self,
        token: &ReplyToken,
    ) -> bool {
        self.pending.contains_key(token)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}
