//! String identifiers shared across the runtime and the worker protocol.
//!
//! All of them are opaque on the host side: the scheduler compares and
//! echoes them but never interprets their contents.

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier.
            #[inline]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the identifier text.
            #[inline]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Unwrap into the identifier text.
            #[inline]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl From<&str> for $name {
            fn from(val: &str) -> Self {
                Self(val.to_string())
            }
        }

        impl From<String> for $name {
            fn from(val: String) -> Self {
                Self(val)
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(
                &self,
                f: &mut std::fmt::Formatter<'_>,
            ) -> std::fmt::Result {
                write!(f, concat!($label, "({})"), self.0)
            }
        }
    };
}

string_id!(
    /// Handle of one live thread, assigned at registration time.
    ThreadId,
    "Thread"
);

string_id!(
    /// Id of a registered script body (one per code fragment in a batch).
    ScriptId,
    "Script"
);

string_id!(
    /// Id of a sprite, clone or the stage.
    TargetId,
    "Target"
);

string_id!(
    /// Correlation token pairing a request with its single reply.
    ReplyToken,
    "Token"
);

/// Monotonic token source.
///
/// Tokens are `<prefix>-<n>` and never repeat for the lifetime of the
/// generator, so a token can never be reused while it is pending.
#[derive(Debug)]
pub struct TokenGenerator {
    prefix: String,
    next: u64,
}

impl TokenGenerator {
    /// Create a new generator; `prefix` keeps both sides of a channel apart.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }

    /// Produce the next token.
    pub fn next_token(&mut self) -> ReplyToken {
        let n = self.next;
        self.next += 1;
        ReplyToken(format!("{}-{}", self.prefix, n))
    }

    /// Number of tokens handed out so far.
    #[inline]
    pub fn issued(&self) -> u64 {
        self.next
    }
}
