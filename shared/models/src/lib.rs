//! Domain types shared by the Cyber Security Shield crates.
//!
//! - [`event`]: append-only security events and their aggregates
//! - [`alert`]: stateful alerts and their lifecycle
//! - [`auth`]: accounts, lockout state, credentials and JWT claims
//! - [`security`]: read models served by the dashboard endpoints

use thiserror::Error;

/// Returned when a wire string does not name a known enum variant.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

impl ParseEnumError {
    pub(crate) fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Implements `as_str`, `Display` and `FromStr` for a unit enum using its
/// snake_case wire names. The same names are used in storage columns.
macro_rules! wire_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($ty::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name),+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::ParseEnumError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($name => Ok($ty::$variant),)+
                    other => Err($crate::ParseEnumError::new($kind, other)),
                }
            }
        }
    };
}

pub mod alert;
pub mod auth;
pub mod event;
pub mod security;

pub use alert::*;
pub use auth::*;
pub use event::*;
pub use security::*;

