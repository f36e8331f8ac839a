//! Account, address selection and the composed session.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One address (handle) owned by an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAddress {
    pub address: String,
    pub created_at: DateTime<Utc>,
    /// `None` for addresses that never expire.
    pub expires_at: Option<DateTime<Utc>>,
}

impl AccountAddress {
    pub fn new(address: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            address: address.into(),
            created_at,
            expires_at: None,
        }
    }

    pub fn expiring(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// The signed-in user's profile and the addresses they own.
///
/// Address strings are unique within an account; duplicates are dropped on
/// construction and on deserialization, keeping the first occurrence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AccountRecord")]
pub struct CurrentAccount {
    name: String,
    email: String,
    created_at: DateTime<Utc>,
    addresses: Vec<AccountAddress>,
}

#[derive(Deserialize)]
struct AccountRecord {
    name: String,
    email: String,
    created_at: DateTime<Utc>,
    #[serde(default)]
    addresses: Vec<AccountAddress>,
}

impl From<AccountRecord> for CurrentAccount {
    fn from(record: AccountRecord) -> Self {
        Self::new(record.name, record.email, record.created_at, record.addresses)
    }
}

impl CurrentAccount {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        created_at: DateTime<Utc>,
        addresses: Vec<AccountAddress>,
    ) -> Self {
        let mut unique: Vec<AccountAddress> = Vec::with_capacity(addresses.len());
        for address in addresses {
            if !unique.iter().any(|a| a.address == address.address) {
                unique.push(address);
            }
        }
        Self {
            name: name.into(),
            email: email.into(),
            created_at,
            addresses: unique,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Owned addresses in server order.
    pub fn addresses(&self) -> &[AccountAddress] {
        &self.addresses
    }

    pub fn first_address(&self) -> Option<&str> {
        self.addresses.first().map(|a| a.address.as_str())
    }

    pub fn owns(&self, address: &str) -> bool {
        self.addresses.iter().any(|a| a.address == address)
    }
}

/// Whether an account has been synchronized from the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Account {
    #[default]
    NotSynchronized,
    Present(CurrentAccount),
}

impl Account {
    pub fn as_present(&self) -> Option<&CurrentAccount> {
        match self {
            Self::Present(account) => Some(account),
            Self::NotSynchronized => None,
        }
    }
}

/// The address the user is currently working with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Address {
    #[default]
    NotSet,
    Selected(String),
}

impl Address {
    pub fn selected(&self) -> Option<&str> {
        match self {
            Self::Selected(address) => Some(address),
            Self::NotSet => None,
        }
    }

    pub fn is_set(&self) -> bool {
        matches!(self, Self::Selected(_))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selected(address) => f.write_str(address),
            Self::NotSet => f.write_str("(none)"),
        }
    }
}

/// Projection of [`Account`] and [`Address`]: available only when both are
/// set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Session {
    #[default]
    NotAvailable,
    Available {
        account: CurrentAccount,
        address: String,
    },
}

impl Session {
    pub fn compose(account: &Account, address: &Address) -> Self {
        match (account, address) {
            (Account::Present(account), Address::Selected(address)) => Self::Available {
                account: account.clone(),
                address: address.clone(),
            },
            _ => Self::NotAvailable,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available { .. })
    }
}
