//! CLI argument definitions.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::builder::PossibleValuesParser;
use clap::{Parser, Subcommand, ValueEnum};
use homebase_store::SortOrder;
use homebase_sync::features::FEATURE_NAMES;

/// Homebase -- sync your omg.lol address data to a local cache.
#[derive(Parser)]
#[command(
    name = "homebase",
    version,
    about = "Homebase -- local cache for your omg.lol addresses",
    long_about = "Signs in to omg.lol, keeps the selected address's statuses, \
                  purls, pastes, weblog, pics and now page in a local database, \
                  and clears everything on logout."
)]
pub struct Cli {
    /// Config file (defaults to config/default.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Account email for the account endpoints.
    #[arg(long, global = true)]
    pub email: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in.  Without arguments, prints the authorization URL.
    Login {
        /// Authorization code returned to the redirect URI.
        #[arg(long, conflicts_with = "token")]
        code: Option<String>,

        /// The `state` value returned alongside the code.
        #[arg(long, requires = "code")]
        state: Option<String>,

        /// Use an existing API key instead of the OAuth flow.
        #[arg(long)]
        token: Option<String>,
    },

    /// Sign out and clear every local cache.
    Logout,

    /// Show login state, account, addresses and cache counts.
    Status,

    /// Select the address the features sync.
    Address {
        /// One of the account's addresses.
        name: String,
    },

    /// Fetch a feature's items for the selected address.
    Sync {
        #[arg(value_parser = PossibleValuesParser::new(FEATURE_NAMES.iter().copied()))]
        feature: String,
    },

    /// Print a feature's cached items for the selected address.
    List {
        #[arg(value_parser = PossibleValuesParser::new(FEATURE_NAMES.iter().copied()))]
        feature: String,

        #[arg(long, value_enum, default_value_t = Sort::Newest)]
        sort: Sort,
    },

    /// Delete an item on the server and from the cache.
    Delete {
        #[arg(value_parser = PossibleValuesParser::new(FEATURE_NAMES.iter().copied()))]
        feature: String,

        /// Item id (paste title, purl name, status id, ...).
        id: String,
    },
}

/// Listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Sort {
    Newest,
    Oldest,
    Id,
}

impl From<Sort> for SortOrder {
    fn from(sort: Sort) -> Self {
        match sort {
            Sort::Newest => SortOrder::Newest,
            Sort::Oldest => SortOrder::Oldest,
            Sort::Id => SortOrder::ById,
        }
    }
}
