use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Card issuer whose offers portal is automated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum Bank {
    Amex,
    Chase,
    Citi,
}

impl Bank {
    pub const ALL: [Bank; 3] = [Bank::Amex, Bank::Chase, Bank::Citi];

    /// Lowercase identifier used in config tables and profile directory names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Bank::Amex => "amex",
            Bank::Chase => "chase",
            Bank::Citi => "citi",
        }
    }

    /// Name written into the sheet's "Bank" column.
    pub fn display_name(&self) -> &'static str {
        match self {
            Bank::Amex => "Amex",
            Bank::Chase => "Chase",
            Bank::Citi => "Citi",
        }
    }

    /// Prefix for per-bank environment variables, e.g. `CHASE_HOLDER`.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Bank::Amex => "AMEX",
            Bank::Chase => "CHASE",
            Bank::Citi => "CITI",
        }
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown bank {0:?} (expected amex, chase or citi)")]
pub struct UnknownBank(String);

impl FromStr for Bank {
    type Err = UnknownBank;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "amex" | "americanexpress" | "american express" => Ok(Bank::Amex),
            "chase" => Ok(Bank::Chase),
            "citi" | "citibank" => Ok(Bank::Citi),
            _ => Err(UnknownBank(s.to_string())),
        }
    }
}
