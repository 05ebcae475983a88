use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Reward value parsed out of offer text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Amount {
    /// "15% back" -> 15
    Percent(Decimal),
    /// "$20 back" -> 20
    Dollars(Decimal),
    /// "Earn 5,000 points" -> 5000
    Points(Decimal),
}

impl Amount {
    pub fn value(&self) -> Decimal {
        match self {
            Amount::Percent(v) | Amount::Dollars(v) | Amount::Points(v) => *v,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Amount::Percent(v) => write!(f, "{}%", v.normalize()),
            Amount::Dollars(v) => write!(f, "{}", format_dollars(*v)),
            Amount::Points(v) => write!(f, "{} points", v.normalize()),
        }
    }
}

/// "$20" for whole amounts, "$7.50" otherwise.
pub fn format_dollars(value: Decimal) -> String {
    if value.fract().is_zero() {
        format!("${}", value.trunc().normalize())
    } else {
        let mut cents = value.round_dp(2);
        cents.rescale(2);
        format!("${cents}")
    }
}

/// How the reward is paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RewardCategory {
    CashBack,
    Discount,
    Points,
}

impl RewardCategory {
    pub fn label(&self) -> &'static str {
        match self {
            RewardCategory::CashBack => "Cash back",
            RewardCategory::Discount => "Discount",
            RewardCategory::Points => "Points",
        }
    }
}

impl fmt::Display for RewardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
