mod amount;
mod bank;
mod offer;

pub use amount::{format_dollars, Amount, RewardCategory};
pub use bank::{Bank, UnknownBank};
pub use offer::{fingerprint, CardInfo, DedupeKey, Offer, RawOffer, UNKNOWN_LAST_FOUR};
