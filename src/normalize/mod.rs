//! Raw card text to [`Offer`] records.

pub mod dates;
pub mod terms;
pub mod text;

use std::collections::HashSet;

use chrono::NaiveDate;
use tracing::{debug, warn};

use crate::error::OfferError;
use crate::models::{Bank, CardInfo, DedupeKey, Offer, RawOffer};

/// Per-scope facts that are not on the card itself.
#[derive(Debug, Clone)]
pub struct OfferContext {
    pub holder: String,
    pub card: CardInfo,
    pub local_keywords: Vec<String>,
}

impl OfferContext {
    pub fn new(bank: Bank, holder: impl Into<String>) -> Self {
        Self {
            holder: holder.into(),
            card: CardInfo::unknown(bank),
            local_keywords: Vec::new(),
        }
    }
}

/// Dedupe keys already present in the sheet or produced earlier in the run.
#[derive(Debug, Default, Clone)]
pub struct SeenOffers {
    keys: HashSet<DedupeKey>,
}

impl SeenOffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &DedupeKey) -> bool {
        self.keys.contains(key)
    }

    /// Returns `false` when the key was already present.
    pub fn insert(&mut self, key: DedupeKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl FromIterator<DedupeKey> for SeenOffers {
    fn from_iter<T: IntoIterator<Item = DedupeKey>>(iter: T) -> Self {
        Self {
            keys: iter.into_iter().collect(),
        }
    }
}

/// A normalized offer together with the card it came from.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub raw: RawOffer,
    pub offer: Offer,
    /// The key is already in the sheet or was written earlier in the run.
    pub recorded: bool,
}

/// Outcome of normalizing one scrape, in page order.
#[derive(Debug, Default)]
pub struct NormalizedBatch {
    pub candidates: Vec<Candidate>,
    pub failures: Vec<OfferError>,
}

impl NormalizedBatch {
    /// Candidates whose key has no row yet.
    pub fn fresh(&self) -> impl Iterator<Item = &Candidate> {
        self.candidates.iter().filter(|c| !c.recorded)
    }

    pub fn duplicates(&self) -> usize {
        self.candidates.iter().filter(|c| c.recorded).count()
    }
}

pub struct Normalizer {
    bank: Bank,
    today: NaiveDate,
    context: OfferContext,
}

impl Normalizer {
    pub fn new(bank: Bank, today: NaiveDate, context: OfferContext) -> Self {
        Self {
            bank,
            today,
            context,
        }
    }

    pub fn normalize(&self, raw: &RawOffer) -> Result<Offer, OfferError> {
        let text = text::decode_entities(&raw.text);
        let heading = raw.heading.as_deref().map(text::clean);

        let merchant = terms::infer_merchant(heading.as_deref(), &text).ok_or_else(|| {
            OfferError::MissingMerchant {
                text: raw.fingerprint.clone(),
            }
        })?;
        let description = terms::describe(&text, &merchant);

        let mut offer = Offer::new(self.bank, merchant, description, self.today)
            .with_holder(self.context.holder.clone())
            .with_card(self.context.card.clone())
            .with_enrolled(raw.enrolled);

        if let Some((amount, category)) = terms::parse_reward(&text) {
            offer.amount = Some(amount);
            offer.category = category;
        }
        offer.max_discount = terms::parse_max_discount(&text, offer.amount.as_ref());
        offer.min_spend = terms::parse_min_spend(&text);
        offer.local = terms::is_local(&text, &self.context.local_keywords);
        offer.expiration = raw
            .expiration_text
            .as_deref()
            .and_then(|t| dates::parse_expiration_field(t, self.today))
            .or_else(|| dates::find_expiration(&text, self.today));

        Ok(offer)
    }

    /// Normalize every raw card and flag the ones whose key is in `seen` or
    /// repeats an earlier card of the same scrape. Flagged cards are still
    /// returned: whether to click depends on the card, whether to write a
    /// row depends on the key.
    pub fn normalize_new(&self, raws: Vec<RawOffer>, seen: &SeenOffers) -> NormalizedBatch {
        let mut batch = NormalizedBatch::default();
        let mut this_scrape = HashSet::new();
        for raw in raws {
            let offer = match self.normalize(&raw) {
                Ok(offer) => offer,
                Err(err) => {
                    warn!(bank = %self.bank, error = %err, "Skipping offer");
                    batch.failures.push(err);
                    continue;
                }
            };
            let repeat = !this_scrape.insert(offer.dedupe_key().clone());
            let recorded = repeat || seen.contains(offer.dedupe_key());
            if recorded {
                debug!(key = %offer.dedupe_key(), "Already recorded");
            }
            batch.candidates.push(Candidate {
                raw,
                offer,
                recorded,
            });
        }
        batch
    }
}

/// Fill in terms found on a detail page opened during enrollment. Values
/// already parsed from the card win.
pub fn apply_terms(offer: &mut Offer, detail: &str, today: NaiveDate, local_keywords: &[String]) {
    let detail = text::decode_entities(detail);
    if offer.amount.is_none() {
        if let Some((amount, category)) = terms::parse_reward(&detail) {
            offer.amount = Some(amount);
            offer.category = category;
        }
    }
    if offer.max_discount.is_none() {
        offer.max_discount = terms::parse_max_discount(&detail, offer.amount.as_ref());
    }
    if offer.min_spend.is_none() {
        offer.min_spend = terms::parse_min_spend(&detail);
    }
    if offer.expiration.is_none() {
        offer.expiration = dates::find_expiration(&detail, today);
    }
    offer.local = offer.local || terms::is_local(&detail, local_keywords);
}
