//! Reward, spend and merchant extraction from offer card text.

use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use super::text::{clean_lines, collapse_whitespace, parse_decimal};
use crate::models::{Amount, RewardCategory};

const MONEY: &str = r"\$\s?(\d[\d,]*(?:\.\d{1,2})?)";

static PERCENT_SUFFIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(\d{1,3}(?:\.\d+)?)\s*%\s*(?:cash\s*)?(back|off)\b").expect("valid regex")
});

static DOLLARS_SUFFIXED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i){MONEY}\s*(?:cash\s*|statement\s*credit\s*)?(back|off)\b"))
        .expect("valid regex")
});

static POINTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(\d[\d,]*)\s+(?:bonus\s+)?(?:membership\s+rewards®?\s+|thankyou®?\s+|ultimate\s+rewards®?\s+)?points?\b",
    )
    .expect("valid regex")
});

static BARE_PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3}(?:\.\d+)?)\s*%").expect("valid regex"));

static EARN_DOLLARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:earn|get|receive)\s+(?:a\s+|an?\s+)?(?:one-time\s+)?{MONEY}"))
        .expect("valid regex")
});

static MAX_DISCOUNT: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        Regex::new(&format!(r"(?i){MONEY}\s*(?:cash\s*back\s*)?(?:maximum|max)\b")),
        Regex::new(&format!(r"(?i)\bmax(?:imum)?\b[^$]{{0,25}}{MONEY}")),
        Regex::new(&format!(r"(?i)\btotal\s+of\s*{MONEY}")),
    ]
    .map(|r| r.expect("valid regex"))
});

static UP_TO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i)\bup\s+to\s*{MONEY}")).expect("valid regex"));

static MIN_SPEND: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b(?:spend|purchase)[^$]{{0,25}}{MONEY}")).expect("valid regex")
});

static LOCATION_NOTICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)offer\s+only\s+applies\s+to\s+the\s+following\s+locations?")
        .expect("valid regex")
});

static STREET_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\n\d{2,5}\s+.+\n[A-Za-z\s]+,\s*[A-Z]{2}\s+\d{5}").expect("valid regex")
});

static AT_MERCHANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bat\s+([A-Z0-9][^,;.\n(]*)").expect("valid regex"));

static MERCHANT_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+(?:exp\b|expires?\b|through\b|thru\b|until\b|when\b|with\b|on\s+purchases?\b|online\b).*$")
        .expect("valid regex")
});

static NOISE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:new|online|in[- ]store|in[- ]store\s*(?:&|and)\s*online|added|add(?:\s+to\s+card)?|add\s+offer|activate(?:\s+offer)?|enrolled|terms\s+apply|view\s+details|see\s+details|details|offer|expiring\s+soon|ends\s+soon|\+|✓)$|^exp(?:ires?|\.)?\b|^\d{1,3}\s+days?\b|^(?:spend|earn|get|receive|enjoy)\b",
    )
    .expect("valid regex")
});

/// Reward amount and category, in priority order.
pub fn parse_reward(text: &str) -> Option<(Amount, Option<RewardCategory>)> {
    if let Some(caps) = PERCENT_SUFFIXED.captures(text) {
        let value = parse_decimal(&caps[1])?;
        return Some((Amount::Percent(value), Some(category_for(&caps[2]))));
    }
    if let Some(caps) = DOLLARS_SUFFIXED.captures(text) {
        let value = parse_decimal(&caps[1])?;
        return Some((Amount::Dollars(value), Some(category_for(&caps[2]))));
    }
    if let Some(caps) = POINTS.captures(text) {
        let value = parse_decimal(&caps[1])?;
        return Some((Amount::Points(value), Some(RewardCategory::Points)));
    }
    if let Some(caps) = BARE_PERCENT.captures(text) {
        let value = parse_decimal(&caps[1])?;
        return Some((Amount::Percent(value), None));
    }
    if let Some(caps) = EARN_DOLLARS.captures(text) {
        let value = parse_decimal(&caps[1])?;
        return Some((Amount::Dollars(value), Some(RewardCategory::CashBack)));
    }
    None
}

fn category_for(suffix: &str) -> RewardCategory {
    if suffix.eq_ignore_ascii_case("off") {
        RewardCategory::Discount
    } else {
        RewardCategory::CashBack
    }
}

pub fn looks_like_reward(line: &str) -> bool {
    PERCENT_SUFFIXED.is_match(line)
        || DOLLARS_SUFFIXED.is_match(line)
        || POINTS.is_match(line)
        || BARE_PERCENT.is_match(line)
        || EARN_DOLLARS.is_match(line)
}

/// Cap on the reward. Percent offers also honour a bare "up to $N".
pub fn parse_max_discount(text: &str, amount: Option<&Amount>) -> Option<Decimal> {
    let capped = MAX_DISCOUNT
        .iter()
        .find_map(|re| re.captures(text))
        .and_then(|caps| parse_decimal(&caps[1]));
    if capped.is_some() {
        return capped;
    }
    match amount {
        Some(Amount::Percent(_)) => UP_TO.captures(text).and_then(|caps| parse_decimal(&caps[1])),
        _ => None,
    }
}

pub fn parse_min_spend(text: &str) -> Option<Decimal> {
    MIN_SPEND
        .captures(text)
        .and_then(|caps| parse_decimal(&caps[1]))
}

/// Offer limited to physical locations: an explicit notice, a street
/// address block, or one of the configured keywords.
pub fn is_local(text: &str, keywords: &[String]) -> bool {
    if LOCATION_NOTICE.is_match(text) || STREET_ADDRESS.is_match(text) {
        return true;
    }
    let lower = text.to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .any(|k| !k.is_empty() && lower.contains(&k))
}

/// The line that best describes the reward: the longest reward-looking line,
/// else every non-noise line joined.
pub fn describe(text: &str, merchant: &str) -> String {
    let lines = clean_lines(text);
    if let Some(line) = lines
        .iter()
        .filter(|l| looks_like_reward(l))
        .max_by_key(|l| l.chars().count())
    {
        return line.clone();
    }

    let merchant = collapse_whitespace(merchant).to_lowercase();
    lines
        .iter()
        .filter(|l| !is_noise(l) && l.to_lowercase() != merchant)
        .cloned()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Merchant name: heading, then an "at <Merchant>" phrase, then the first
/// plausible line of the card.
pub fn infer_merchant(heading: Option<&str>, text: &str) -> Option<String> {
    if let Some(name) = heading
        .map(collapse_whitespace)
        .filter(|h| is_plausible_merchant(h))
    {
        return Some(name);
    }

    if let Some(name) = AT_MERCHANT
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| MERCHANT_TAIL.replace(m.as_str(), "").trim().to_string())
        .find(|name| is_plausible_merchant(name))
    {
        return Some(name);
    }

    clean_lines(text)
        .into_iter()
        .take(6)
        .find(|line| is_plausible_merchant(line))
}

fn is_plausible_merchant(s: &str) -> bool {
    let len = s.chars().count();
    (2..=80).contains(&len)
        && s.chars().any(char::is_alphabetic)
        && !looks_like_reward(s)
        && !is_noise(s)
}

fn is_noise(line: &str) -> bool {
    NOISE_LINE.is_match(line.trim())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn percent_back_is_cash_back() {
        let (amount, category) = parse_reward("Earn 10% cash back on dining").unwrap();
        assert_eq!(amount, Amount::Percent(dec("10")));
        assert_eq!(category, Some(RewardCategory::CashBack));
    }

    #[test]
    fn dollars_off_is_discount() {
        let (amount, category) = parse_reward("$25 off your order of $100+").unwrap();
        assert_eq!(amount, Amount::Dollars(dec("25")));
        assert_eq!(category, Some(RewardCategory::Discount));
    }

    #[test]
    fn points_offers() {
        let (amount, category) =
            parse_reward("Spend $50, earn 5,000 Membership Rewards® points").unwrap();
        assert_eq!(amount, Amount::Points(dec("5000")));
        assert_eq!(category, Some(RewardCategory::Points));
    }

    #[test]
    fn earn_dollars_without_suffix() {
        let (amount, _) = parse_reward("Spend $200 or more, earn a $40 statement credit").unwrap();
        assert_eq!(amount, Amount::Dollars(dec("40")));
    }

    #[test]
    fn no_reward_in_plain_text() {
        assert_eq!(parse_reward("Acme Coffee"), None);
    }

    #[test]
    fn spend_thresholds() {
        let text = "Spend $50 or more, earn $10 back, up to a total of $30";
        assert_eq!(parse_min_spend(text), Some(dec("50")));
        assert_eq!(parse_max_discount(text, None), Some(dec("30")));
        assert_eq!(
            parse_max_discount("$15 cash back max", None),
            Some(dec("15"))
        );
    }

    #[test]
    fn up_to_only_caps_percent_rewards() {
        let percent = Amount::Percent(dec("5"));
        let dollars = Amount::Dollars(dec("5"));
        assert_eq!(
            parse_max_discount("5% back up to $25", Some(&percent)),
            Some(dec("25"))
        );
        assert_eq!(parse_max_discount("Earn up to $5 back", Some(&dollars)), None);
    }

    #[test]
    fn local_detection() {
        assert!(is_local(
            "Offer only applies to the following location:\n123 Main St",
            &[]
        ));
        assert!(is_local(
            "Joe's Diner\n1234 Market Street\nPhiladelphia, PA 19103",
            &[]
        ));
        assert!(is_local("Valid in Philadelphia stores", &["philadelphia".into()]));
        assert!(!is_local("Shop online at Acme", &["philadelphia".into()]));
    }

    #[test]
    fn merchant_from_heading_first() {
        assert_eq!(
            infer_merchant(Some("  Acme   Coffee "), "15% back").as_deref(),
            Some("Acme Coffee")
        );
    }

    #[test]
    fn merchant_from_at_phrase() {
        assert_eq!(
            infer_merchant(None, "15% back at Acme Coffee, exp 12/31/2025").as_deref(),
            Some("Acme Coffee")
        );
        assert_eq!(
            infer_merchant(None, "10% back at Blue Bottle through Dec 31").as_deref(),
            Some("Blue Bottle")
        );
    }

    #[test]
    fn merchant_from_first_plausible_line() {
        let text = "New\nAcme Coffee\n10% cash back\nExpires in 5 days";
        assert_eq!(infer_merchant(None, text).as_deref(), Some("Acme Coffee"));
    }

    #[test]
    fn reward_heading_is_not_a_merchant() {
        assert_eq!(infer_merchant(Some("10% back"), "10% back\n$5 off"), None);
    }

    #[test]
    fn description_prefers_longest_reward_line() {
        let text = "Acme Coffee\n5% back\nSpend $20, earn 5% back up to $10\nExpires in 3 days";
        assert_eq!(describe(text, "Acme Coffee"), "Spend $20, earn 5% back up to $10");
    }

    #[test]
    fn description_falls_back_to_non_noise_lines() {
        let text = "Acme Coffee\nMember exclusive\nAdd to card";
        assert_eq!(describe(text, "Acme Coffee"), "Member exclusive");
    }
}
