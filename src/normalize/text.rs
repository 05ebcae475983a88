//! Text cleaning shared by every portal.

use std::str::FromStr;

use rust_decimal::Decimal;

/// Decode the handful of HTML entities that leak through `innerText`.
pub fn decode_entities(s: &str) -> String {
    s.replace("&nbsp;", " ")
        .replace('\u{a0}', " ")
        .replace("&amp;", "&")
        .replace("&#39;", "'")
        .replace("&rsquo;", "’")
}

/// Collapse every whitespace run to one space and trim.
pub fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_space = false;
    for ch in s.chars() {
        if ch.is_whitespace() {
            if !prev_space {
                out.push(' ');
                prev_space = true;
            }
        } else {
            out.push(ch);
            prev_space = false;
        }
    }
    out.trim().to_string()
}

/// Entity decoding plus whitespace collapsing.
pub fn clean(s: &str) -> String {
    collapse_whitespace(&decode_entities(s))
}

/// Non-empty cleaned lines, in order.
pub fn clean_lines(s: &str) -> Vec<String> {
    decode_entities(s)
        .lines()
        .map(collapse_whitespace)
        .filter(|l| !l.is_empty())
        .collect()
}

/// Drop currency symbols and thousands separators: "$1,250.00" -> "1250.00".
pub fn strip_currency(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, '$' | ',' | '€' | '£'))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Parse a bare number that may carry currency decoration.
pub fn parse_decimal(s: &str) -> Option<Decimal> {
    Decimal::from_str(&strip_currency(s)).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_and_trims() {
        assert_eq!(collapse_whitespace("  Acme \n\t Coffee  "), "Acme Coffee");
        assert_eq!(collapse_whitespace(""), "");
    }

    #[test]
    fn decodes_entities_before_collapsing() {
        assert_eq!(clean("Tom&nbsp;&amp;&nbsp;Jerry"), "Tom & Jerry");
        assert_eq!(clean("Caf\u{a0}Bar"), "Caf Bar");
    }

    #[test]
    fn clean_lines_skips_blank_lines() {
        let lines = clean_lines("Acme\n\n   \n 5% back \n");
        assert_eq!(lines, vec!["Acme".to_string(), "5% back".to_string()]);
    }

    #[test]
    fn strips_currency_symbols() {
        assert_eq!(strip_currency("$1,250.00"), "1250.00");
        assert_eq!(parse_decimal("$1,250.00"), Decimal::from_str("1250.00").ok());
        assert_eq!(parse_decimal("about five"), None);
    }
}
