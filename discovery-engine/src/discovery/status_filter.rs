//! Status Code Filter
//!
//! Parses the comma-separated status filter expression (`200,404`, `2xx`, ...).
//! An empty filter defers to the default rule: every status below 400 passes.

use crate::error::StatusFilterError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use tracing::{debug, warn};

lazy_static::lazy_static! {
    static ref RANGE_TOKEN: Regex = Regex::new(r"^(\d)xx$").unwrap();
}

/// Explicit set of allowed status codes; empty means "default rule"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct StatusFilter {
    codes: BTreeSet<u16>,
}

impl StatusFilter {
    /// Parse a filter expression. Any malformed token rejects the whole input.
    pub fn parse(input: &str) -> Result<Self, StatusFilterError> {
        let input = input.trim().to_ascii_lowercase();
        let mut codes = BTreeSet::new();

        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            if part.contains('x') {
                let captures = RANGE_TOKEN
                    .captures(part)
                    .ok_or_else(|| StatusFilterError::InvalidRange(part.to_string()))?;
                let base: u16 = captures[1]
                    .parse()
                    .map_err(|_| StatusFilterError::InvalidRange(part.to_string()))?;
                if !(1..=5).contains(&base) {
                    return Err(StatusFilterError::InvalidRangeBase(part.to_string()));
                }
                codes.extend(base * 100..(base + 1) * 100);
            } else if part.chars().all(|c| c.is_ascii_digit()) {
                let code: u32 = part
                    .parse()
                    .map_err(|_| StatusFilterError::OutOfRange(part.to_string()))?;
                if !(100..=599).contains(&code) {
                    return Err(StatusFilterError::OutOfRange(part.to_string()));
                }
                codes.insert(code as u16);
            } else {
                return Err(StatusFilterError::InvalidToken(part.to_string()));
            }
        }

        if codes.is_empty() {
            debug!("Status code filter empty. Defaulting to allow <400 codes.");
        }
        Ok(Self { codes })
    }

    /// Parse, reverting to the default rule on error. The error is handed back
    /// so the caller can report it.
    pub fn parse_or_default(input: &str) -> (Self, Option<StatusFilterError>) {
        match Self::parse(input) {
            Ok(filter) => (filter, None),
            Err(e) => {
                warn!("Invalid status code input '{}': {}. Reverting to default (<400).", input, e);
                (Self::default(), Some(e))
            }
        }
    }

    /// Whether this filter defers to the default `< 400` rule
    pub fn is_default(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn codes(&self) -> &BTreeSet<u16> {
        &self.codes
    }

    /// Apply the filter to a response status
    pub fn allows(&self, status: u16) -> bool {
        if self.codes.is_empty() {
            status < 400
        } else {
            self.codes.contains(&status)
        }
    }
}

impl fmt::Display for StatusFilter {
    /// Render back to the compact expression form: full hundred-blocks as `Nxx`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tokens = Vec::new();
        let mut base = 1u16;
        while base <= 5 {
            let block = base * 100..(base + 1) * 100;
            if block.clone().all(|c| self.codes.contains(&c)) {
                tokens.push(format!("{}xx", base));
            } else {
                tokens.extend(
                    self.codes
                        .range(block)
                        .map(|c| c.to_string()),
                );
            }
            base += 1;
        }
        f.write_str(&tokens.join(","))
    }
}

impl From<String> for StatusFilter {
    fn from(value: String) -> Self {
        Self::parse_or_default(&value).0
    }
}

impl From<StatusFilter> for String {
    fn from(value: StatusFilter) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_range_and_code() {
        let filter = StatusFilter::parse("2xx,404").unwrap();
        let expected: BTreeSet<u16> = (200..300).chain(std::iter::once(404)).collect();
        assert_eq!(filter.codes(), &expected);
        assert!(filter.allows(204));
        assert!(filter.allows(404));
        assert!(!filter.allows(301));
    }

    #[test]
    fn test_invalid_range_reverts_to_default() {
        assert_eq!(
            StatusFilter::parse("9xx"),
            Err(StatusFilterError::InvalidRangeBase("9xx".to_string()))
        );

        let (filter, error) = StatusFilter::parse_or_default("9xx");
        assert!(filter.is_default());
        assert!(error.is_some());
        assert!(filter.allows(399));
        assert!(!filter.allows(400));
    }

    #[test]
    fn test_empty_is_default() {
        let filter = StatusFilter::parse("").unwrap();
        assert!(filter.is_default());
        assert!(filter.allows(200));
        assert!(!filter.allows(500));

        let filter = StatusFilter::parse(" , ,").unwrap();
        assert!(filter.is_default());
    }

    #[test]
    fn test_malformed_tokens() {
        assert!(matches!(StatusFilter::parse("2x"), Err(StatusFilterError::InvalidRange(_))));
        assert!(matches!(StatusFilter::parse("20xx"), Err(StatusFilterError::InvalidRange(_))));
        assert!(matches!(StatusFilter::parse("700"), Err(StatusFilterError::OutOfRange(_))));
        assert!(matches!(StatusFilter::parse("abc"), Err(StatusFilterError::InvalidToken(_))));
        // One bad token poisons the whole expression
        assert!(StatusFilter::parse("200,oops").is_err());
    }

    #[test]
    fn test_case_and_whitespace() {
        let filter = StatusFilter::parse(" 4XX , 201 ").unwrap();
        assert!(filter.allows(418));
        assert!(filter.allows(201));
        assert!(!filter.allows(200));
    }

    #[test]
    fn test_display_round_trip() {
        let filter = StatusFilter::parse("2xx,404,302").unwrap();
        assert_eq!(filter.to_string(), "2xx,302,404");
        assert_eq!(StatusFilter::parse(&filter.to_string()).unwrap(), filter);
    }

    #[test]
    fn test_serde_lenient() {
        let filter: StatusFilter = serde_json::from_str("\"9xx\"").unwrap();
        assert!(filter.is_default());
        let filter: StatusFilter = serde_json::from_str("\"5xx\"").unwrap();
        assert_eq!(serde_json::to_string(&filter).unwrap(), "\"5xx\"");
    }

    proptest! {
        #[test]
        fn prop_exact_codes_accepted(code in 100u16..=599) {
            let filter = StatusFilter::parse(&code.to_string()).unwrap();
            prop_assert!(filter.allows(code));
            prop_assert_eq!(filter.codes().len(), 1);
        }

        #[test]
        fn prop_out_of_range_rejected(code in prop_oneof![0u32..100, 600u32..100_000]) {
            prop_assert!(StatusFilter::parse(&code.to_string()).is_err());
        }

        #[test]
        fn prop_range_token_covers_block(base in 1u16..=5, offset in 0u16..100) {
            let filter = StatusFilter::parse(&format!("{}xx", base)).unwrap();
            prop_assert!(filter.allows(base * 100 + offset));
            prop_assert_eq!(filter.codes().len(), 100);
        }
    }
}
