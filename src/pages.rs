//! Page-range expressions: `all`, `5`, `3-15`, `1-3,5,9-10`.
//!
//! Parsing and resolving are split. [`PageRange::from_str`] checks the
//! grammar without knowing the document, so a config can be rejected before
//! any bytes are read; [`PageRange::resolve`] checks bounds against the real
//! page count and produces zero-based indices.

use crate::error::ConvertError;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// A parsed page-selection expression (1-indexed, as typed by users).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PageRange {
    /// Every page in the document.
    #[default]
    All,
    /// Comma-separated singles and inclusive ranges, in input order.
    Items(Vec<RangeItem>),
}

/// One comma-separated token of a [`PageRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeItem {
    /// A single 1-indexed page.
    Single(usize),
    /// An inclusive 1-indexed range; `start <= end` is guaranteed by parsing.
    Span(usize, usize),
}

impl FromStr for PageRange {
    type Err = ConvertError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(malformed(expression, "expression is empty"));
        }
        if trimmed.eq_ignore_ascii_case("all") {
            return Ok(PageRange::All);
        }

        let mut items = Vec::new();
        for token in trimmed.split(',') {
            let token = token.trim();
            if token.is_empty() {
                return Err(malformed(expression, "empty token between commas"));
            }

            let item = match token.split_once('-') {
                Some((start, end)) => {
                    let start = parse_page(expression, start)?;
                    let end = parse_page(expression, end)?;
                    if start > end {
                        return Err(malformed(
                            expression,
                            format!("range start {start} is after end {end}"),
                        ));
                    }
                    RangeItem::Span(start, end)
                }
                None => RangeItem::Single(parse_page(expression, token)?),
            };
            items.push(item);
        }

        Ok(PageRange::Items(items))
    }
}

impl fmt::Display for PageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageRange::All => f.write_str("all"),
            PageRange::Items(items) => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    match item {
                        RangeItem::Single(p) => write!(f, "{p}")?,
                        RangeItem::Span(s, e) => write!(f, "{s}-{e}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

impl PageRange {
    /// Expand into a strictly ascending list of distinct 0-indexed pages.
    ///
    /// Any page outside `1..=total_pages` is an error rather than being
    /// silently dropped.
    pub fn resolve(&self, total_pages: usize) -> Result<Vec<usize>, ConvertError> {
        let items = match self {
            PageRange::All => return Ok((0..total_pages).collect()),
            PageRange::Items(items) => items,
        };

        let mut indices = BTreeSet::new();
        for item in items {
            let (start, end) = match *item {
                RangeItem::Single(p) => (p, p),
                RangeItem::Span(s, e) => (s, e),
            };
            if end > total_pages {
                return Err(malformed(
                    &self.to_string(),
                    format!("page {end} is out of range (document has {total_pages} pages)"),
                ));
            }
            indices.extend((start - 1)..end);
        }

        Ok(indices.into_iter().collect())
    }
}

/// Parse `expression` and resolve it against `total_pages` in one step.
pub fn resolve_page_range(expression: &str, total_pages: usize) -> Result<Vec<usize>, ConvertError> {
    expression.parse::<PageRange>()?.resolve(total_pages)
}

fn parse_page(expression: &str, token: &str) -> Result<usize, ConvertError> {
    let token = token.trim();
    let page: usize = token
        .parse()
        .map_err(|_| malformed(expression, format!("'{token}' is not a page number")))?;
    if page == 0 {
        return Err(malformed(expression, "pages are 1-indexed, minimum is 1"));
    }
    Ok(page)
}

fn malformed(expression: &str, reason: impl Into<String>) -> ConvertError {
    ConvertError::MalformedRange {
        expression: expression.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_selects_every_page() {
        for total in [0, 1, 7, 40] {
            let expected: Vec<usize> = (0..total).collect();
            assert_eq!(resolve_page_range("all", total).unwrap(), expected);
        }
        assert_eq!(resolve_page_range("  ALL ", 3).unwrap(), vec![0, 1, 2]);
        assert_eq!(resolve_page_range("All", 2).unwrap(), vec![0, 1]);
    }

    #[test]
    fn mixed_ranges_and_singles() {
        assert_eq!(resolve_page_range("1-3,5", 6).unwrap(), vec![0, 1, 2, 4]);
    }

    #[test]
    fn duplicates_collapse_and_sort() {
        assert_eq!(
            resolve_page_range("5, 2-4, 3, 1", 5).unwrap(),
            vec![0, 1, 2, 3, 4]
        );
        assert_eq!(resolve_page_range("2,2,2", 3).unwrap(), vec![1]);
    }

    #[test]
    fn reversed_range_is_rejected() {
        let err = resolve_page_range("3-1", 6).unwrap_err();
        assert!(matches!(err, ConvertError::MalformedRange { .. }), "got {err:?}");
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        assert!(matches!(
            resolve_page_range("7", 6),
            Err(ConvertError::MalformedRange { .. })
        ));
        assert!(matches!(
            resolve_page_range("4-9", 6),
            Err(ConvertError::MalformedRange { .. })
        ));
        assert!(matches!(
            resolve_page_range("0", 6),
            Err(ConvertError::MalformedRange { .. })
        ));
    }

    #[test]
    fn garbage_is_rejected() {
        for expr in ["", "   ", "1,,2", "a", "1-", "-3", "1-2-3", "2.5", "1;2"] {
            assert!(
                matches!(
                    expr.parse::<PageRange>(),
                    Err(ConvertError::MalformedRange { .. })
                ),
                "expected '{expr}' to be rejected"
            );
        }
    }

    #[test]
    fn display_round_trips_canonical_form() {
        let range: PageRange = " 1 - 3 , 5 ".parse().unwrap();
        assert_eq!(range.to_string(), "1-3,5");
        assert_eq!(PageRange::All.to_string(), "all");
    }
}
