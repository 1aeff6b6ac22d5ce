//! Deterministic recovery of applicant identities from recognized text.
//!
//! Every page of a scanned bundle carries a printed header with the
//! applicant's name and UCAS Personal ID. Recognition is noisy, so a
//! single match proves nothing; an id only counts once it recurs across
//! enough headers. The grammar is pure: the same fragments always yield
//! the same entries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::ocr::TextFragment;
use crate::record::{BoundingBox, PoolEntry};

// Pre-compiled patterns for the two printed header forms
static RE_ID_AFTER_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"UCAS Personal ID:?\s*([0-9]+)").unwrap());
static RE_NAME_BEFORE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([^\s].*)\s+([0-9]+)\s+UCAS Personal ID").unwrap());

/// Name used when an id was consistent but no name was ever captured
/// alongside it.
pub const UNKNOWN_NAME: &str = "Unknown";

/// The recognized lines of one page, tagged with its 1-based number.
#[derive(Debug, Clone)]
pub struct PageFragments {
    pub page: u32,
    pub fragments: Vec<TextFragment>,
}

#[derive(Default)]
struct IdTally {
    count: u32,
    pages: BTreeSet<u32>,
    first_seen: Option<BoundingBox>,
    names: BTreeMap<String, u32>,
}

impl IdTally {
    /// Most frequent captured name; ties break lexicographically.
    fn best_name(&self) -> String {
        let mut best: Option<(&String, u32)> = None;
        for (name, &count) in &self.names {
            match best {
                Some((_, best_count)) if count <= best_count => {}
                _ => best = Some((name, count)),
            }
        }
        best.map(|(name, _)| name.clone())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string())
    }
}

/// Applies the header grammar and elects consistent entries.
pub struct EntryExtractor {
    min_id_matches: u32,
}

impl EntryExtractor {
    pub fn new(min_id_matches: u32) -> Self {
        Self { min_id_matches }
    }

    /// Tallies header matches across all pages and returns one entry per
    /// id that reached the consistency threshold, sorted by id.
    pub fn extract(&self, pages: &[PageFragments]) -> Vec<PoolEntry> {
        let mut tallies: BTreeMap<String, IdTally> = BTreeMap::new();
        let mut total_matches = 0u32;

        for page in pages {
            for fragment in &page.fragments {
                for (id, name) in header_matches(&fragment.text) {
                    total_matches += 1;
                    let tally = tallies.entry(id).or_default();
                    tally.count += 1;
                    tally.pages.insert(page.page);
                    if tally.first_seen.is_none() {
                        tally.first_seen = Some(fragment.bbox);
                    }
                    if let Some(name) = name {
                        *tally.names.entry(name).or_insert(0) += 1;
                    }
                }
            }
        }

        tallies
            .into_iter()
            .filter(|(_, tally)| tally.count >= self.min_id_matches)
            .map(|(id, tally)| PoolEntry {
                applicant_id: id,
                name: tally.best_name(),
                total_matches,
                consistent_matches: tally.count,
                pages: tally.pages.into_iter().collect(),
                first_seen: tally.first_seen,
            })
            .collect()
    }
}

/// Matches one recognized line against both header forms.
///
/// `UCAS Personal ID: 123...` yields an id alone; `Bloggs, Jane 123...
/// UCAS Personal ID` yields the id plus the name printed left of it.
fn header_matches(line: &str) -> Vec<(String, Option<String>)> {
    let mut matches = Vec::new();
    if let Some(caps) = RE_NAME_BEFORE_ID.captures(line) {
        matches.push((caps[2].to_string(), Some(caps[1].trim().to_string())));
    }
    if let Some(caps) = RE_ID_AFTER_LABEL.captures(line) {
        matches.push((caps[1].to_string(), None));
    }
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(text: &str) -> TextFragment {
        TextFragment {
            text: text.to_string(),
            bbox: BoundingBox {
                x: 100,
                y: 50,
                width: 900,
                height: 40,
            },
        }
    }

    fn page(page: u32, lines: &[&str]) -> PageFragments {
        PageFragments {
            page,
            fragments: lines.iter().map(|l| fragment(l)).collect(),
        }
    }

    #[test]
    fn test_header_matches_id_form() {
        let matches = header_matches("UCAS Personal ID: 1484723695");
        assert_eq!(matches, vec![("1484723695".to_string(), None)]);

        // Colon is optional and spacing varies with recognition quality.
        let matches = header_matches("UCAS Personal ID 1484723695");
        assert_eq!(matches[0].0, "1484723695");
    }

    #[test]
    fn test_header_matches_name_form() {
        let matches = header_matches("Bloggs, Jane 1484723695 UCAS Personal ID");
        assert_eq!(
            matches,
            vec![(
                "1484723695".to_string(),
                Some("Bloggs, Jane".to_string())
            )]
        );
    }

    #[test]
    fn test_header_matches_name_with_digits() {
        // A greedy name capture keeps digit words inside the name and
        // associates the id with the run directly before the label.
        let matches = header_matches("Flat 221 Baker St Jane Bloggs 1484723695 UCAS Personal ID");
        assert_eq!(matches[0].0, "1484723695");
        assert_eq!(
            matches[0].1.as_deref(),
            Some("Flat 221 Baker St Jane Bloggs")
        );
    }

    #[test]
    fn test_header_matches_plain_line() {
        assert!(header_matches("Personal statement, page 3 of 5").is_empty());
    }

    #[test]
    fn test_extract_single_consistent_entry() {
        let extractor = EntryExtractor::new(3);
        let pages = vec![
            page(1, &["Bloggs, Jane 1484723695 UCAS Personal ID", "body text"]),
            page(2, &["UCAS Personal ID: 1484723695"]),
            page(3, &["Bloggs, Jane 1484723695 UCAS Personal ID"]),
        ];

        let entries = extractor.extract(&pages);
        assert_eq!(entries.len(), 1);

        let entry = &entries[0];
        assert_eq!(entry.applicant_id, "1484723695");
        assert_eq!(entry.name, "Bloggs, Jane");
        assert_eq!(entry.consistent_matches, 3);
        assert_eq!(entry.total_matches, 3);
        assert_eq!(entry.pages, vec![1, 2, 3]);
        assert_eq!(entry.first_seen.unwrap().x, 100);
    }

    #[test]
    fn test_extract_below_threshold_yields_nothing() {
        let extractor = EntryExtractor::new(3);
        let pages = vec![
            page(1, &["UCAS Personal ID: 1484723695"]),
            page(2, &["UCAS Personal ID: 1484723695"]),
        ];

        assert!(extractor.extract(&pages).is_empty());
    }

    #[test]
    fn test_extract_noise_ids_count_into_total_only() {
        let extractor = EntryExtractor::new(3);
        let pages = vec![
            page(1, &["UCAS Personal ID: 1111111111"]),
            page(2, &["UCAS Personal ID: 1111111111"]),
            page(3, &["UCAS Personal ID: 1111111111"]),
            // Misread digit produces a one-off id.
            page(4, &["UCAS Personal ID: 7111111111"]),
        ];

        let entries = extractor.extract(&pages);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].applicant_id, "1111111111");
        assert_eq!(entries[0].consistent_matches, 3);
        assert_eq!(entries[0].total_matches, 4);
    }

    #[test]
    fn test_extract_name_election_majority() {
        let extractor = EntryExtractor::new(3);
        let pages = vec![
            page(1, &["Bloggs, Jane 42 UCAS Personal ID"]),
            page(2, &["B1oggs, Jane 42 UCAS Personal ID"]),
            page(3, &["Bloggs, Jane 42 UCAS Personal ID"]),
        ];

        let entries = extractor.extract(&pages);
        assert_eq!(entries[0].name, "Bloggs, Jane");
    }

    #[test]
    fn test_extract_name_election_tie_is_lexicographic() {
        let extractor = EntryExtractor::new(2);
        let pages = vec![
            page(1, &["Zed Alpha 42 UCAS Personal ID"]),
            page(2, &["Ada Alpha 42 UCAS Personal ID"]),
        ];

        let entries = extractor.extract(&pages);
        assert_eq!(entries[0].name, "Ada Alpha");
    }

    #[test]
    fn test_extract_unknown_name_fallback() {
        let extractor = EntryExtractor::new(3);
        let pages = vec![
            page(1, &["UCAS Personal ID: 42"]),
            page(2, &["UCAS Personal ID: 42"]),
            page(3, &["UCAS Personal ID: 42"]),
        ];

        let entries = extractor.extract(&pages);
        assert_eq!(entries[0].name, UNKNOWN_NAME);
    }

    #[test]
    fn test_extract_multiple_applicants_sorted_by_id() {
        let extractor = EntryExtractor::new(2);
        let pages = vec![
            page(1, &["Young, Zoe 2222222222 UCAS Personal ID"]),
            page(2, &["Young, Zoe 2222222222 UCAS Personal ID"]),
            page(3, &["Abbot, Ann 1111111111 UCAS Personal ID"]),
            page(4, &["Abbot, Ann 1111111111 UCAS Personal ID"]),
        ];

        let entries = extractor.extract(&pages);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].applicant_id, "1111111111");
        assert_eq!(entries[1].applicant_id, "2222222222");
        // Document-wide match count is shared by every entry.
        assert_eq!(entries[0].total_matches, 4);
        assert_eq!(entries[1].total_matches, 4);
    }

    #[test]
    fn test_extract_is_pure() {
        let extractor = EntryExtractor::new(2);
        let pages = vec![
            page(1, &["Bloggs, Jane 42 UCAS Personal ID"]),
            page(2, &["UCAS Personal ID: 42"]),
        ];

        assert_eq!(extractor.extract(&pages), extractor.extract(&pages));
    }
}
