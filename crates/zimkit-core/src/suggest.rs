//! Edit-distance title suggestions.
//!
//! Used when the full-text index has nothing to offer: archives without an
//! index, short title searches that came back thin, and explicit fuzzy title
//! searches. Comparison is on normalized text: trimmed, NFKC-normalized and
//! lowercased.

use crate::backend::ArchiveReader;
use crate::config::SuggestConfig;
use crate::registry::ReaderRegistry;
use crate::types::ArchiveId;
use crate::Result;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use unicode_normalization::UnicodeNormalization;

/// One suggested title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    /// Display title
    pub title: String,
    /// Content path
    pub path: String,
    /// Edit distance between the normalized query and title
    pub distance: usize,
}

impl Suggestion {
    /// Relevance in `(0, 1]`, higher for closer titles.
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self) -> f32 {
        1.0 / (1.0 + self.distance as f32)
    }

    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.distance
            .cmp(&other.distance)
            .then_with(|| self.title.chars().count().cmp(&other.title.chars().count()))
            .then_with(|| self.title.cmp(&other.title))
            .then_with(|| self.path.cmp(&other.path))
    }
}

/// Canonical form used for every comparison.
pub fn normalize(text: &str) -> String {
    text.trim().nfkc().collect::<String>().to_lowercase()
}

/// Levenshtein distance between the normalized forms of `a` and `b`.
///
/// ```rust
/// use zimkit_core::suggest::edit_distance;
///
/// assert_eq!(edit_distance("kiwix", "kiwi"), 1);
/// assert_eq!(edit_distance("  Kiwix ", "kiwix"), 0);
/// ```
pub fn edit_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(&normalize(a), &normalize(b))
}

/// Ranks archive titles by edit distance to a query.
#[derive(Debug, Clone)]
pub struct SuggestionMatcher {
    registry: Arc<ReaderRegistry>,
    config: SuggestConfig,
}

impl SuggestionMatcher {
    /// Matcher over the archives in `registry`.
    pub fn new(registry: Arc<ReaderRegistry>, config: &SuggestConfig) -> Self {
        Self {
            registry,
            config: config.clone(),
        }
    }

    /// Up to `limit` titles of archive `id` closest to `query`.
    ///
    /// Ordered by distance, then shorter title, then title, then path.
    ///
    /// # Errors
    ///
    /// [`crate::Error::ArchiveUnavailable`] when `id` is not open.
    pub fn suggest_titles(&self, id: ArchiveId, query: &str, limit: usize) -> Result<Vec<Suggestion>> {
        let lease = self.registry.lease(id)?;
        self.suggest_from(lease.reader()?, query, limit)
    }

    /// Full-text hit count below which an archive's results are topped up
    /// with suggestions.
    pub(crate) const fn full_text_fallback_below(&self) -> usize {
        self.config.full_text_fallback_below
    }

    /// Same as [`SuggestionMatcher::suggest_titles`] on an already leased
    /// reader.
    pub(crate) fn suggest_from(
        &self,
        reader: &dyn ArchiveReader,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Suggestion>> {
        let query = normalize(query);
        if query.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // Large archives are narrowed through the prefix index first
        let candidates = if reader.title_count() > self.config.max_candidates {
            let prefix: String = query.chars().take(self.config.prefix_len.max(1)).collect();
            reader.title_prefix_search(&prefix, self.config.max_candidates)?
        } else {
            reader.titles()
        };

        let mut suggestions: Vec<Suggestion> = candidates
            .into_iter()
            .map(|hit| Suggestion {
                distance: strsim::levenshtein(&query, &normalize(&hit.title)),
                title: hit.title,
                path: hit.path,
            })
            .collect();

        suggestions.sort_by(Suggestion::rank_cmp);
        let mut seen = HashSet::new();
        suggestions.retain(|s| seen.insert(s.path.clone()));
        suggestions.truncate(limit);
        Ok(suggestions)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::{MockArchive, MockBackend};
    use proptest::prelude::*;

    fn matcher(archive: MockArchive, config: SuggestConfig) -> (SuggestionMatcher, ArchiveId) {
        let backend = Arc::new(MockBackend::new().with_archive("/lib/a.zim", archive));
        let registry = Arc::new(ReaderRegistry::new(backend));
        let id = registry.open("/lib/a.zim").unwrap();
        (SuggestionMatcher::new(registry, &config), id)
    }

    fn titles(suggestions: &[Suggestion]) -> Vec<&str> {
        suggestions.iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn test_edit_distance_cases() {
        assert_eq!(edit_distance("kiwix", "kiwi"), 1);
        assert_eq!(edit_distance("abc", "abc"), 0);
        assert_eq!(edit_distance("", "abc"), 3);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("ABC", "abc"), 0);
        assert_eq!(edit_distance("naïve", "naive"), 1);
        // Full-width letters normalize to ASCII
        assert_eq!(edit_distance("ｋｉｗｉｘ", "kiwix"), 0);
    }

    #[test]
    fn test_ranking_and_ties() {
        let archive = MockArchive::new("fruit")
            .with_article("/A/Apple", "Apple", "")
            .with_article("/A/Ample", "Ample", "")
            .with_article("/A/Apples", "Apples", "")
            .with_article("/A/Banana", "Banana", "");
        let (matcher, id) = matcher(archive, SuggestConfig::default());

        let suggestions = matcher.suggest_titles(id, " APPLE ", 10).unwrap();
        assert_eq!(titles(&suggestions), vec!["Apple", "Ample", "Apples", "Banana"]);
        assert_eq!(suggestions[0].distance, 0);
        assert!((suggestions[0].score() - 1.0).abs() < f32::EPSILON);
        assert!((suggestions[1].score() - 0.5).abs() < f32::EPSILON);

        assert_eq!(matcher.suggest_titles(id, "apple", 2).unwrap().len(), 2);
        assert!(matcher.suggest_titles(id, "   ", 10).unwrap().is_empty());
    }

    #[test]
    fn test_large_archives_are_prefix_narrowed() {
        let mut archive = MockArchive::new("big");
        for i in 0..20 {
            archive = archive.with_article(&format!("/A/x{i}"), &format!("Xylophone {i}"), "");
        }
        archive = archive
            .with_article("/A/Apple", "Apple", "")
            .with_article("/A/Bpples", "Bpples", "");
        let config = SuggestConfig {
            max_candidates: 5,
            prefix_len: 1,
            ..SuggestConfig::default()
        };
        let (matcher, id) = matcher(archive, config);

        // "Apple" is closer but does not share the first letter
        let suggestions = matcher.suggest_titles(id, "bpple", 3).unwrap();
        assert_eq!(titles(&suggestions), vec!["Bpples"]);
    }

    #[test]
    fn test_repeated_paths_are_suggested_once() {
        // "/A/Apple" is listed under two titles that rank far apart
        let archive = MockArchive::new("aliases")
            .with_article("/A/Apple", "Apple", "")
            .with_article("/A/Ample", "Ample", "")
            .with_title_alias("/A/Apple", "Malus domestica");
        let (matcher, id) = matcher(archive, SuggestConfig::default());

        let suggestions = matcher.suggest_titles(id, "apple", 10).unwrap();
        assert_eq!(titles(&suggestions), vec!["Apple", "Ample"]);
    }

    #[test]
    fn test_unknown_archive() {
        let (matcher, _) = matcher(MockArchive::new("x"), SuggestConfig::default());
        let err = matcher
            .suggest_titles(ArchiveId::from_content_hash(b"nope"), "q", 1)
            .unwrap_err();
        assert_eq!(err.category(), "unavailable");
    }

    proptest! {
        #[test]
        fn test_distance_is_symmetric(a in "\\PC{0,12}", b in "\\PC{0,12}") {
            prop_assert_eq!(edit_distance(&a, &b), edit_distance(&b, &a));
        }

        #[test]
        fn test_distance_identity(a in "\\PC{0,16}") {
            prop_assert_eq!(edit_distance(&a, &a), 0);
        }

        #[test]
        fn test_triangle_inequality(a in "[a-z]{0,8}", b in "[a-z]{0,8}", c in "[a-z]{0,8}") {
            prop_assert!(edit_distance(&a, &c) <= edit_distance(&a, &b) + edit_distance(&b, &c));
        }
    }
}
