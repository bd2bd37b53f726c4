use crate::backend::ArchiveReader;
use crate::suggest::SuggestionMatcher;
use crate::types::{ArchiveId, SearchResult, SnippetMode};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

/// How candidates are produced for each archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchStrategy {
    /// The archive's full-text index, topped up with
    /// [`SearchStrategy::FuzzyTitle`] suggestions when it returns too few
    /// hits. Archives without an index use suggestions only.
    #[default]
    FullText,
    /// Titles starting with the query.
    TitlePrefix,
    /// Titles closest to the query by edit distance.
    FuzzyTitle,
}

/// Everything a search task needs to know about what to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Query text as typed
    pub query: String,
    /// Archives to search; identifiers that are not open are ignored
    pub archives: BTreeSet<ArchiveId>,
    /// Candidate source
    pub strategy: SearchStrategy,
    /// Snippet shape; [`SnippetMode::Disabled`] skips extraction
    pub snippet: SnippetMode,
    /// Candidates requested from each archive
    pub limit: usize,
}

impl SearchRequest {
    /// Full-text request without snippets.
    pub fn new(query: impl Into<String>, archives: impl IntoIterator<Item = ArchiveId>) -> Self {
        Self {
            query: query.into(),
            archives: archives.into_iter().collect(),
            strategy: SearchStrategy::FullText,
            snippet: SnippetMode::Disabled,
            limit: 100,
        }
    }

    /// Use `strategy` for every archive.
    #[must_use]
    pub const fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Extract snippets shaped by `mode`.
    #[must_use]
    pub const fn with_snippet(mut self, mode: SnippetMode) -> Self {
        self.snippet = mode;
        self
    }

    /// Request at most `limit` candidates per archive.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Score of the title-prefix hit at `rank` (0-based): in `(1, 2]`, so prefix
/// hits always outrank edit-distance suggestions.
#[allow(clippy::cast_precision_loss)]
pub fn prefix_score(rank: usize) -> f32 {
    1.0 + 1.0 / (1.0 + rank as f32)
}

impl SearchStrategy {
    /// Ranked candidates from one archive.
    pub(crate) fn candidates(
        self,
        archive: ArchiveId,
        reader: &dyn ArchiveReader,
        query: &str,
        limit: usize,
        matcher: &SuggestionMatcher,
    ) -> crate::Result<Vec<SearchResult>> {
        match self {
            Self::FullText if reader.has_full_text_index() => {
                let mut results: Vec<SearchResult> = reader
                    .full_text_search(query, limit)?
                    .into_iter()
                    .map(|hit| SearchResult {
                        archive,
                        path: hit.path,
                        title: hit.title,
                        score: hit.score,
                        snippet: None,
                    })
                    .collect();

                // Thin index results are topped up with title suggestions
                if results.len() < matcher.full_text_fallback_below() && results.len() < limit {
                    let seen: HashSet<String> = results.iter().map(|r| r.path.clone()).collect();
                    let wanted = limit - results.len();
                    let fuzzy = Self::FuzzyTitle.candidates(archive, reader, query, limit, matcher)?;
                    results.extend(
                        fuzzy
                            .into_iter()
                            .filter(|r| !seen.contains(&r.path))
                            .take(wanted),
                    );
                }
                Ok(results)
            },
            Self::TitlePrefix => Ok(reader
                .title_prefix_search(query.trim(), limit)?
                .into_iter()
                .enumerate()
                .map(|(rank, hit)| SearchResult {
                    archive,
                    path: hit.path,
                    title: hit.title,
                    score: prefix_score(rank),
                    snippet: None,
                })
                .collect()),
            Self::FullText | Self::FuzzyTitle => Ok(matcher
                .suggest_from(reader, query, limit)?
                .into_iter()
                .map(|s| SearchResult {
                    archive,
                    score: s.score(),
                    path: s.path,
                    title: s.title,
                    snippet: None,
                })
                .collect()),
        }
    }
}
