use crate::embeddings::cosine_similarity;
use crate::models::{HighlightOptions, IndexablePage, SearchHit, SemanticQuery, TermQuery};
use crate::traits::SearchStore;
use crate::SearchError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Process-local store with the same contracts as the Elasticsearch adapter.
pub struct InMemorySearchStore {
    dimensions: usize,
    highlight: HighlightOptions,
    pages: RwLock<BTreeMap<(i64, u32), IndexablePage>>,
    ensure_calls: AtomicUsize,
}

impl InMemorySearchStore {
    pub fn new(dimensions: usize) -> Self {
        Self::with_highlight(dimensions, HighlightOptions::default())
    }

    pub fn with_highlight(dimensions: usize, highlight: HighlightOptions) -> Self {
        Self {
            dimensions,
            highlight,
            pages: RwLock::new(BTreeMap::new()),
            ensure_calls: AtomicUsize::new(0),
        }
    }

    pub async fn len(&self) -> usize {
        self.pages.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.pages.read().await.is_empty()
    }

    pub async fn page(&self, document_id: i64, page_number: u32) -> Option<IndexablePage> {
        self.pages
            .read()
            .await
            .get(&(document_id, page_number))
            .cloned()
    }

    pub fn ensure_calls(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    fn check_dimensions(&self, actual: usize) -> Result<(), SearchError> {
        if actual != self.dimensions {
            return Err(SearchError::DimensionMismatch {
                expected: self.dimensions,
                actual,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SearchStore for InMemorySearchStore {
    async fn ensure_index(&self) -> Result<(), SearchError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn upsert(&self, page: &IndexablePage) -> Result<(), SearchError> {
        self.check_dimensions(page.embedding.len())?;
        self.pages
            .write()
            .await
            .insert((page.document_id, page.page_number), page.clone());
        Ok(())
    }

    async fn search_by_term(&self, query: &TermQuery) -> Result<Vec<SearchHit>, SearchError> {
        let term = query.term.trim();
        let pages = self.pages.read().await;

        let hits = pages
            .values()
            .filter(|page| query.document_id.map_or(true, |id| page.document_id == id))
            .filter(|page| contains_term(&page.content, term))
            .map(|page| SearchHit {
                document_id: page.document_id,
                document_name: page.document_name.clone(),
                page_number: page.page_number,
                content: highlight_fragments(&page.content, term, &self.highlight).join(" "),
                score: None,
            })
            .collect();

        Ok(hits)
    }

    async fn search_by_semantic(
        &self,
        query: &SemanticQuery,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.check_dimensions(query.embedding.len())?;
        let pages = self.pages.read().await;

        let mut hits: Vec<SearchHit> = pages
            .values()
            .filter(|page| page.document_id == query.document_id)
            .map(|page| SearchHit {
                document_id: page.document_id,
                document_name: page.document_name.clone(),
                page_number: page.page_number,
                content: page.content.clone(),
                score: Some(cosine_similarity(&page.embedding, &query.embedding) + 1.0),
            })
            .collect();

        hits.sort_by(|left, right| {
            right
                .score
                .unwrap_or_default()
                .total_cmp(&left.score.unwrap_or_default())
        });

        Ok(hits)
    }
}

fn matches_at(haystack: &[char], position: usize, needle: &[char]) -> bool {
    position + needle.len() <= haystack.len()
        && haystack[position..position + needle.len()]
            .iter()
            .zip(needle)
            .all(|(left, right)| left.to_lowercase().eq(right.to_lowercase()))
}

fn contains_term(content: &str, term: &str) -> bool {
    let haystack: Vec<char> = content.chars().collect();
    let needle: Vec<char> = term.chars().collect();
    if needle.is_empty() {
        return false;
    }
    (0..haystack.len()).any(|position| matches_at(&haystack, position, &needle))
}

/// Case-insensitive highlight fragments of at most `fragment_size` characters
/// (tags excluded), each centred on a match.
pub fn highlight_fragments(content: &str, term: &str, options: &HighlightOptions) -> Vec<String> {
    let haystack: Vec<char> = content.chars().collect();
    let needle: Vec<char> = term.chars().collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return Vec::new();
    }

    let size = options.fragment_size.max(needle.len());
    let mut fragments = Vec::new();
    let mut cursor = 0;
    let mut position = 0;

    while position < haystack.len() && fragments.len() < options.number_of_fragments {
        if !matches_at(&haystack, position, &needle) {
            position += 1;
            continue;
        }

        let start = position.saturating_sub((size - needle.len()) / 2).max(cursor);
        let end = (start + size).min(haystack.len());
        fragments.push(render_fragment(&haystack, start, end, &needle, options));
        cursor = end;
        position = end;
    }

    fragments
}

fn render_fragment(
    haystack: &[char],
    start: usize,
    end: usize,
    needle: &[char],
    options: &HighlightOptions,
) -> String {
    let mut rendered = String::new();
    let mut index = start;
    while index < end {
        if index + needle.len() <= end && matches_at(haystack, index, needle) {
            rendered.push_str(&options.pre_tag);
            rendered.extend(&haystack[index..index + needle.len()]);
            rendered.push_str(&options.post_tag);
            index += needle.len();
        } else {
            rendered.push(haystack[index]);
            index += 1;
        }
    }
    rendered.trim().to_string()
}
