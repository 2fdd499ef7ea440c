//! Structure-aware splitting of Vietnamese legal documents
//!
//! Parses raw statute text into a Chương → Điều → Khoản hierarchy and
//! emits two granularities of chunks: large parent chunks (the context
//! unit handed to generation, never splitting an Article) and small
//! child chunks (the search unit, indexed in the vector store and
//! linked back to their parent by id).
//!
//! Size limits are soft for parents (an Article that alone exceeds the
//! limit becomes one oversized parent; structural integrity is hard)
//! and hard for children. Child chunks are always contiguous sub-spans
//! of their parent's text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static ARTICLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^[ \t]*Điều\s+\d+[a-zA-Z]?\.?[^\n]*").expect("article regex"));

static CHAPTER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?mi)^[ \t]*Chương\s+[IVXLCDM\d]+\.?[^\n]*").expect("chapter regex"));

static CLAUSE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*\d+\.\s+").expect("clause regex"));

/// Kind of structural unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitKind {
    Chapter,
    Article,
    Clause,
}

/// A node in the structural hierarchy of a legal document
#[derive(Debug, Clone)]
pub struct LegalUnit {
    pub kind: UnitKind,
    /// Structural marker line, e.g. "Điều 5. Phạm vi điều chỉnh".
    /// Empty for the implicit unit formed by unmatched leading text.
    pub label: String,
    /// Raw text of this unit, excluding nested children for chapters
    /// but including clause bodies for articles
    pub body: String,
    /// Position among siblings of the same kind
    pub ordinal: usize,
    /// Enclosing unit labels, outermost first
    pub ancestors: Vec<String>,
}

/// A contextual chunk built from one or more sibling Articles
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParentChunk {
    /// Stable id: `{document_id}_{ordinal}`
    pub id: String,
    pub text: String,
    pub source_document_id: String,
    /// Ancestor labels, outermost first (currently the chapter, if any)
    pub structural_path: Vec<String>,
}

/// A search chunk; a contiguous sub-span of its parent's text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildChunk {
    pub id: String,
    /// Back-reference; the parent store owns the parent
    pub parent_id: String,
    pub text: String,
}

/// One parent together with its children
#[derive(Debug, Clone)]
pub struct ParentSplit {
    pub parent: ParentChunk,
    pub children: Vec<ChildChunk>,
}

/// Splitter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitterConfig {
    /// Soft upper bound for parent chunks, in characters
    pub parent_chunk_size: usize,
    /// Hard upper bound for child chunks, in characters
    pub child_chunk_size: usize,
    /// Chunks shorter than this are merged into a neighbor when the
    /// merge does not break the size bound
    pub min_chunk_size: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        use legal_assistant_config::constants::retrieval;
        Self {
            parent_chunk_size: retrieval::PARENT_CHUNK_SIZE,
            child_chunk_size: retrieval::CHILD_CHUNK_SIZE,
            min_chunk_size: retrieval::MIN_CHUNK_SIZE,
        }
    }
}

impl From<&legal_assistant_config::RetrievalConfig> for SplitterConfig {
    fn from(config: &legal_assistant_config::RetrievalConfig) -> Self {
        Self {
            parent_chunk_size: config.parent_chunk_size,
            child_chunk_size: config.child_chunk_size,
            min_chunk_size: legal_assistant_config::constants::retrieval::MIN_CHUNK_SIZE,
        }
    }
}

/// Vietnamese legal text splitter
pub struct LegalTextSplitter {
    config: SplitterConfig,
}

impl LegalTextSplitter {
    pub fn new(config: SplitterConfig) -> Self {
        Self { config }
    }

    /// Split one document into parent chunks with children.
    ///
    /// Empty or whitespace-only input produces an empty result, not an
    /// error.
    pub fn split(&self, document_id: &str, text: &str) -> Vec<ParentSplit> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let units = self.parse_units(text);
        let parents = self.assemble_parents(document_id, &units);

        parents
            .into_iter()
            .map(|parent| {
                let children = self.split_children(&parent);
                ParentSplit { parent, children }
            })
            .collect()
    }

    /// Parse raw text into an ordered list of structural units.
    ///
    /// Chapters and articles appear in document order; each article
    /// carries its enclosing chapter label as ancestor and is followed
    /// by its clause units. Unmatched leading text becomes an implicit
    /// article-kind unit with an empty label.
    pub fn parse_units(&self, text: &str) -> Vec<LegalUnit> {
        // Top-level boundaries: every chapter or article heading.
        let mut boundaries: Vec<(usize, UnitKind)> = CHAPTER_RE
            .find_iter(text)
            .map(|m| (m.start(), UnitKind::Chapter))
            .chain(
                ARTICLE_RE
                    .find_iter(text)
                    .map(|m| (m.start(), UnitKind::Article)),
            )
            .collect();
        boundaries.sort_by_key(|(start, _)| *start);

        let mut units = Vec::new();
        let mut chapter_label: Option<String> = None;
        let mut chapter_ordinal = 0;
        let mut article_ordinal = 0;

        // Implicit unit for leading text before the first marker.
        let preamble_end = boundaries.first().map(|(s, _)| *s).unwrap_or(text.len());
        let preamble = text[..preamble_end].trim();
        if !preamble.is_empty() {
            units.push(LegalUnit {
                kind: UnitKind::Article,
                label: String::new(),
                body: preamble.to_string(),
                ordinal: article_ordinal,
                ancestors: Vec::new(),
            });
            article_ordinal += 1;
        }

        for (i, (start, kind)) in boundaries.iter().enumerate() {
            let end = boundaries
                .get(i + 1)
                .map(|(s, _)| *s)
                .unwrap_or(text.len());
            let body = text[*start..end].trim();
            if body.is_empty() {
                continue;
            }
            let label = body.lines().next().unwrap_or_default().trim().to_string();

            match kind {
                UnitKind::Chapter => {
                    units.push(LegalUnit {
                        kind: UnitKind::Chapter,
                        label: label.clone(),
                        body: body.to_string(),
                        ordinal: chapter_ordinal,
                        ancestors: Vec::new(),
                    });
                    chapter_label = Some(label);
                    chapter_ordinal += 1;
                    article_ordinal = 0;
                }
                UnitKind::Article => {
                    let ancestors: Vec<String> =
                        chapter_label.iter().cloned().collect();
                    units.push(LegalUnit {
                        kind: UnitKind::Article,
                        label: label.clone(),
                        body: body.to_string(),
                        ordinal: article_ordinal,
                        ancestors: ancestors.clone(),
                    });
                    article_ordinal += 1;

                    // Nested clause units for the article body.
                    let mut clause_ancestors = ancestors;
                    clause_ancestors.push(label);
                    units.extend(Self::parse_clauses(body, &clause_ancestors));
                }
                UnitKind::Clause => unreachable!("clauses are not top-level boundaries"),
            }
        }

        units
    }

    fn parse_clauses(article_body: &str, ancestors: &[String]) -> Vec<LegalUnit> {
        let starts: Vec<usize> = CLAUSE_RE
            .find_iter(article_body)
            .map(|m| m.start())
            .collect();

        starts
            .iter()
            .enumerate()
            .filter_map(|(i, &start)| {
                let end = starts.get(i + 1).copied().unwrap_or(article_body.len());
                let body = article_body[start..end].trim();
                if body.is_empty() {
                    return None;
                }
                Some(LegalUnit {
                    kind: UnitKind::Clause,
                    label: body
                        .split_whitespace()
                        .next()
                        .unwrap_or_default()
                        .to_string(),
                    body: body.to_string(),
                    ordinal: i,
                    ancestors: ancestors.to_vec(),
                })
            })
            .collect()
    }

    /// Greedily pack sibling articles into parent chunks.
    ///
    /// Never splits inside an article and never packs across a chapter
    /// boundary. A single article exceeding the limit becomes one
    /// oversized parent. An implicit (label-less) unit that exceeds the
    /// limit has no structural integrity to protect and is split by
    /// size instead.
    fn assemble_parents(&self, document_id: &str, units: &[LegalUnit]) -> Vec<ParentChunk> {
        let mut texts: Vec<(String, Vec<String>)> = Vec::new();

        let mut chapter: Option<&LegalUnit> = None;
        let mut buffer: Vec<&LegalUnit> = Vec::new();

        fn flush(
            buffer: &mut Vec<&LegalUnit>,
            chapter: Option<&LegalUnit>,
            texts: &mut Vec<(String, Vec<String>)>,
        ) {
            if buffer.is_empty() {
                return;
            }
            let mut parts: Vec<&str> = Vec::with_capacity(buffer.len() + 1);
            let mut path = Vec::new();
            if let Some(ch) = chapter {
                parts.push(ch.body.as_str());
                path.push(ch.label.clone());
            }
            parts.extend(buffer.iter().map(|u| u.body.as_str()));
            texts.push((parts.join("\n\n"), path));
            buffer.clear();
        }

        for unit in units {
            match unit.kind {
                UnitKind::Clause => continue,
                UnitKind::Chapter => {
                    flush(&mut buffer, chapter, &mut texts);
                    chapter = Some(unit);
                }
                UnitKind::Article => {
                    let unit_len = char_len(&unit.body);
                    let prefix_len = chapter.map(|c| char_len(&c.body) + 2).unwrap_or(0);

                    if unit.label.is_empty() && prefix_len + unit_len > self.config.parent_chunk_size
                    {
                        // Implicit unit: size-only split.
                        flush(&mut buffer, chapter, &mut texts);
                        for piece in
                            split_by_size(&unit.body, self.config.parent_chunk_size)
                        {
                            let path =
                                chapter.map(|c| vec![c.label.clone()]).unwrap_or_default();
                            texts.push((piece, path));
                        }
                        continue;
                    }

                    let current_len: usize = prefix_len
                        + buffer.iter().map(|u| char_len(&u.body) + 2).sum::<usize>();

                    if !buffer.is_empty()
                        && current_len + unit_len + 2 > self.config.parent_chunk_size
                    {
                        flush(&mut buffer, chapter, &mut texts);
                    }
                    buffer.push(unit);

                    // A lone article may exceed the limit; keep it whole.
                    if prefix_len + unit_len > self.config.parent_chunk_size {
                        flush(&mut buffer, chapter, &mut texts);
                    }
                }
            }
        }
        flush(&mut buffer, chapter, &mut texts);

        // Merge undersized parents into their predecessor.
        let mut merged: Vec<(String, Vec<String>)> = Vec::with_capacity(texts.len());
        for (text, path) in texts {
            let small = char_len(&text) < self.config.min_chunk_size;
            match merged.last_mut() {
                Some((prev, _)) if small => {
                    prev.push_str("\n\n");
                    prev.push_str(&text);
                }
                _ => merged.push((text, path)),
            }
        }

        merged
            .into_iter()
            .enumerate()
            .map(|(ordinal, (text, structural_path))| ParentChunk {
                id: format!("{}_{}", document_id, ordinal),
                text,
                source_document_id: document_id.to_string(),
                structural_path,
            })
            .collect()
    }

    /// Split a parent's text into contiguous child chunks.
    ///
    /// Split points come from clause boundaries, then sentence
    /// boundaries, then raw character windows, whichever is needed to
    /// respect the child size; no chunk crosses the parent boundary.
    fn split_children(&self, parent: &ParentChunk) -> Vec<ChildChunk> {
        let text = parent.text.as_str();
        let limit = self.config.child_chunk_size;

        // Pass 1: clause boundaries.
        let mut segments: Vec<(usize, usize)> = Vec::new();
        let clause_starts: Vec<usize> = CLAUSE_RE.find_iter(text).map(|m| m.start()).collect();
        let mut cursor = 0;
        for &start in &clause_starts {
            if start > cursor {
                segments.push((cursor, start));
            }
            cursor = start;
        }
        if cursor < text.len() {
            segments.push((cursor, text.len()));
        }

        // Pass 2/3: refine oversized segments by sentences, then windows.
        let mut refined: Vec<(usize, usize)> = Vec::new();
        for (start, end) in segments {
            let segment = &text[start..end];
            if char_len(segment) <= limit {
                refined.push((start, end));
                continue;
            }
            for (s, e) in sentence_ranges(segment) {
                if char_len(&segment[s..e]) <= limit {
                    refined.push((start + s, start + e));
                } else {
                    for (ws, we) in window_ranges(&segment[s..e], limit) {
                        refined.push((start + s + ws, start + s + we));
                    }
                }
            }
        }

        // Greedily accumulate contiguous segments up to the limit.
        let mut spans: Vec<(usize, usize)> = Vec::new();
        for (start, end) in refined {
            match spans.last_mut() {
                Some((s, e)) if char_len(&text[*s..end]) <= limit && *e == start => {
                    *e = end;
                }
                _ => spans.push((start, end)),
            }
        }

        // Merge an undersized tail into its predecessor when the size
        // bound still holds.
        if spans.len() > 1 {
            let (ls, le) = *spans.last().expect("non-empty");
            if char_len(text[ls..le].trim()) < self.config.min_chunk_size {
                let (ps, _) = spans[spans.len() - 2];
                if char_len(&text[ps..le]) <= limit {
                    spans.pop();
                    spans.last_mut().expect("non-empty").1 = le;
                }
            }
        }

        spans
            .into_iter()
            .filter_map(|(start, end)| {
                let chunk = text[start..end].trim();
                if chunk.is_empty() {
                    return None;
                }
                Some(ChildChunk {
                    id: uuid::Uuid::new_v4().to_string(),
                    parent_id: parent.id.clone(),
                    text: chunk.to_string(),
                })
            })
            .collect()
    }
}

impl Default for LegalTextSplitter {
    fn default() -> Self {
        Self::new(SplitterConfig::default())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Byte ranges of sentences within `text`, splitting after `.`, `!`,
/// `?` or `;` followed by whitespace
fn sentence_ranges(text: &str) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut prev_was_terminator = false;

    for (idx, c) in text.char_indices() {
        if prev_was_terminator && c.is_whitespace() {
            ranges.push((start, idx));
            start = idx;
        }
        prev_was_terminator = matches!(c, '.' | '!' | '?' | ';');
    }
    if start < text.len() {
        ranges.push((start, text.len()));
    }
    ranges
}

/// Byte ranges of fixed-size character windows
fn window_ranges(text: &str, limit: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == limit {
            ranges.push((start, idx));
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        ranges.push((start, text.len()));
    }
    ranges
}

/// Split free text into size-capped pieces at sentence boundaries
fn split_by_size(text: &str, limit: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();

    for (s, e) in sentence_ranges(text) {
        let sentence = &text[s..e];
        if !current.is_empty() && char_len(&current) + char_len(sentence) > limit {
            pieces.push(current.trim().to_string());
            current = String::new();
        }
        if char_len(sentence) > limit {
            if !current.is_empty() {
                pieces.push(current.trim().to_string());
                current = String::new();
            }
            for (ws, we) in window_ranges(sentence, limit) {
                pieces.push(sentence[ws..we].trim().to_string());
            }
        } else {
            current.push_str(sentence);
        }
    }
    if !current.trim().is_empty() {
        pieces.push(current.trim().to_string());
    }
    pieces.retain(|p| !p.is_empty());
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_ARTICLES: &str = "Chương I. QUY ĐỊNH CHUNG\n\
        Điều 1. Phạm vi điều chỉnh\n\
        1. Nghị định này quy định về xử phạt vi phạm hành chính trong lĩnh vực giao thông đường bộ.\n\
        2. Các hành vi vi phạm khác được xử lý theo quy định của pháp luật có liên quan.\n\
        Điều 2. Giải thích từ ngữ\n\
        1. Đèn tín hiệu giao thông là thiết bị điều khiển giao thông tại các nút giao.\n";

    fn small_splitter() -> LegalTextSplitter {
        LegalTextSplitter::new(SplitterConfig {
            parent_chunk_size: 200,
            child_chunk_size: 120,
            min_chunk_size: 20,
        })
    }

    #[test]
    fn test_parse_units_hierarchy() {
        let splitter = LegalTextSplitter::default();
        let units = splitter.parse_units(TWO_ARTICLES);

        let chapters: Vec<_> = units.iter().filter(|u| u.kind == UnitKind::Chapter).collect();
        let articles: Vec<_> = units.iter().filter(|u| u.kind == UnitKind::Article).collect();
        let clauses: Vec<_> = units.iter().filter(|u| u.kind == UnitKind::Clause).collect();

        assert_eq!(chapters.len(), 1);
        assert_eq!(articles.len(), 2);
        assert_eq!(clauses.len(), 3);

        // Every article shares the chapter ancestor.
        for article in &articles {
            assert_eq!(article.ancestors, vec![chapters[0].label.clone()]);
        }
        // Every clause has exactly one article ancestor.
        for clause in &clauses {
            let article_ancestors = clause
                .ancestors
                .iter()
                .filter(|a| a.starts_with("Điều"))
                .count();
            assert_eq!(article_ancestors, 1);
        }
    }

    #[test]
    fn test_one_parent_per_article_when_they_do_not_fit() {
        let splitter = small_splitter();
        let splits = splitter.split("nd100", TWO_ARTICLES);

        // The two articles do not fit in one 200-char parent together.
        assert_eq!(splits.len(), 2);
        assert!(splits[0].parent.text.contains("Điều 1"));
        assert!(splits[1].parent.text.contains("Điều 2"));
        for split in &splits {
            assert_eq!(split.parent.structural_path.len(), 1);
            assert!(split.parent.structural_path[0].starts_with("Chương I"));
        }
    }

    #[test]
    fn test_children_are_substrings_of_their_parent() {
        let splitter = small_splitter();
        for split in splitter.split("nd100", TWO_ARTICLES) {
            assert!(!split.children.is_empty());
            for child in &split.children {
                assert!(
                    split.parent.text.contains(&child.text),
                    "child not contained in parent: {:?}",
                    child.text
                );
                assert_eq!(child.parent_id, split.parent.id);
            }
        }
    }

    #[test]
    fn test_child_size_bound() {
        let splitter = small_splitter();
        for split in splitter.split("nd100", TWO_ARTICLES) {
            for child in &split.children {
                assert!(child.text.chars().count() <= 120);
            }
        }
    }

    #[test]
    fn test_oversized_article_is_kept_whole() {
        let long_clause = "Hành vi vi phạm sẽ bị xử phạt theo quy định. ".repeat(20);
        let text = format!("Điều 1. Quy định dài\n{}", long_clause);

        let splitter = small_splitter();
        let splits = splitter.split("doc", &text);

        // One oversized parent; the article is not split.
        assert_eq!(splits.len(), 1);
        assert!(splits[0].parent.text.chars().count() > 200);
        // Children still respect their own bound.
        assert!(splits[0].children.len() > 1);
    }

    #[test]
    fn test_no_markers_degenerates_to_size_split() {
        let text = "Đây là một đoạn văn bản không có cấu trúc. ".repeat(15);
        let splitter = small_splitter();
        let splits = splitter.split("doc", &text);

        assert!(splits.len() > 1);
        for split in &splits {
            assert!(split.parent.text.chars().count() <= 200);
            assert!(split.parent.structural_path.is_empty());
        }
    }

    #[test]
    fn test_empty_input_yields_empty_result() {
        let splitter = LegalTextSplitter::default();
        assert!(splitter.split("doc", "").is_empty());
        assert!(splitter.split("doc", "   \n  ").is_empty());
    }

    #[test]
    fn test_greedy_packing_keeps_small_articles_together() {
        let text = "Điều 1. A\nNội dung ngắn thứ nhất về phạm vi.\n\
                    Điều 2. B\nNội dung ngắn thứ hai về đối tượng.\n";
        let splitter = LegalTextSplitter::new(SplitterConfig {
            parent_chunk_size: 2000,
            child_chunk_size: 512,
            min_chunk_size: 20,
        });
        let splits = splitter.split("doc", text);

        // Both articles fit comfortably in one parent.
        assert_eq!(splits.len(), 1);
        assert!(splits[0].parent.text.contains("Điều 1"));
        assert!(splits[0].parent.text.contains("Điều 2"));
    }

    #[test]
    fn test_parent_ids_are_stable_and_ordered() {
        let splitter = small_splitter();
        let splits = splitter.split("nd100", TWO_ARTICLES);
        let ids: Vec<_> = splits.iter().map(|s| s.parent.id.as_str()).collect();
        assert_eq!(ids, vec!["nd100_0", "nd100_1"]);
    }

    #[test]
    fn test_sentence_ranges_cover_text() {
        let text = "Câu một. Câu hai! Câu ba?";
        let ranges = sentence_ranges(text);
        assert_eq!(ranges.len(), 3);
        let reassembled: String = ranges.iter().map(|&(s, e)| &text[s..e]).collect();
        assert_eq!(reassembled, text);
    }

    #[test]
    fn test_window_ranges_respect_char_boundaries() {
        let text = "Điều năm quy định về mức phạt";
        for (s, e) in window_ranges(text, 5) {
            assert!(text.get(s..e).is_some());
            assert!(text[s..e].chars().count() <= 5);
        }
    }
}
