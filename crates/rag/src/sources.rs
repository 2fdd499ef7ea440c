//! Citation extraction
//!
//! Turns reranked parents into user-facing citations: one per parent,
//! with a readable law name derived from the document id, the first
//! article reference found in the text, and a preview snippet truncated
//! at a word boundary.

use std::collections::HashSet;

use legal_assistant_core::Citation;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::reranker::RerankedParent;

const TITLE_MAX_CHARS: usize = 120;
const PREVIEW_MAX_CHARS: usize = 400;

static ARTICLE_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Điều\s+\d+[a-zA-Z]?").expect("article ref regex"));

/// Build citations from reranked parents, best first.
///
/// Parents are already unique after reranking; duplicates are dropped
/// defensively rather than emitted twice.
pub fn extract_citations(parents: &[RerankedParent]) -> Vec<Citation> {
    let mut seen = HashSet::new();
    parents
        .iter()
        .filter(|p| seen.insert(p.parent.id.clone()))
        .map(|p| {
            let text = p.parent.text.as_str();
            Citation {
                parent_id: p.parent.id.clone(),
                title: citation_title(text),
                law_id: prettify_law_id(&p.parent.source_document_id),
                article_ref: ARTICLE_REF_RE.find(text).map(|m| m.as_str().to_string()),
                content: truncate_words(text, PREVIEW_MAX_CHARS),
                relevance_score: p.score,
            }
        })
        .collect()
}

/// First non-empty line of the parent, preferring the article heading
/// over a chapter heading
fn citation_title(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("Điều"))
        .or_else(|| text.lines().map(str::trim).find(|l| !l.is_empty()))
        .unwrap_or_default();
    truncate_words(line, TITLE_MAX_CHARS)
}

/// Turn a slugged document id into a readable law name.
///
/// `luat-giao-thong-2008` becomes `Luật giao thông 2008` and
/// `nd-100-2019` becomes `Nghị định 100 2019`. Unknown prefixes keep
/// the raw id.
fn prettify_law_id(document_id: &str) -> Option<String> {
    if document_id.is_empty() {
        return None;
    }

    let tokens: Vec<&str> = document_id.split(['-', '_']).filter(|t| !t.is_empty()).collect();
    let (kind, rest): (&str, &[&str]) = match tokens.as_slice() {
        ["luat", rest @ ..] => ("Luật", rest),
        ["nd", rest @ ..] | ["nghi", "dinh", rest @ ..] => ("Nghị định", rest),
        ["tt", rest @ ..] | ["thong", "tu", rest @ ..] => ("Thông tư", rest),
        ["qd", rest @ ..] | ["quyet", "dinh", rest @ ..] => ("Quyết định", rest),
        _ => return Some(document_id.to_string()),
    };

    let mut name = kind.to_string();
    for token in rest {
        name.push(' ');
        name.push_str(token);
    }
    Some(name)
}

/// Truncate at the last word boundary within `max_chars`, appending an
/// ellipsis when anything was cut
fn truncate_words(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_string();
    }

    let cut: String = text.chars().take(max_chars).collect();
    let kept = match cut.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &cut[..pos],
        _ => cut.as_str(),
    };
    format!("{}...", kept.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::splitter::ParentChunk;

    fn reranked(id: &str, doc: &str, text: &str, score: f32) -> RerankedParent {
        RerankedParent {
            parent: ParentChunk {
                id: id.to_string(),
                text: text.to_string(),
                source_document_id: doc.to_string(),
                structural_path: Vec::new(),
            },
            score,
        }
    }

    #[test]
    fn test_citation_fields() {
        let parents = vec![reranked(
            "nd-100-2019_3",
            "nd-100-2019",
            "Chương II. HÀNH VI VI PHẠM\n\nĐiều 5. Xử phạt người điều khiển xe ô tô\n1. Phạt tiền...",
            0.92,
        )];

        let citations = extract_citations(&parents);
        assert_eq!(citations.len(), 1);
        let c = &citations[0];
        assert_eq!(c.parent_id, "nd-100-2019_3");
        assert_eq!(c.title, "Điều 5. Xử phạt người điều khiển xe ô tô");
        assert_eq!(c.law_id.as_deref(), Some("Nghị định 100 2019"));
        assert_eq!(c.article_ref.as_deref(), Some("Điều 5"));
        assert_eq!(c.relevance_score, 0.92);
    }

    #[test]
    fn test_order_follows_rank() {
        let parents = vec![
            reranked("a", "luat-1", "Điều 1. A", 0.9),
            reranked("b", "luat-1", "Điều 2. B", 0.5),
        ];
        let citations = extract_citations(&parents);
        assert_eq!(citations[0].parent_id, "a");
        assert_eq!(citations[1].parent_id, "b");
    }

    #[test]
    fn test_duplicates_dropped() {
        let parents = vec![
            reranked("a", "luat-1", "Điều 1. A", 0.9),
            reranked("a", "luat-1", "Điều 1. A", 0.8),
        ];
        assert_eq!(extract_citations(&parents).len(), 1);
    }

    #[test]
    fn test_prettify_known_prefixes() {
        assert_eq!(
            prettify_law_id("luat-giao-thong-2008").as_deref(),
            Some("Luật giao thong 2008")
        );
        assert_eq!(prettify_law_id("tt-65").as_deref(), Some("Thông tư 65"));
        assert_eq!(prettify_law_id("custom.doc").as_deref(), Some("custom.doc"));
        assert_eq!(prettify_law_id(""), None);
    }

    #[test]
    fn test_preview_truncates_at_word_boundary() {
        let long = "phạt tiền ".repeat(100);
        let parents = vec![reranked("a", "nd-1", &long, 0.5)];
        let citation = &extract_citations(&parents)[0];

        assert!(citation.content.chars().count() <= PREVIEW_MAX_CHARS + 3);
        assert!(citation.content.ends_with("..."));
        assert!(!citation.content.trim_end_matches("...").ends_with(' '));
    }

    #[test]
    fn test_title_falls_back_to_first_line() {
        let parents = vec![reranked("a", "nd-1", "Văn bản không có điều khoản rõ ràng", 0.5)];
        let citation = &extract_citations(&parents)[0];
        assert_eq!(citation.title, "Văn bản không có điều khoản rõ ràng");
        assert!(citation.article_ref.is_none());
    }
}
