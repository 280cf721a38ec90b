//! Query expression building and snippet extraction

/// Full-text expression compiled from free text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtsQuery {
    /// MATCH expression with every term quoted
    pub expression: String,

    /// Lower-cased terms, in query order, used for snippet placement
    pub terms: Vec<String>,
}

/// Compile free text into an FTS5 MATCH expression.
///
/// Tokens are split on anything that is not alphanumeric and quoted, so user
/// input can never inject FTS syntax. A bare uppercase `OR` between two terms
/// becomes a disjunction; adjacent terms are ANDed. Returns `None` when the
/// text holds no terms.
pub fn fts_expression(query: &str) -> Option<FtsQuery> {
    let mut expression = String::new();
    let mut terms = Vec::new();
    let mut pending_or = false;

    for token in query.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
        if token == "OR" {
            pending_or = !terms.is_empty();
            continue;
        }

        let term = token.to_lowercase();
        if !terms.is_empty() {
            expression.push_str(if pending_or { " OR " } else { " " });
        }
        expression.push('"');
        expression.push_str(&term);
        expression.push('"');
        terms.push(term);
        pending_or = false;
    }

    if terms.is_empty() {
        None
    } else {
        Some(FtsQuery { expression, terms })
    }
}

/// Cut an excerpt of at most `max_chars` characters around the first term match.
///
/// Falls back to the start of the content when no term occurs. Elided ends are
/// marked with `…`. A `max_chars` of zero returns the content unchanged.
pub fn make_snippet(content: &str, terms: &[String], max_chars: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    if max_chars == 0 || chars.len() <= max_chars {
        return content.to_string();
    }

    // One lowercase char per source char so indices stay aligned
    let lowered: Vec<char> = chars
        .iter()
        .map(|c| c.to_lowercase().next().unwrap_or(*c))
        .collect();

    let first_match = terms
        .iter()
        .filter_map(|term| {
            let needle: Vec<char> = term.chars().collect();
            if needle.is_empty() || needle.len() > lowered.len() {
                return None;
            }
            lowered.windows(needle.len()).position(|w| w == needle.as_slice())
        })
        .min()
        .unwrap_or(0);

    let start = first_match
        .saturating_sub(max_chars / 2)
        .min(chars.len() - max_chars);
    let end = start + max_chars;

    let mut snippet = String::with_capacity(max_chars + 8);
    if start > 0 {
        snippet.push('…');
    }
    snippet.extend(&chars[start..end]);
    if end < chars.len() {
        snippet.push('…');
    }
    snippet
}
