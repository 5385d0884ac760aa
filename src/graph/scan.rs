use serde_json::Value;

use crate::config::ScanStrategy;

pub fn locate_candidate(text: &str, strategy: ScanStrategy) -> Option<&str> {
    match strategy {
        ScanStrategy::Outermost => outermost_span(text),
        ScanStrategy::Balanced => balanced_candidate(text),
    }
}

pub fn outermost_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

// Prefers the first balanced object that parses and looks like a graph, then the first
// balanced object at all. Unbalanced text falls back to the outermost span so malformed
// objects still surface as parse failures.
fn balanced_candidate(text: &str) -> Option<&str> {
    let spans = balanced_spans(text);

    let graph_like = spans.iter().copied().find(|span| {
        matches!(
            serde_json::from_str::<Value>(span),
            Ok(Value::Object(map)) if map.contains_key("vertices") || map.contains_key("edges")
        )
    });
    if graph_like.is_some() {
        return graph_like;
    }

    spans.first().copied().or_else(|| outermost_span(text))
}

pub fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::<&str>::new();
    let mut depth = 0_usize;
    let mut start = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
        if depth > 0 && in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = offset;
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    spans.push(&text[start..=offset]);
                }
            }
            _ => {}
        }
    }

    spans
}
