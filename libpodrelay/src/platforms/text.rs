//! Post text composition

use regex::Regex;
use std::sync::LazyLock;

/// Length X charges for any URL after t.co wrapping
pub const TCO_URL_LENGTH: usize = 23;

const ELLIPSIS: &str = "…";

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"https?://[^\s<>"…]+"#).unwrap());

/// URLs in `text` with their byte ranges
pub fn find_urls(text: &str) -> Vec<(usize, usize, &str)> {
    URL_REGEX
        .find_iter(text)
        .map(|m| {
            let url = m.as_str().trim_end_matches(['.', ',', ')', '!', '?', ';', ':']);
            (m.start(), m.start() + url.len(), url)
        })
        .collect()
}

/// X's per-character weight: Latin and general punctuation count 1,
/// everything else (CJK, emoji) counts 2
fn x_char_weight(c: char) -> usize {
    match u32::from(c) {
        0..=4351 | 8192..=8205 | 8208..=8223 | 8242..=8247 => 1,
        _ => 2,
    }
}

/// Length as X counts it: weighted characters, with every URL costing 23
pub fn weighted_length(text: &str) -> usize {
    let mut length = 0;
    let mut plain_from = 0;
    for (start, end, _) in find_urls(text) {
        length += text[plain_from..start].chars().map(x_char_weight).sum::<usize>();
        length += TCO_URL_LENGTH;
        plain_from = end;
    }
    length + text[plain_from..].chars().map(x_char_weight).sum::<usize>()
}

/// Cut `text` to at most `max` characters, ending in an ellipsis when cut
pub fn truncate_chars(text: &str, max: usize) -> String {
    truncate_weighted(text, max, char_length)
}

/// Cut `text` so `weigh` of the result, ellipsis included, is at most `max`
///
/// Cuts fall on character boundaries outside URLs; a URL is kept whole or
/// dropped whole.
pub fn truncate_weighted(text: &str, max: usize, weigh: fn(&str) -> usize) -> String {
    if weigh(text) <= max {
        return text.to_string();
    }
    let Some(budget) = max.checked_sub(weigh(ELLIPSIS)) else {
        return String::new();
    };

    let urls = find_urls(text);
    let inside_url = |idx: usize| urls.iter().any(|(start, end, _)| *start < idx && idx < *end);

    let mut cut = "";
    for idx in text.char_indices().map(|(i, _)| i).skip(1) {
        if inside_url(idx) {
            continue;
        }
        let candidate = text[..idx].trim_end();
        if weigh(candidate) > budget {
            break;
        }
        cut = candidate;
    }

    if cut.is_empty() {
        return String::new();
    }
    format!("{}{}", cut, ELLIPSIS)
}

/// Compose `title`, then any `suffix` lines, keeping the weighted length
/// within `limit`
///
/// The title is the only part that is shortened; links and hashtags always
/// survive intact.
pub fn compose(title: &str, suffix: &[&str], limit: usize, weigh: fn(&str) -> usize) -> String {
    let tail: String = suffix
        .iter()
        .filter(|s| !s.is_empty())
        .map(|s| format!("\n\n{}", s))
        .collect();

    let full = format!("{}{}", title, tail);
    if weigh(&full) <= limit {
        return full;
    }

    let budget = limit.saturating_sub(weigh(&tail));
    let title = truncate_weighted(title, budget, weigh);
    if title.is_empty() {
        return tail.trim_start().to_string();
    }
    format!("{}{}", title, tail)
}

/// Plain character count
pub fn char_length(text: &str) -> usize {
    text.chars().count()
}
