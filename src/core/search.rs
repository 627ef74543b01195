//! Fuzzy matching for the application catalogue and natural name ordering.

use std::cmp::Ordering;
use std::iter::Peekable;
use std::str::Chars;

pub const SCORE_EXACT: f64 = 1.0;
pub const SCORE_PREFIX: f64 = 0.9;
pub const SCORE_WORD_START: f64 = 0.8;
pub const SCORE_CONTAINS: f64 = 0.7;
pub const SCORE_INITIALS: f64 = 0.6;

/// Scores how well `query` matches `text`, case-insensitively.
///
/// Returns the weight of the strongest matching rule, or `0.0` when nothing
/// matches. An empty (or whitespace-only) query scores `0.0`.
pub fn score(query: &str, text: &str) -> f64 {
    let query: Vec<char> = query.trim().chars().collect();
    if query.is_empty() {
        return 0.0;
    }
    let text: Vec<char> = text.chars().collect();

    if text.len() == query.len() && starts_at(&text, &query, 0) {
        return SCORE_EXACT;
    }
    if starts_at(&text, &query, 0) {
        return SCORE_PREFIX;
    }

    let hits: Vec<usize> = (0..text.len())
        .filter(|&i| starts_at(&text, &query, i))
        .collect();
    if hits.iter().any(|&i| is_word_start(&text, i)) {
        return SCORE_WORD_START;
    }
    if !hits.is_empty() {
        return SCORE_CONTAINS;
    }
    if is_subsequence(&text, &query) {
        return SCORE_INITIALS;
    }
    0.0
}

/// Whether `query` matches `text` at all. An empty query matches everything.
pub fn matches(query: &str, text: &str) -> bool {
    query.trim().is_empty() || score(query, text) > 0.0
}

/// Filters and ranks `items` by the score of `key(item)` against `query`.
///
/// An empty query returns the items unchanged. Ties keep their input order.
pub fn search<T, F>(items: Vec<T>, query: &str, key: F) -> Vec<T>
where
    F: Fn(&T) -> &str,
{
    if query.trim().is_empty() {
        return items;
    }

    let mut scored: Vec<(f64, T)> = items
        .into_iter()
        .map(|item| (score(query, key(&item)), item))
        .filter(|(score, _)| *score > 0.0)
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
    scored.into_iter().map(|(_, item)| item).collect()
}

/// Case-insensitive ordering that compares runs of ASCII digits numerically,
/// so "Item 2" sorts before "Item 10".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {
                let l_run = take_digits(&mut left);
                let r_run = take_digits(&mut right);
                let ordering = compare_digit_runs(&l_run, &r_run);
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            (Some(l), Some(r)) => {
                let ordering = l.to_lowercase().cmp(r.to_lowercase());
                if ordering != Ordering::Equal {
                    return ordering;
                }
                left.next();
                right.next();
            }
        }
    }
}

fn take_digits(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied().filter(char::is_ascii_digit) {
        run.push(c);
        chars.next();
    }
    run
}

fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn chars_eq(a: char, b: char) -> bool {
    a == b || a.to_lowercase().eq(b.to_lowercase())
}

fn starts_at(text: &[char], query: &[char], at: usize) -> bool {
    text.len() >= at + query.len()
        && text[at..at + query.len()]
            .iter()
            .zip(query)
            .all(|(&t, &q)| chars_eq(t, q))
}

// Word starts are the beginning of the text, anything after a non-alphanumeric
// character, and camelCase humps.
fn is_word_start(text: &[char], at: usize) -> bool {
    if at == 0 {
        return true;
    }
    let prev = text[at - 1];
    let current = text[at];
    !prev.is_alphanumeric() || (prev.is_lowercase() && current.is_uppercase())
}

fn is_subsequence(text: &[char], query: &[char]) -> bool {
    let mut remaining = query.iter().peekable();
    for &t in text {
        match remaining.peek() {
            Some(&&q) if chars_eq(t, q) => {
                remaining.next();
            }
            Some(_) => {}
            None => break,
        }
    }
    remaining.peek().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scores_follow_rule_priority() {
        assert_eq!(score("safari", "Safari"), SCORE_EXACT);
        assert_eq!(score("saf", "Safari"), SCORE_PREFIX);
        assert_eq!(score("studio", "Visual Studio Code"), SCORE_WORD_START);
        assert_eq!(score("chat", "WeChat"), SCORE_WORD_START);
        assert_eq!(score("ari", "Safari"), SCORE_CONTAINS);
        assert_eq!(score("wc", "WeChat"), SCORE_INITIALS);
        assert_eq!(score("vsc", "Visual Studio Code"), SCORE_INITIALS);
        assert_eq!(score("xyz", "Safari"), 0.0);
    }

    #[test]
    fn query_is_trimmed_and_empty_query_scores_zero() {
        assert_eq!(score("  mail ", "Mail"), SCORE_EXACT);
        assert_eq!(score("   ", "Mail"), 0.0);
        assert!(matches("", "Mail"));
        assert!(!matches("zz", "Mail"));
    }

    #[test]
    fn search_ranks_by_score_and_drops_misses() {
        let apps = vec!["Terminal", "Xcode", "Code", "Visual Studio Code", "Notes"];
        let found = search(apps, "code", |s| s);
        assert_eq!(found, vec!["Code", "Visual Studio Code", "Xcode"]);
    }

    #[test]
    fn search_with_empty_query_keeps_order() {
        let apps = vec!["b", "a", "c"];
        assert_eq!(search(apps.clone(), "", |s| s), apps);
    }

    #[test]
    fn natural_order_compares_numbers_and_ignores_case() {
        let mut names = vec!["item 10", "Item 2", "apple", "Banana", "item 1"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["apple", "Banana", "item 1", "Item 2", "item 10"]);
    }

    #[test]
    fn natural_order_handles_leading_zeros() {
        assert_eq!(natural_cmp("v007", "v7"), "v007".cmp("v7"));
        assert_eq!(natural_cmp("v08", "v10"), Ordering::Less);
    }
}
