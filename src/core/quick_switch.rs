//! Circular "next item" selection used by the quick-switch hotkey and the
//! per-app binding cycle.

use crate::core::sources::InputSource;

/// Index following `current` in a list of `len` items, wrapping around.
///
/// An unknown `current` behaves like the position before the first item.
pub fn next_index(len: usize, current: Option<usize>) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(current.map_or(0, |i| (i + 1) % len))
}

/// The source after `current_id` among `sources`.
///
/// If `current_id` is not one of them the first source is picked.
pub fn next_global_source<'a>(
    sources: &'a [InputSource],
    current_id: Option<&str>,
) -> Option<&'a InputSource> {
    let current = current_id.and_then(|id| sources.iter().position(|s| s.id == id));
    next_index(sources.len(), current).map(|i| &sources[i])
}

/// Next binding for an app when cycling through `[default, sources...]`.
///
/// `None` stands for the system default, both as input and as result. A
/// binding to a source that is no longer listed restarts the cycle at the
/// default.
pub fn next_app_binding(sources: &[InputSource], binding: Option<&str>) -> Option<String> {
    let current = match binding {
        None => Some(0),
        Some(id) => sources.iter().position(|s| s.id == id).map(|i| i + 1),
    };
    let next = next_index(sources.len() + 1, current)?;
    if next == 0 {
        None
    } else {
        Some(sources[next - 1].id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources() -> Vec<InputSource> {
        vec![
            InputSource::new("abc", "ABC"),
            InputSource::new("pinyin", "Pinyin - Simplified"),
            InputSource::new("ru", "Russian"),
        ]
    }

    #[test]
    fn next_index_wraps_and_handles_unknown() {
        assert_eq!(next_index(0, None), None);
        assert_eq!(next_index(0, Some(3)), None);
        assert_eq!(next_index(3, None), Some(0));
        assert_eq!(next_index(3, Some(0)), Some(1));
        assert_eq!(next_index(3, Some(2)), Some(0));
        assert_eq!(next_index(1, Some(0)), Some(0));
    }

    #[test]
    fn global_switch_cycles_through_enabled_sources() {
        let sources = sources();
        let ids: Vec<&str> = ["abc", "pinyin", "ru"]
            .iter()
            .map(|id| next_global_source(&sources, Some(id)).unwrap().id.as_str())
            .collect();
        assert_eq!(ids, vec!["pinyin", "ru", "abc"]);
    }

    #[test]
    fn global_switch_from_unlisted_source_starts_at_first() {
        let sources = sources();
        assert_eq!(next_global_source(&sources, Some("emoji")).unwrap().id, "abc");
        assert_eq!(next_global_source(&sources, None).unwrap().id, "abc");
        assert!(next_global_source(&[], Some("abc")).is_none());
    }

    #[test]
    fn app_binding_cycles_through_default_then_sources() {
        let sources = sources();
        let mut binding: Option<String> = None;
        let mut seen = Vec::new();
        for _ in 0..5 {
            binding = next_app_binding(&sources, binding.as_deref());
            seen.push(binding.clone());
        }
        assert_eq!(
            seen,
            vec![
                Some("abc".to_string()),
                Some("pinyin".to_string()),
                Some("ru".to_string()),
                None,
                Some("abc".to_string()),
            ]
        );
    }

    #[test]
    fn app_binding_with_stale_source_resets_to_default() {
        assert_eq!(next_app_binding(&sources(), Some("removed")), None);
        assert_eq!(next_app_binding(&[], None), None);
    }
}
