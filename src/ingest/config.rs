// src/ingest/config.rs
use crate::ingest::types::Identity;

/// Split a comma-separated handle list ("a, b,,c"), keeping order.
///
/// Order matters (it is the processing order), so no sorting or dedup here.
pub fn parse_identities(list: &str) -> Vec<Identity> {
    list.split(',')
        .filter_map(|it| {
            let t = it.trim();
            (!t.is_empty()).then(|| t.to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_list_is_trimmed_in_order() {
        assert_eq!(
            parse_identities(" zed, alice,,bob "),
            vec!["zed".to_string(), "alice".into(), "bob".into()]
        );
        assert!(parse_identities(" , ").is_empty());
        assert!(parse_identities("").is_empty());
    }

    #[test]
    fn repeated_handles_are_kept() {
        assert_eq!(parse_identities("a,b,a"), vec!["a".to_string(), "b".into(), "a".into()]);
    }
}
