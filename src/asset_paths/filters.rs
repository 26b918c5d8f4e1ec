use regex::Regex;

fn asset_reference_ignores() -> &'static [Regex] {
    use std::sync::OnceLock;

    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                Regex::new(r"(?i)^data:").expect("invalid data URI regex"),
                Regex::new(r"(?i)^blob:").expect("invalid blob URI regex"),
                Regex::new(r"(?i)^mailto:").expect("invalid mailto regex"),
                Regex::new(r"(?i)^tel:").expect("invalid tel regex"),
                Regex::new(r"(?i)^javascript:").expect("invalid javascript URI regex"),
                Regex::new(r"^#").expect("invalid fragment regex"),
            ]
        })
        .as_slice()
}

/// Determine whether a reference can never point into the output tree.
///
/// Inline data, blob handles, mail and phone links, script URIs and same-document fragments are
/// left exactly as authored when references are relocated.
pub fn should_ignore_asset_reference(value: &str) -> bool {
    let value = value.trim();
    value.is_empty()
        || asset_reference_ignores()
            .iter()
            .any(|pattern| pattern.is_match(value))
}

#[cfg(test)]
mod tests {
    use super::should_ignore_asset_reference;

    #[test]
    fn ignores_data_and_blob_uris() {
        assert!(should_ignore_asset_reference("data:image/png;base64,abc"));
        assert!(should_ignore_asset_reference("BLOB:https://example.com/id"));
    }

    #[test]
    fn ignores_links_that_are_not_files() {
        assert!(should_ignore_asset_reference("mailto:user@example.com"));
        assert!(should_ignore_asset_reference("tel:+100"));
        assert!(should_ignore_asset_reference("javascript:void(0)"));
        assert!(should_ignore_asset_reference("#viewer"));
        assert!(should_ignore_asset_reference("   "));
    }

    #[test]
    fn keeps_root_absolute_and_relative_paths() {
        assert!(!should_ignore_asset_reference("/assets/test-scene.glb"));
        assert!(!should_ignore_asset_reference("assets/index.js"));
    }
}
