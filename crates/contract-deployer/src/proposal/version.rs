// Version tags carried in proposal titles

/// First semver-looking token in `title`, without a leading `v`
///
/// "Upgrade Multisig to v2.0.0" yields `2.0.0`. Pre-release and build
/// suffixes are kept ("1.1.0-rc.1").
pub fn version_from_title(title: &str) -> Option<String> {
    title
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | '(' | ')' | '[' | ']' | ':'))
        .map(|token| token.trim_end_matches('.'))
        .map(|token| token.strip_prefix(['v', 'V']).unwrap_or(token))
        .find(|token| is_semver_like(token))
        .map(str::to_string)
}

fn is_semver_like(token: &str) -> bool {
    let core = token.split(['-', '+']).next().unwrap_or_default();
    let parts: Vec<&str> = core.split('.').collect();

    parts.len() == 3
        && parts
            .iter()
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_from_title() {
        assert_eq!(version_from_title("Upgrade Multisig to v2.0.0").as_deref(), Some("2.0.0"));
        assert_eq!(version_from_title("Store ITS Hub 1.1.0-rc.1 code").as_deref(), Some("1.1.0-rc.1"));
        assert_eq!(version_from_title("Migrate Coordinator (v1.2.3).").as_deref(), Some("1.2.3"));
        assert_eq!(version_from_title("Release 2.0.0."), Some("2.0.0".to_string()));
        assert_eq!(version_from_title("Migrate Gateway"), None);
        assert_eq!(version_from_title("Bump to 1.2"), None);
    }
}
