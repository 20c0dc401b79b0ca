//! SonarQube project key sanitization.
//!
//! SonarQube project keys accept letters, digits, `-`, `_`, `.` and `:`;
//! slashes are forbidden and were the historically observed corruption
//! vector (an unescaped `owner/name` written straight into a key). This
//! function is pure and total: it never fails, it only degrades — the
//! output has to be a stable, collision-resistant external key, not a
//! faithful copy of the input.

/// Upper bound accepted by SonarQube for a project key.
const MAX_KEY_LEN: usize = 400;

/// When truncating, owner keeps at most this many characters.
const MAX_OWNER_LEN: usize = 150;

/// When truncating, name keeps at most this many characters.
const MAX_NAME_LEN: usize = 240;

/// Derive a storage-safe SonarQube project key from an (`owner`, `name`)
/// pair, as `owner_name`.
///
/// - `/` and `\` become `-`
/// - other characters outside `[A-Za-z0-9._-]` become `_`
/// - runs of two or more `-`/`_` collapse to a single `_`
/// - leading and trailing separators are stripped
/// - an empty owner becomes `unknown`, an empty name `unnamed`
/// - the combined key is capped at 400 characters
pub fn sanitize_project_key(owner: &str, name: &str) -> String {
    let mut owner = sanitize_part(owner, "unknown");
    let mut name = sanitize_part(name, "unnamed");

    if owner.chars().count() + name.chars().count() + 1 > MAX_KEY_LEN {
        owner = owner.chars().take(MAX_OWNER_LEN).collect();
        name = name.chars().take(MAX_NAME_LEN).collect();
    }

    format!("{}_{}", owner, name)
}

fn sanitize_part(raw: &str, placeholder: &str) -> String {
    let mut mapped = String::with_capacity(raw.len());
    for ch in raw.trim().chars() {
        mapped.push(match ch {
            '/' | '\\' => '-',
            c if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') => c,
            _ => '_',
        });
    }

    // Collapse runs of separators: a single '-' or '_' is kept as-is,
    // two or more in a row become one '_'.
    let mut collapsed = String::with_capacity(mapped.len());
    let mut run_len = 0usize;
    let mut run_char = '_';
    for ch in mapped.chars() {
        if ch == '-' || ch == '_' {
            if run_len == 0 {
                run_char = ch;
            }
            run_len += 1;
        } else {
            match run_len {
                0 => {}
                1 => collapsed.push(run_char),
                _ => collapsed.push('_'),
            }
            run_len = 0;
            collapsed.push(ch);
        }
    }
    match run_len {
        0 => {}
        1 => collapsed.push(run_char),
        _ => collapsed.push('_'),
    }

    let stripped = collapsed.trim_matches(|c| c == '-' || c == '_');
    if stripped.is_empty() {
        placeholder.to_string()
    } else {
        stripped.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_pair() {
        assert_eq!(sanitize_project_key("user", "repo"), "user_repo");
    }

    #[test]
    fn slashes_become_hyphens() {
        assert_eq!(sanitize_project_key("user/org", "repo"), "user-org_repo");
        assert_eq!(sanitize_project_key("user\\org", "repo"), "user-org_repo");
    }

    #[test]
    fn empty_inputs_use_placeholders() {
        assert_eq!(sanitize_project_key("", "repo"), "unknown_repo");
        assert_eq!(sanitize_project_key("user", ""), "user_unnamed");
        assert_eq!(sanitize_project_key("", ""), "unknown_unnamed");
        assert_eq!(sanitize_project_key("___", "---"), "unknown_unnamed");
    }

    #[test]
    fn special_characters_become_underscores() {
        assert_eq!(
            sanitize_project_key("user@domain", "repo-name"),
            "user_domain_repo-name"
        );
        assert_eq!(sanitize_project_key("user name", "repo"), "user_name_repo");
    }

    #[test]
    fn separator_runs_collapse_and_trim() {
        assert_eq!(sanitize_project_key("user___", "___repo"), "user_repo");
        assert_eq!(sanitize_project_key("a--b", "c__d"), "a_b_c_d");
    }

    #[test]
    fn long_keys_are_truncated() {
        let owner = "a".repeat(300);
        let name = "b".repeat(300);
        let key = sanitize_project_key(&owner, &name);
        assert!(key.len() <= 400);
        assert_eq!(key, format!("{}_{}", "a".repeat(150), "b".repeat(240)));
    }

    #[test]
    fn never_contains_slashes() {
        let cases = [
            ("", ""),
            ("/", "\\"),
            ("a/b/c", "d\\e\\f"),
            ("////", "\\\\\\\\"),
            ("héllo wörld", "naïve"),
            ("owner", "name/with/path"),
        ];
        for (owner, name) in cases {
            let key = sanitize_project_key(owner, name);
            assert!(!key.contains('/'), "key {:?} contains '/'", key);
            assert!(!key.contains('\\'), "key {:?} contains '\\'", key);
            assert!(!key.is_empty());
        }
    }
}
