//! Archive path normalization and the minimal glob matcher used for the
//! inclusion/compression whitelist-blacklist pairs (§4.5).
//!
//! Archive paths are always absolute, `/`-separated, and carry no trailing
//! slash except for the root itself, which normalizes to `"/"`.

/// Normalize an archive path. Total — never fails, since any input can be
/// coerced into a valid absolute path.
pub fn normalize(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }
    let mut out = String::with_capacity(path.len() + 1);
    if !path.starts_with('/') {
        out.push('/');
    }
    let mut prev_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(ch);
    }
    while out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

/// Split a normalized path into `(parent_path, name)`. The root has no
/// name.
pub fn split(path: &str) -> Option<(String, &str)> {
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some(("/".to_string(), &path[1..])),
        Some(idx) => Some((path[..idx].to_string(), &path[idx + 1..])),
        None => None,
    }
}

/// Join a child name onto a normalized parent path.
pub fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

/// Resolve `target` relative to `base_dir` (the directory containing the
/// symlink whose target this is), the way a filesystem resolves relative
/// symlink targets.
pub fn resolve_relative(base_dir: &str, target: &str) -> String {
    if target.starts_with('/') {
        return normalize(target);
    }
    let mut stack: Vec<&str> = if base_dir == "/" { vec![] } else { base_dir.trim_start_matches('/').split('/').collect() };
    for component in target.split('/') {
        match component {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }
    if stack.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", stack.join("/"))
    }
}

/// Minimal shell-style glob matcher (`*` and `?`) sufficient for the
/// whitelist/blacklist pattern pairs. Not a general filter engine — glob
/// inclusion policy beyond this is explicitly out of scope (spec §1).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[u8], t: &[u8]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some(b'*'), _) => inner(&p[1..], t) || (!t.is_empty() && inner(p, &t[1..])),
            (Some(b'?'), Some(_)) => inner(&p[1..], &t[1..]),
            (Some(pc), Some(tc)) if pc == tc => inner(&p[1..], &t[1..]),
            _ => false,
        }
    }
    inner(pattern.as_bytes(), text.as_bytes())
}

/// Evaluate a whitelist/blacklist pair: included iff it matches the
/// whitelist (an absent/empty whitelist matches everything) and does not
/// match the blacklist.
pub fn included(text: &str, whitelist: &[String], blacklist: &[String]) -> bool {
    let whitelisted = whitelist.is_empty() || whitelist.iter().any(|p| glob_match(p, text));
    let blacklisted = blacklist.iter().any(|p| glob_match(p, text));
    whitelisted && !blacklisted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_root_variants() {
        assert_eq!(normalize(""), "/");
        assert_eq!(normalize("/"), "/");
        assert_eq!(normalize("a/b"), "/a/b");
        assert_eq!(normalize("//a//b/"), "/a/b");
    }

    #[test]
    fn splits_parent_and_name() {
        assert_eq!(split("/"), None);
        assert_eq!(split("/a"), Some(("/".to_string(), "a")));
        assert_eq!(split("/a/b/c"), Some(("/a/b".to_string(), "c")));
    }

    #[test]
    fn resolves_relative_targets_against_parent() {
        assert_eq!(resolve_relative("/x/y", "z"), "/x/y/z");
        assert_eq!(resolve_relative("/x/y", "../z"), "/x/z");
        assert_eq!(resolve_relative("/x/y", "/abs"), "/abs");
    }

    #[test]
    fn glob_matches_star_and_question() {
        assert!(glob_match("*.zip", "a.zip"));
        assert!(!glob_match("*.zip", "a.zip.bak"));
        assert!(glob_match("a?c", "abc"));
    }

    #[test]
    fn included_respects_whitelist_then_blacklist() {
        let white = vec!["*.txt".to_string()];
        let black = vec!["secret.*".to_string()];
        assert!(included("a.txt", &white, &black));
        assert!(!included("secret.txt", &white, &black));
        assert!(!included("a.bin", &white, &black));
        assert!(included("a.bin", &[], &[]));
    }
}
