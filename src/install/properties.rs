//! In-place `key=value` line substitution for the agent configuration file.

use crate::error::Result;
use std::path::Path;

/// Replaces every line whose key is `key` with `line`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub key: String,
    pub line: String,
}

impl Replacement {
    pub fn new(key: impl Into<String>, value: impl std::fmt::Display) -> Self {
        let key = key.into();
        let line = format!("{}={}", key, value);
        Self { key, line }
    }

    fn matches(&self, line: &str) -> bool {
        let line = line.trim_start();
        if line.starts_with('#') || line.starts_with('!') {
            return false;
        }
        matches!(line.split_once('='), Some((key, _)) if key.trim() == self.key)
    }
}

/// Applies `replacements` to `content`.
///
/// Lines that match no replacement, comments and line endings are kept as
/// they are. Returns the new content and the keys that matched no line.
pub fn rewrite_lines<'r>(
    content: &str,
    replacements: &'r [Replacement],
) -> (String, Vec<&'r str>) {
    let mut out = String::with_capacity(content.len());
    let mut matched = vec![false; replacements.len()];

    for segment in content.split_inclusive('\n') {
        let (body, ending) = match segment.strip_suffix("\r\n") {
            Some(body) => (body, "\r\n"),
            None => match segment.strip_suffix('\n') {
                Some(body) => (body, "\n"),
                None => (segment, ""),
            },
        };

        match replacements.iter().position(|r| r.matches(body)) {
            Some(i) => {
                matched[i] = true;
                out.push_str(&replacements[i].line);
            }
            None => out.push_str(body),
        }
        out.push_str(ending);
    }

    let unmatched = replacements
        .iter()
        .zip(matched)
        .filter(|(_, hit)| !hit)
        .map(|(r, _)| r.key.as_str())
        .collect();

    (out, unmatched)
}

/// Rewrites `path` in place and returns the keys that matched no line.
///
/// The new content goes to a sibling temp file first and is renamed over
/// the original.
pub async fn rewrite_config_lines(path: &Path, replacements: &[Replacement]) -> Result<Vec<String>> {
    let content = tokio::fs::read_to_string(path).await?;
    let (rewritten, unmatched) = rewrite_lines(&content, replacements);

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp, rewritten).await?;
    tokio::fs::rename(&tmp, path).await?;

    Ok(unmatched.into_iter().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIST: &str = "\
## The address of the server
serverUrl=http://localhost:8111/

# Name of the agent
name=

## Container port
ownPort=9090
workDir=../work
";

    fn replacements() -> Vec<Replacement> {
        vec![
            Replacement::new("serverUrl", "http://ci.example.com:80"),
            Replacement::new("name", "Agent1"),
            Replacement::new("ownPort", 9191),
        ]
    }

    #[test]
    fn test_rewrite_known_keys() {
        let replacements = replacements();
        let (out, unmatched) = rewrite_lines(DIST, &replacements);

        assert!(unmatched.is_empty());
        assert_eq!(
            out,
            "\
## The address of the server
serverUrl=http://ci.example.com:80

# Name of the agent
name=Agent1

## Container port
ownPort=9191
workDir=../work
"
        );
    }

    #[test]
    fn test_rewrite_is_idempotent() {
        let replacements = replacements();
        let (once, _) = rewrite_lines(DIST, &replacements);
        let (twice, _) = rewrite_lines(&once, &replacements);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_commented_keys_are_left_alone() {
        let replacements = vec![Replacement::new("name", "Agent1")];
        let (out, unmatched) = rewrite_lines("#name=old\n!name=old\n", &replacements);

        assert_eq!(out, "#name=old\n!name=old\n");
        assert_eq!(unmatched, vec!["name"]);
    }

    #[test]
    fn test_key_prefix_does_not_match() {
        let replacements = vec![Replacement::new("name", "Agent1")];
        let (out, _) = rewrite_lines("names=a\n  name = b\n", &replacements);
        assert_eq!(out, "names=a\nname=Agent1\n");
    }

    #[test]
    fn test_crlf_and_missing_trailing_newline() {
        let replacements = vec![Replacement::new("ownPort", 1)];
        let (out, _) = rewrite_lines("a=1\r\nownPort=9090", &replacements);
        assert_eq!(out, "a=1\r\nownPort=1");
    }

    #[tokio::test]
    async fn test_rewrite_config_lines_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("buildAgent.properties");
        std::fs::write(&path, "name=\nserverUrl=\n").unwrap();

        let unmatched = rewrite_config_lines(&path, &replacements()).await.unwrap();

        assert_eq!(unmatched, vec!["ownPort".to_string()]);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "name=Agent1\nserverUrl=http://ci.example.com:80\n"
        );
        assert!(!dir.path().join("buildAgent.properties.tmp").exists());
    }
}
