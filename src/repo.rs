#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Repository identity, URL list scraping, and text decoding helpers.

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use anyhow::{Context, Result};
use regex::Regex;

/// `https://github.com/<owner>/<repo>` followed by whitespace or a quote.
static GITHUB_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(https://github\.com/.+?/.+?)["\s]"#).expect("valid github url pattern")
});

/// A local clone of one student repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoDescriptor {
    /// Row key: the URL's last path segment without extension.
    pub name: String,
    /// Absolute path of the working tree.
    pub path: PathBuf,
    /// Origin URL, when known.
    pub url:  Option<String>,
}

impl RepoDescriptor {
    /// Describes the clone of `url` inside `folder`.
    pub fn from_url(url: &str, folder: &Path) -> Result<Self> {
        let name = repo_name_from_url(url);
        anyhow::ensure!(!name.is_empty(), "Cannot derive a repository name from {url}");
        let path = std::path::absolute(folder.join(&name))
            .with_context(|| format!("Could not resolve {}", folder.display()))?;
        Ok(Self {
            name,
            path,
            url: Some(url.to_string()),
        })
    }

    /// Describes an existing directory with no known origin.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            name,
            path,
            url: None,
        }
    }
}

/// Every GitHub repository URL in `text`, in order of appearance.
///
/// A URL only counts when a double quote or whitespace terminates it.
pub fn github_urls(text: &str) -> Vec<String> {
    GITHUB_URL
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Last path segment of `url` with any extension removed.
pub fn repo_name_from_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    Path::new(last)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Inserts or replaces the user component of an `https://` URL.
pub fn with_user(url: &str, user: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let (authority, path) = match rest.find('/') {
        Some(index) => rest.split_at(index),
        None => (rest, ""),
    };
    let host = authority
        .rsplit_once('@')
        .map_or(authority, |(_, host)| host);
    format!("{scheme}://{user}@{host}{path}")
}

/// Decodes `bytes` as UTF-8, dropping a leading byte-order mark.
///
/// Returns `None` for any other encoding.
pub fn decode_text(bytes: Vec<u8>) -> Option<String> {
    let text = String::from_utf8(bytes).ok()?;
    Some(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

/// Reads `path` and decodes it with [`decode_text`].
///
/// I/O failures are errors; undecodable content is `Ok(None)`.
pub async fn read_text(path: &Path) -> Result<Option<String>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Could not read {}", path.display()))?;
    Ok(decode_text(bytes))
}

/// Reads a URL list file and extracts its GitHub URLs.
pub async fn read_url_list(path: &Path) -> Result<Vec<String>> {
    let text = read_text(path)
        .await?
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    Ok(github_urls(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_need_a_terminator() {
        let text = "<a href=\"https://github.com/org/alpha\">x</a>\n\
                    https://github.com/org/beta.git \n\
                    https://github.com/org/gamma";
        assert_eq!(
            github_urls(text),
            ["https://github.com/org/alpha", "https://github.com/org/beta.git"]
        );
    }

    #[test]
    fn name_strips_slash_and_extension() {
        assert_eq!(repo_name_from_url("https://github.com/org/beta.git"), "beta");
        assert_eq!(repo_name_from_url("https://github.com/org/alpha/"), "alpha");
        assert_eq!(repo_name_from_url("https://github.com/org/a.b.git"), "a.b");
    }

    #[test]
    fn user_is_inserted_or_replaced() {
        assert_eq!(
            with_user("https://github.com/org/alpha", "ta"),
            "https://ta@github.com/org/alpha"
        );
        assert_eq!(
            with_user("https://old@github.com/org/alpha", "ta"),
            "https://ta@github.com/org/alpha"
        );
        assert_eq!(with_user("not a url", "ta"), "not a url");
    }

    #[test]
    fn decoding_accepts_bom_and_rejects_other_encodings() {
        assert_eq!(decode_text(b"\xef\xbb\xbfprint(1)".to_vec()).as_deref(), Some("print(1)"));
        assert_eq!(decode_text(Vec::new()).as_deref(), Some(""));
        assert_eq!(decode_text(vec![0xc7, 0xd1, 0xb1, 0xdb]), None);
    }

    #[test]
    fn descriptor_from_url_joins_folder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo =
            RepoDescriptor::from_url("https://github.com/org/beta.git", dir.path()).expect("repo");
        assert_eq!(repo.name, "beta");
        assert!(repo.path.ends_with("beta"));
        assert!(repo.path.is_absolute());
    }
}
