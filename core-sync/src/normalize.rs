//! Feed URL canonicalization and episode identity.
//!
//! Every set operation on feed URLs (queue dedup, "already subscribed"
//! checks, first-sync seeding) compares through [`canonicalize_url`], so
//! `HTTP://Example.com/feed` and `http://example.com/feed` are one feed.
//! The canonical form is only a comparison key: the library, the queue and
//! the server always see a URL as it was originally reported.

use url::Url;

use crate::model::EpisodeAction;

/// A GUID is usable when it is non-blank and not the literal `"null"`
/// some servers emit.
pub fn is_valid_guid(guid: Option<&str>) -> bool {
    match guid {
        Some(guid) => {
            let trimmed = guid.trim();
            !trimmed.is_empty() && trimmed != "null"
        }
        None => false,
    }
}

/// The GUID if [`is_valid_guid`] accepts it.
pub fn valid_guid(guid: Option<&str>) -> Option<&str> {
    if is_valid_guid(guid) {
        guid.map(str::trim)
    } else {
        None
    }
}

/// Canonical form of a feed or episode URL.
///
/// Podcast-client schemes (`feed://`, `itpc://`, `pcast://`) become
/// `http://`, a missing scheme defaults to `http://`, and the result is
/// normalized by the WHATWG parser (lowercase scheme and host, default port
/// dropped). Input that still does not parse is returned trimmed.
pub fn canonicalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let lower = trimmed.to_ascii_lowercase();
    let prepared = if let Some(rest) = strip_podcast_scheme(trimmed, &lower) {
        if rest.contains("://") {
            // feed:https://example.com/rss
            rest.to_string()
        } else {
            format!("http://{}", rest)
        }
    } else if !lower.contains("://") {
        format!("http://{}", trimmed)
    } else {
        trimmed.to_string()
    };

    match Url::parse(&prepared) {
        Ok(url) => url.to_string(),
        Err(_) => prepared,
    }
}

fn strip_podcast_scheme<'a>(original: &'a str, lower: &str) -> Option<&'a str> {
    const SCHEMES: &[&str] = &["feed://", "itpc://", "pcast://", "feed:", "pcast:", "itpc:"];
    SCHEMES
        .iter()
        .find(|scheme| lower.starts_with(**scheme))
        .map(|scheme| &original[scheme.len()..])
}

/// True when `urls` contains `candidate` after canonicalization.
pub fn contains_url(urls: &[String], candidate: &str) -> bool {
    find_url(urls, candidate).is_some()
}

/// The entry of `urls` that refers to the same feed as `candidate`.
pub fn find_url<'a>(urls: &'a [String], candidate: &str) -> Option<&'a String> {
    let candidate = canonicalize_url(candidate);
    if candidate.is_empty() {
        return None;
    }
    urls.iter().find(|url| canonicalize_url(url) == candidate)
}

/// Trim and deduplicate by canonical key, keeping the first-seen spelling
/// of each feed in first-seen order.
pub fn unique_urls<I, S>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut keys: Vec<String> = Vec::new();
    let mut out: Vec<String> = Vec::new();
    for url in urls {
        let trimmed = url.as_ref().trim();
        let key = canonicalize_url(trimmed);
        if !key.is_empty() && !keys.contains(&key) {
            keys.push(key);
            out.push(trimmed.to_string());
        }
    }
    out
}

/// Normalized identity of an episode.
///
/// Two keys refer to the same episode when both carry a GUID and the GUIDs
/// are equal, or otherwise when their canonical episode URLs are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EpisodeKey {
    pub guid: Option<String>,
    pub episode_url: String,
}

impl EpisodeKey {
    pub fn new(guid: Option<&str>, episode_url: &str) -> Self {
        Self {
            guid: valid_guid(guid).map(str::to_string),
            episode_url: canonicalize_url(episode_url),
        }
    }

    pub fn for_action(action: &EpisodeAction) -> Self {
        Self::new(action.guid.as_deref(), &action.episode)
    }

    pub fn matches(&self, other: &EpisodeKey) -> bool {
        match (&self.guid, &other.guid) {
            (Some(a), Some(b)) => a == b,
            _ => self.episode_url == other.episode_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EpisodeActionKind;

    #[test]
    fn test_guid_validation() {
        assert!(is_valid_guid(Some("abc-123")));
        assert!(!is_valid_guid(Some("")));
        assert!(!is_valid_guid(Some("   ")));
        assert!(!is_valid_guid(Some("null")));
        assert!(!is_valid_guid(None));
        assert_eq!(valid_guid(Some(" abc ")), Some("abc"));
    }

    #[test]
    fn test_canonicalize_podcast_schemes() {
        assert_eq!(
            canonicalize_url("feed://example.com/rss"),
            "http://example.com/rss"
        );
        assert_eq!(
            canonicalize_url("itpc://example.com/rss"),
            "http://example.com/rss"
        );
        assert_eq!(
            canonicalize_url("feed:https://example.com/rss"),
            "https://example.com/rss"
        );
        assert_eq!(canonicalize_url("example.com/rss"), "http://example.com/rss");
    }

    #[test]
    fn test_canonicalize_case_and_port() {
        assert_eq!(
            canonicalize_url("  HTTPS://Example.COM:443/Feed.xml "),
            "https://example.com/Feed.xml"
        );
        assert_eq!(canonicalize_url("http://example.com"), "http://example.com/");
    }

    #[test]
    fn test_canonicalize_is_stable() {
        for raw in [
            "feed://Example.com/rss",
            "https://example.com/a b",
            "example.com",
            "not a url at all ::",
            "",
        ] {
            let once = canonicalize_url(raw);
            assert_eq!(canonicalize_url(&once), once, "unstable for {:?}", raw);
        }
    }

    #[test]
    fn test_lookup_and_unique_urls_keep_original_spelling() {
        let local = vec!["http://Example.com/feed".to_string()];
        assert!(contains_url(&local, "http://example.com/feed"));
        assert!(!contains_url(&local, "http://example.com/other"));
        assert_eq!(
            find_url(&local, "HTTP://EXAMPLE.com/feed").map(String::as_str),
            Some("http://Example.com/feed")
        );
        assert_eq!(find_url(&local, "  "), None);

        let set = unique_urls([" HTTP://A.COM/x", "http://a.com/x", "http://b.com", "", "http://b.com/"]);
        assert_eq!(set, vec!["HTTP://A.COM/x", "http://b.com"]);
    }

    #[test]
    fn test_episode_key_matching() {
        let by_guid = EpisodeKey::new(Some("g1"), "http://example.com/ep.mp3");
        let by_url = EpisodeKey::new(None, "HTTP://example.com/ep.mp3");
        let other_guid = EpisodeKey::new(Some("g2"), "http://example.com/ep.mp3");
        let null_guid = EpisodeKey::new(Some("null"), "http://example.com/ep.mp3");

        assert!(by_guid.matches(&by_url));
        assert!(!by_guid.matches(&other_guid));
        assert_eq!(null_guid.guid, None);
        assert!(null_guid.matches(&by_url));
    }

    #[test]
    fn test_episode_key_is_stable_for_equivalent_references() {
        let action = EpisodeAction::builder("p", " http://Example.com/ep.mp3", EpisodeActionKind::Play)
            .guid("g1")
            .build();
        let first = EpisodeKey::for_action(&action);
        let second = EpisodeKey::new(first.guid.as_deref(), &first.episode_url);
        assert_eq!(first, second);
    }
}
