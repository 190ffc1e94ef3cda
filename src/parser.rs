//! Turns raw RSS or Atom markup into normalized [`FeedEntry`] values.
//!
//! feed-rs detects the format and maps both `<item>` and `<entry>` containers
//! onto one model. Each logical field is then read through an ordered list of
//! candidate selectors; the first non-empty candidate wins.

use chrono::{DateTime, Utc};
use feed_rs::model::Entry;
use feed_rs::parser;
use thiserror::Error;
use tracing::debug;

use crate::config::FeedConfig;
use crate::model::FeedEntry;

/// Maximum summary length in characters, before the ellipsis.
pub const SUMMARY_MAX_CHARS: usize = 250;
const ELLIPSIS: &str = "...";

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed feed document: {0}")]
    Malformed(#[from] parser::ParseFeedError),
}

type TextSelector = fn(&Entry) -> Option<String>;
type DateSelector = fn(&Entry) -> Option<DateTime<Utc>>;

const TITLE_FIELDS: &[TextSelector] = &[entry_title, media_title];
const LINK_FIELDS: &[TextSelector] = &[alternate_link, any_link];
const DATE_FIELDS: &[DateSelector] = &[published_date, updated_date];
const SUMMARY_FIELDS: &[TextSelector] = &[entry_summary, content_body, media_description];

fn entry_title(entry: &Entry) -> Option<String> {
    entry.title.as_ref().map(|t| t.content.clone())
}

// YouTube channel feeds carry the video title inside media:group.
fn media_title(entry: &Entry) -> Option<String> {
    entry
        .media
        .iter()
        .find_map(|m| m.title.as_ref().map(|t| t.content.clone()))
}

fn alternate_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .filter(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
        .map(|l| l.href.clone())
        .find(|href| !href.trim().is_empty())
}

fn any_link(entry: &Entry) -> Option<String> {
    entry
        .links
        .iter()
        .map(|l| l.href.clone())
        .find(|href| !href.trim().is_empty())
}

fn published_date(entry: &Entry) -> Option<DateTime<Utc>> {
    entry.published
}

fn updated_date(entry: &Entry) -> Option<DateTime<Utc>> {
    entry.updated
}

fn entry_summary(entry: &Entry) -> Option<String> {
    entry.summary.as_ref().map(|s| s.content.clone())
}

fn content_body(entry: &Entry) -> Option<String> {
    entry.content.as_ref().and_then(|c| c.body.clone())
}

fn media_description(entry: &Entry) -> Option<String> {
    entry
        .media
        .iter()
        .find_map(|m| m.description.as_ref().map(|d| d.content.clone()))
}

/// First candidate that is non-empty after trimming, returned trimmed.
fn first_text(entry: &Entry, selectors: &[TextSelector]) -> Option<String> {
    selectors
        .iter()
        .filter_map(|select| select(entry))
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
}

fn first_date(entry: &Entry, selectors: &[DateSelector]) -> Option<DateTime<Utc>> {
    selectors.iter().find_map(|select| select(entry))
}

/// Parses a feed document for `source`.
///
/// Entries missing a title or a link are dropped. Entries without a usable
/// date are stamped with the time of this call.
pub fn parse_feed(bytes: &[u8], source: &FeedConfig) -> Result<Vec<FeedEntry>, ParseError> {
    let now = Utc::now();
    let feed = parser::parse(bytes)?;
    let total = feed.entries.len();

    let entries: Vec<FeedEntry> = feed
        .entries
        .iter()
        .filter_map(|entry| {
            let title = first_text(entry, TITLE_FIELDS)?;
            let link = first_text(entry, LINK_FIELDS)?;
            let published_at = first_date(entry, DATE_FIELDS).unwrap_or(now);
            let summary = first_text(entry, SUMMARY_FIELDS)
                .map(|raw| clean_summary(&raw))
                .unwrap_or_default();

            Some(FeedEntry::new(source, title, link, published_at, summary))
        })
        .collect();

    if entries.len() < total {
        debug!(
            "Dropped {} entries without title or link from '{}'",
            total - entries.len(),
            source.name
        );
    }

    Ok(entries)
}

/// Strips markup, decodes entities, trims and truncates a summary.
pub fn clean_summary(raw: &str) -> String {
    let stripped = strip_tags(raw);
    let decoded = html_escape::decode_html_entities(&stripped);
    truncate_chars(decoded.trim(), SUMMARY_MAX_CHARS)
}

/// Removes every `<...>` tag. A `<` with no closing `>` is kept as text.
pub fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(open) = rest.find('<') {
        match rest[open..].find('>') {
            Some(close) => {
                out.push_str(&rest[..open]);
                rest = &rest[open + close + 1..];
            }
            None => break,
        }
    }
    out.push_str(rest);

    out
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &s[..cut], ELLIPSIS),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> FeedConfig {
        FeedConfig {
            name: "r/churning".to_string(),
            url: "https://www.reddit.com/r/churning/.rss".to_string(),
            category: "reddit".to_string(),
            icon: "R".to_string(),
            icon_url: None,
            description: None,
        }
    }

    fn rss_with_items(items: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <rss version="2.0">
                <channel>
                    <title>Test</title>
                    <link>https://example.com</link>
                    <description>Test feed</description>
                    {}
                </channel>
            </rss>"#,
            items
        )
    }

    mod strip_tags_tests {
        use super::*;

        #[test]
        fn test_removes_tags() {
            assert_eq!(strip_tags("<p>Hello <b>world</b></p>"), "Hello world");
        }

        #[test]
        fn test_tag_with_attributes() {
            assert_eq!(
                strip_tags(r#"<a href="https://x.com">link</a> text"#),
                "link text"
            );
        }

        #[test]
        fn test_unclosed_bracket_is_kept() {
            assert_eq!(strip_tags("1 < 2"), "1 < 2");
        }

        #[test]
        fn test_plain_text_unchanged() {
            assert_eq!(strip_tags("no markup"), "no markup");
        }
    }

    mod clean_summary_tests {
        use super::*;

        #[test]
        fn test_decodes_entities() {
            assert_eq!(clean_summary("Tom &amp; Jerry &quot;live&quot;"), "Tom & Jerry \"live\"");
        }

        #[test]
        fn test_strips_then_trims() {
            assert_eq!(clean_summary("  <div>\n  Body text  </div>\n"), "Body text");
        }

        #[test]
        fn test_300_chars_truncated_to_250_plus_ellipsis() {
            let input = "a".repeat(300);
            let summary = clean_summary(&input);
            assert_eq!(summary, format!("{}...", "a".repeat(250)));
            assert_eq!(summary.chars().count(), 253);
        }

        #[test]
        fn test_100_chars_unchanged() {
            let input = "b".repeat(100);
            assert_eq!(clean_summary(&input), input);
        }

        #[test]
        fn test_exactly_250_chars_unchanged() {
            let input = "c".repeat(250);
            assert_eq!(clean_summary(&input), input);
        }

        #[test]
        fn test_truncates_by_chars_not_bytes() {
            let input = "é".repeat(260);
            let summary = clean_summary(&input);
            assert_eq!(summary.chars().count(), 253);
            assert!(summary.ends_with("..."));
        }
    }

    mod parse_feed_tests {
        use super::*;

        #[test]
        fn test_parse_rss_items() {
            let xml = rss_with_items(
                r#"
                <item>
                    <title>First Post</title>
                    <link>https://example.com/1</link>
                    <pubDate>Mon, 09 Dec 2024 12:00:00 GMT</pubDate>
                    <description>&lt;p&gt;Hello &amp;amp; welcome&lt;/p&gt;</description>
                </item>
                <item>
                    <title>Second Post</title>
                    <link>https://example.com/2</link>
                    <pubDate>Mon, 09 Dec 2024 10:00:00 GMT</pubDate>
                </item>
                "#,
            );

            let entries = parse_feed(xml.as_bytes(), &source()).unwrap();

            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].title, "First Post");
            assert_eq!(entries[0].link, "https://example.com/1");
            assert_eq!(entries[0].summary, "Hello & welcome");
            assert_eq!(
                entries[0].published_at,
                DateTime::parse_from_rfc3339("2024-12-09T12:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc)
            );
            assert_eq!(entries[0].source_name, "r/churning");
            assert_eq!(entries[0].category, "reddit");
            assert_eq!(entries[0].source_icon, "R");
            assert_eq!(entries[1].summary, "");
        }

        #[test]
        fn test_parse_atom_entries() {
            let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
                <feed xmlns="http://www.w3.org/2005/Atom">
                    <title>Atom Test</title>
                    <id>urn:test</id>
                    <updated>2024-12-09T12:00:00Z</updated>
                    <entry>
                        <title>Atom Entry</title>
                        <id>urn:test:1</id>
                        <link href="https://example.com/atom/1"/>
                        <published>2024-12-08T08:30:00Z</published>
                        <updated>2024-12-09T09:00:00Z</updated>
                        <summary>Short summary</summary>
                    </entry>
                </feed>"#;

            let entries = parse_feed(xml.as_bytes(), &source()).unwrap();

            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].title, "Atom Entry");
            assert_eq!(entries[0].link, "https://example.com/atom/1");
            assert_eq!(entries[0].summary, "Short summary");
            assert_eq!(
                entries[0].published_at,
                DateTime::parse_from_rfc3339("2024-12-08T08:30:00Z")
                    .unwrap()
                    .with_timezone(&Utc)
            );
        }

        #[test]
        fn test_atom_updated_used_when_published_missing() {
            let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
                <feed xmlns="http://www.w3.org/2005/Atom">
                    <title>Atom Test</title>
                    <id>urn:test</id>
                    <updated>2024-12-09T12:00:00Z</updated>
                    <entry>
                        <title>Only Updated</title>
                        <id>urn:test:1</id>
                        <link href="https://example.com/atom/1"/>
                        <updated>2024-12-09T09:00:00Z</updated>
                    </entry>
                </feed>"#;

            let entries = parse_feed(xml.as_bytes(), &source()).unwrap();
            assert_eq!(
                entries[0].published_at,
                DateTime::parse_from_rfc3339("2024-12-09T09:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc)
            );
        }

        #[test]
        fn test_atom_prefers_alternate_link() {
            let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
                <feed xmlns="http://www.w3.org/2005/Atom">
                    <title>Atom Test</title>
                    <id>urn:test</id>
                    <updated>2024-12-09T12:00:00Z</updated>
                    <entry>
                        <title>Linked</title>
                        <id>urn:test:1</id>
                        <link rel="replies" href="https://example.com/atom/1/comments"/>
                        <link rel="alternate" href="https://example.com/atom/1"/>
                        <updated>2024-12-09T09:00:00Z</updated>
                    </entry>
                </feed>"#;

            let entries = parse_feed(xml.as_bytes(), &source()).unwrap();
            assert_eq!(entries[0].link, "https://example.com/atom/1");
        }

        #[test]
        fn test_drops_items_without_title_or_link() {
            let xml = rss_with_items(
                r#"
                <item>
                    <title>   </title>
                    <link>https://example.com/blank-title</link>
                </item>
                <item>
                    <link>https://example.com/no-title</link>
                </item>
                <item>
                    <title>No link</title>
                </item>
                <item>
                    <title>Valid</title>
                    <link>https://example.com/valid</link>
                </item>
                "#,
            );

            let entries = parse_feed(xml.as_bytes(), &source()).unwrap();

            assert_eq!(entries.len(), 1);
            assert_eq!(entries[0].title, "Valid");
            for entry in &entries {
                assert!(!entry.title.trim().is_empty());
                assert!(!entry.link.trim().is_empty());
            }
        }

        #[test]
        fn test_trims_title_and_link() {
            let xml = rss_with_items(
                r#"
                <item>
                    <title>
                        Padded Title
                    </title>
                    <link>  https://example.com/padded  </link>
                </item>
                "#,
            );

            let entries = parse_feed(xml.as_bytes(), &source()).unwrap();
            assert_eq!(entries[0].title, "Padded Title");
            assert_eq!(entries[0].link, "https://example.com/padded");
        }

        #[test]
        fn test_missing_date_defaults_to_now() {
            let xml = rss_with_items(
                r#"
                <item>
                    <title>Undated</title>
                    <link>https://example.com/undated</link>
                </item>
                "#,
            );

            let before = Utc::now();
            let entries = parse_feed(xml.as_bytes(), &source()).unwrap();
            let after = Utc::now();

            assert!(entries[0].published_at >= before);
            assert!(entries[0].published_at <= after);
        }

        #[test]
        fn test_long_description_truncated() {
            let long = "x".repeat(300);
            let xml = rss_with_items(&format!(
                r#"
                <item>
                    <title>Long</title>
                    <link>https://example.com/long</link>
                    <description>{}</description>
                </item>
                "#,
                long
            ));

            let entries = parse_feed(xml.as_bytes(), &source()).unwrap();
            assert_eq!(entries[0].summary, format!("{}...", "x".repeat(250)));
        }

        #[test]
        fn test_malformed_document_is_error() {
            let result = parse_feed(b"this is not a feed at all", &source());
            assert!(matches!(result, Err(ParseError::Malformed(_))));
        }

        #[test]
        fn test_empty_channel_yields_no_entries() {
            let xml = rss_with_items("");
            let entries = parse_feed(xml.as_bytes(), &source()).unwrap();
            assert!(entries.is_empty());
        }
    }
}
