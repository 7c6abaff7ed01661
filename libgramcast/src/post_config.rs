//! Post description parsing
//!
//! A media folder carries a `post.yaml` describing the caption and metadata
//! for the post. Older folders use a Markdown file with one `## Heading` per
//! field; it is still read when the YAML file is missing. A broken or absent
//! description never stops a run: the post goes out with default metadata and
//! the problem is logged.

use chrono::{DateTime, FixedOffset};
use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;
use tracing::warn;

/// Normalized description of one post
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostConfig {
    pub caption: String,
    /// Space-joined hashtags, each starting with `#`
    pub hashtags: String,
    pub alt_text: String,
    /// Location page id; empty when not set
    pub location: String,
    /// Handles without the leading `@`
    pub user_tags: Vec<String>,
    pub product_tags: Vec<String>,
    pub branded_content_partner: String,
    pub disable_comments: bool,
    pub hide_like_count: bool,
    pub collaborators: Vec<String>,
    pub scheduled_publish_time: Option<String>,
    pub notes: String,
}

impl PostConfig {
    /// A post with only a caption
    pub fn with_caption(caption: impl Into<String>) -> Self {
        Self {
            caption: caption.into(),
            ..Default::default()
        }
    }

    /// Caption followed by a blank line and the hashtags, or the caption alone
    pub fn full_caption(&self) -> String {
        if self.hashtags.is_empty() {
            self.caption.clone()
        } else {
            format!("{}\n\n{}", self.caption, self.hashtags)
        }
    }

    pub fn location_id(&self) -> Option<&str> {
        non_empty(&self.location)
    }

    pub fn alt_text(&self) -> Option<&str> {
        non_empty(&self.alt_text)
    }

    /// `scheduled_publish_time` as a timestamp, when it is valid RFC 3339
    pub fn scheduled_at(&self) -> Option<DateTime<FixedOffset>> {
        self.scheduled_publish_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s.trim()).ok())
    }

    /// Read the post description at `path`
    ///
    /// Falls back to the sibling `.md` file when `path` does not exist, and to
    /// defaults when neither exists or the YAML cannot be parsed.
    pub fn parse(path: &Path) -> Self {
        if !path.exists() {
            let legacy = path.with_extension("md");
            if legacy != path && legacy.exists() {
                warn!(
                    "Found legacy {}; please migrate to {}",
                    legacy.display(),
                    path.display()
                );
                return Self::parse_legacy_file(&legacy);
            }
            warn!("No post description at {}, using defaults", path.display());
            return Self::default();
        }

        if path.extension().and_then(|e| e.to_str()) == Some("md") {
            return Self::parse_legacy_file(path);
        }

        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse_yaml(&content),
            Err(e) => {
                warn!("Failed to read {}: {}; using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse the structured format; malformed input yields defaults
    pub fn parse_yaml(content: &str) -> Self {
        if content.trim().is_empty() {
            return Self::default();
        }

        let value: serde_yaml::Value = match serde_yaml::from_str(content) {
            Ok(value) => value,
            Err(e) => {
                warn!("Error parsing post description YAML: {}; using defaults", e);
                return Self::default();
            }
        };

        match value {
            serde_yaml::Value::Null => Self::default(),
            serde_yaml::Value::Mapping(_) => match serde_yaml::from_value::<PostFile>(value) {
                Ok(file) => file.into(),
                Err(e) => {
                    warn!("Invalid post description: {}; using defaults", e);
                    Self::default()
                }
            },
            _ => {
                warn!("Post description is not a mapping; using defaults");
                Self::default()
            }
        }
    }

    fn parse_legacy_file(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::parse_legacy(&content),
            Err(e) => {
                warn!("Failed to read {}: {}; using defaults", path.display(), e);
                Self::default()
            }
        }
    }

    /// Parse the legacy Markdown format (`## Caption`, `## Hashtags`, ...)
    pub fn parse_legacy(content: &str) -> Self {
        let content = content.replace("\r\n", "\n");
        let mut config = Self::default();

        if let Some(value) = legacy_section(&content, "Caption") {
            config.caption = value;
        }
        if let Some(value) = legacy_section(&content, "Hashtags") {
            config.hashtags = value;
        }
        if let Some(value) = legacy_section(&content, "Alt Text") {
            config.alt_text = value;
        }
        if let Some(value) = legacy_section(&content, "Location") {
            config.location = value;
        }
        if let Some(value) = legacy_section(&content, "User Tags") {
            config.user_tags = extract_mentions(&value);
        }
        if let Some(value) = legacy_section(&content, "Product Tags") {
            config.product_tags = value
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(value) = legacy_section(&content, "Branded Content") {
            config.branded_content_partner = value;
        }
        if let Some(value) = legacy_section(&content, "Comments Disabled") {
            config.disable_comments = legacy_bool(&value);
        }
        if let Some(value) = legacy_section(&content, "Hide Like Count") {
            config.hide_like_count = legacy_bool(&value);
        }

        config
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Body of `## {heading}` up to the next `##` heading or end of input, trimmed
fn legacy_section(content: &str, heading: &str) -> Option<String> {
    let marker = format!("## {}\n", heading);
    let start = content.find(&marker)? + marker.len();
    let rest = &content[start..];
    let end = rest.find("\n##").unwrap_or(rest.len());
    Some(rest[..end].trim().to_string())
}

fn extract_mentions(text: &str) -> Vec<String> {
    match Regex::new(r"@(\w+)") {
        Ok(mention) => mention
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect(),
        Err(_) => Vec::new(),
    }
}

fn legacy_bool(value: &str) -> bool {
    value.to_lowercase() == "true"
}

/// Prefix each tag with `#` unless it already has one
pub fn normalize_hashtags<S: AsRef<str>>(tags: &[S]) -> String {
    tags.iter()
        .map(|tag| {
            let tag = tag.as_ref();
            if tag.starts_with('#') {
                tag.to_string()
            } else {
                format!("#{}", tag)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strip leading `@` from handles, dropping entries that end up empty
pub fn normalize_user_tags<S: AsRef<str>>(tags: &[S]) -> Vec<String> {
    tags.iter()
        .map(|tag| tag.as_ref().trim_start_matches('@').to_string())
        .filter(|tag| !tag.is_empty())
        .collect()
}

// ============================================================================
// YAML schema
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostFile {
    #[serde(deserialize_with = "lenient_string")]
    caption: String,
    #[serde(deserialize_with = "lenient_hashtags")]
    hashtags: String,
    #[serde(deserialize_with = "lenient_string")]
    alt_text: String,
    #[serde(deserialize_with = "lenient_string")]
    location: String,
    #[serde(deserialize_with = "lenient_list")]
    user_tags: Vec<String>,
    #[serde(deserialize_with = "lenient_list")]
    product_tags: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    branded_content_partner: String,
    #[serde(deserialize_with = "lenient_bool")]
    disable_comments: bool,
    #[serde(deserialize_with = "lenient_bool")]
    hide_like_count: bool,
    #[serde(deserialize_with = "lenient_list")]
    collaborators: Vec<String>,
    #[serde(deserialize_with = "lenient_string")]
    scheduled_publish_time: String,
    #[serde(deserialize_with = "lenient_string")]
    notes: String,
}

impl From<PostFile> for PostConfig {
    fn from(file: PostFile) -> Self {
        let scheduled_publish_time = if file.scheduled_publish_time.trim().is_empty() {
            None
        } else {
            Some(file.scheduled_publish_time)
        };

        PostConfig {
            caption: file.caption.trim().to_string(),
            hashtags: file.hashtags,
            alt_text: file.alt_text,
            location: file.location,
            user_tags: normalize_user_tags(&file.user_tags),
            product_tags: file.product_tags,
            branded_content_partner: file.branded_content_partner,
            disable_comments: file.disable_comments,
            hide_like_count: file.hide_like_count,
            collaborators: file.collaborators,
            scheduled_publish_time,
            notes: file.notes,
        }
    }
}

fn scalar_to_string(value: &serde_yaml::Value) -> Option<String> {
    match value {
        serde_yaml::Value::String(s) => Some(s.clone()),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Accept strings, numbers (location ids are often unquoted) and null
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(scalar_to_string(&value).unwrap_or_default())
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_yaml::Value::Sequence(items) => items.iter().filter_map(scalar_to_string).collect(),
        _ => Vec::new(),
    })
}

/// `hashtags:` is a list of tags (normalized) or one preformatted scalar
fn lenient_hashtags<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_yaml::Value::Sequence(items) => {
            let tags: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
            normalize_hashtags(&tags)
        }
        other => scalar_to_string(&other).unwrap_or_default(),
    })
}

/// Only a real YAML `true` is true; null is false, anything else is false with a warning
fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_yaml::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_yaml::Value::Bool(b) => b,
        serde_yaml::Value::Null => false,
        other => {
            warn!("Expected true or false, got {:?}; treating as false", other);
            false
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_hashtag_list_gains_exactly_one_hash() {
        let config = PostConfig::parse_yaml(
            r##"
caption: "  Sunset over the bay  "
hashtags:
  - sunset
  - "#travel"
  - bay2025
"##,
        );

        assert_eq!(config.caption, "Sunset over the bay");
        assert_eq!(config.hashtags, "#sunset #travel #bay2025");
        assert_eq!(
            config.full_caption(),
            "Sunset over the bay\n\n#sunset #travel #bay2025"
        );
    }

    #[test]
    fn test_hashtag_string_is_verbatim() {
        let config = PostConfig::parse_yaml("caption: Hi\nhashtags: \"#one #two\"\n");
        assert_eq!(config.hashtags, "#one #two");
    }

    #[test]
    fn test_full_caption_without_hashtags_is_caption() {
        let config = PostConfig::parse_yaml("caption: Just words\n");
        assert_eq!(config.full_caption(), "Just words");

        let config = PostConfig::parse_yaml("caption: Just words\nhashtags: []\n");
        assert_eq!(config.full_caption(), "Just words");
    }

    #[test]
    fn test_all_fields() {
        let config = PostConfig::parse_yaml(
            r#"
caption: Caption
alt_text: A red boat
location: 110843418940484
user_tags: ["@alice", "bob", "", "@@carol"]
product_tags: [p1, p2]
branded_content_partner: acme
disable_comments: true
hide_like_count: true
collaborators: [dave]
scheduled_publish_time: "2026-03-01T09:00:00+00:00"
notes: internal only
"#,
        );

        assert_eq!(config.alt_text(), Some("A red boat"));
        assert_eq!(config.location_id(), Some("110843418940484"));
        assert_eq!(config.user_tags, vec!["alice", "bob", "carol"]);
        assert_eq!(config.product_tags, vec!["p1", "p2"]);
        assert_eq!(config.branded_content_partner, "acme");
        assert!(config.disable_comments);
        assert!(config.hide_like_count);
        assert_eq!(config.collaborators, vec!["dave"]);
        assert!(config.scheduled_at().is_some());
        assert_eq!(config.notes, "internal only");
    }

    #[test]
    fn test_unparseable_schedule_kept_as_text() {
        let config = PostConfig::parse_yaml("scheduled_publish_time: next tuesday\n");
        assert_eq!(config.scheduled_publish_time.as_deref(), Some("next tuesday"));
        assert!(config.scheduled_at().is_none());
    }

    #[test]
    fn test_malformed_yaml_degrades_to_default() {
        let config = PostConfig::parse_yaml("caption: [unclosed\nhashtags: :\n  - x");
        assert_eq!(config, PostConfig::default());

        let config = PostConfig::parse_yaml("- just\n- a list\n");
        assert_eq!(config, PostConfig::default());
    }

    #[test]
    fn test_mistyped_field_keeps_caption() {
        let config =
            PostConfig::parse_yaml("caption: Hello\nhashtags: [a]\ndisable_comments:\n");
        assert_eq!(config.caption, "Hello");
        assert_eq!(config.hashtags, "#a");
        assert!(!config.disable_comments);

        let config = PostConfig::parse_yaml("caption: Hello\nhide_like_count: \"yes\"\n");
        assert_eq!(config.caption, "Hello");
        assert!(!config.hide_like_count);

        let config = PostConfig::parse_yaml("caption: Hello\nhashtags: 2024\n");
        assert_eq!(config.caption, "Hello");
        assert_eq!(config.hashtags, "2024");

        let config = PostConfig::parse_yaml("caption: Hello\nhashtags:\ndisable_comments: true\n");
        assert_eq!(config.full_caption(), "Hello");
        assert!(config.disable_comments);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(PostConfig::parse_yaml(""), PostConfig::default());
        assert_eq!(PostConfig::parse_yaml("~\n"), PostConfig::default());
    }

    #[test]
    fn test_parse_missing_files_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = PostConfig::parse(&temp_dir.path().join("post.yaml"));

        assert_eq!(config, PostConfig::default());
        assert_eq!(config.full_caption(), "");
        assert!(!config.disable_comments);
    }

    #[test]
    fn test_parse_falls_back_to_legacy_markdown() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(
            temp_dir.path().join("post.md"),
            "## Caption\nOld style caption\n\n## Hashtags\n#legacy #post\n",
        )
        .unwrap();

        let config = PostConfig::parse(&temp_dir.path().join("post.yaml"));
        assert_eq!(config.caption, "Old style caption");
        assert_eq!(config.full_caption(), "Old style caption\n\n#legacy #post");
    }

    #[test]
    fn test_parse_prefers_yaml_over_legacy() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("post.yaml"), "caption: from yaml\n").unwrap();
        fs::write(temp_dir.path().join("post.md"), "## Caption\nfrom md\n").unwrap();

        let config = PostConfig::parse(&temp_dir.path().join("post.yaml"));
        assert_eq!(config.caption, "from yaml");
    }

    #[test]
    fn test_legacy_sections() {
        let config = PostConfig::parse_legacy(
            "# My post\n\n\
             ## Caption\nLine one\nLine two\n\n\
             ## Alt Text\nTwo cats\n\n\
             ## Location\n12345\n\n\
             ## User Tags\nThanks @alice and @bob_2, not bob@\n\n\
             ## Product Tags\n 111, 222 ,,333 \n\n\
             ## Branded Content\nacme\n\n\
             ## Comments Disabled\nTRUE\n\n\
             ## Hide Like Count\nyes\n",
        );

        assert_eq!(config.caption, "Line one\nLine two");
        assert_eq!(config.alt_text, "Two cats");
        assert_eq!(config.location, "12345");
        assert_eq!(config.user_tags, vec!["alice", "bob_2"]);
        assert_eq!(config.product_tags, vec!["111", "222", "333"]);
        assert_eq!(config.branded_content_partner, "acme");
        assert!(config.disable_comments);
        assert!(!config.hide_like_count);
        assert_eq!(config.full_caption(), "Line one\nLine two");
    }

    #[test]
    fn test_legacy_booleans_only_true_is_true() {
        for (value, expected) in [
            ("true", true),
            ("True", true),
            ("false", false),
            ("1", false),
            ("yes", false),
            ("", false),
        ] {
            let config = PostConfig::parse_legacy(&format!("## Comments Disabled\n{}\n", value));
            assert_eq!(config.disable_comments, expected, "value {:?}", value);
        }
    }

    #[test]
    fn test_legacy_crlf_input() {
        let config = PostConfig::parse_legacy("## Caption\r\nWindows caption\r\n## Hashtags\r\n#crlf\r\n");
        assert_eq!(config.caption, "Windows caption");
        assert_eq!(config.hashtags, "#crlf");
    }

    #[test]
    fn test_normalize_helpers() {
        assert_eq!(normalize_hashtags(&["a", "#b"]), "#a #b");
        assert_eq!(normalize_hashtags::<&str>(&[]), "");
        assert_eq!(normalize_user_tags(&["@x", "y", "@"]), vec!["x", "y"]);
    }
}
