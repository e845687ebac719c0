use serde::{Deserialize, Deserializer};

/// One reference as returned by the library API. Fetched fresh on every
/// poll, never cached across runs.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SourceItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "authorsText")]
    pub authors_text: String,
    #[serde(default, rename = "journalName")]
    pub journal_name: String,
    #[serde(default, rename = "publishedYear")]
    pub published_year: Option<i32>,
    #[serde(default, rename = "fullTextLink")]
    pub full_text_link: String,
    #[serde(default, rename = "f1000AddedBy")]
    pub added_by: String,
    #[serde(default, rename = "f1000Tags")]
    pub tags: Vec<String>,
    #[serde(default, rename = "f1000AddedDate")]
    pub added_at: i64,
}

/// A note attached to a reference. Highlight-only notes carry
/// `highlight_text` and are not eligible for delivery.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ItemNote {
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default, rename = "highlightText")]
    pub highlight_text: Option<String>,
}

impl ItemNote {
    /// Comment-type notes only; highlights and empty comments are skipped.
    pub fn is_eligible(&self) -> bool {
        self.highlight_text.is_none()
            && self
                .comment
                .as_deref()
                .is_some_and(|c| !c.trim().is_empty())
    }
}

/// The most recently created comment-type note, if any.
pub fn latest_comment(notes: &[ItemNote]) -> Option<&ItemNote> {
    notes
        .iter()
        .filter(|n| n.is_eligible())
        .max_by_key(|n| n.created)
}

/// A resolvable chat identity, loaded fresh per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recipient {
    pub display_name: String,
    pub id: String,
}

/// The API is loose about id types; accept both `"123"` and `123`.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
    }
    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Num(n) => n.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn item_decodes_api_field_names() {
        let item: SourceItem = serde_json::from_value(json!({
            "id": 987654,
            "title": "Benchmarking antibody repertoires",
            "authorsText": "Kovaltsuk A, Leem J",
            "journalName": "J Immunol",
            "publishedYear": 2018,
            "fullTextLink": "https://example.org/paper",
            "f1000AddedBy": "agabor",
            "f1000Tags": ["repertoire", "benchmark"],
            "f1000AddedDate": 1700000000123i64,
        }))
        .unwrap();
        assert_eq!(item.id, "987654");
        assert_eq!(item.added_at, 1_700_000_000_123);
        assert_eq!(item.tags, vec!["repertoire", "benchmark"]);
        assert_eq!(item.published_year, Some(2018));
    }

    #[test]
    fn item_tolerates_missing_fields() {
        let item: SourceItem = serde_json::from_value(json!({ "id": "abc" })).unwrap();
        assert_eq!(item.id, "abc");
        assert_eq!(item.title, "");
        assert_eq!(item.added_at, 0);
        assert!(item.tags.is_empty());
        assert_eq!(item.published_year, None);
    }

    #[test]
    fn highlight_notes_are_not_eligible() {
        let note: ItemNote = serde_json::from_value(json!({
            "comment": "see figure 2",
            "user": "ana",
            "created": 5,
            "highlightText": "quoted passage",
        }))
        .unwrap();
        assert!(!note.is_eligible());
    }

    #[test]
    fn latest_comment_picks_newest_eligible() {
        let notes = vec![
            ItemNote {
                comment: Some("older".into()),
                user: "a".into(),
                created: 10,
                highlight_text: None,
            },
            ItemNote {
                comment: None,
                user: "b".into(),
                created: 99,
                highlight_text: Some("just a highlight".into()),
            },
            ItemNote {
                comment: Some("newest comment".into()),
                user: "c".into(),
                created: 42,
                highlight_text: None,
            },
            ItemNote {
                comment: Some("   ".into()),
                user: "d".into(),
                created: 77,
                highlight_text: None,
            },
        ];
        let picked = latest_comment(&notes).unwrap();
        assert_eq!(picked.comment.as_deref(), Some("newest comment"));
    }

    #[test]
    fn latest_comment_none_when_only_highlights() {
        let notes = vec![ItemNote {
            comment: None,
            user: "a".into(),
            created: 1,
            highlight_text: Some("hl".into()),
        }];
        assert!(latest_comment(&notes).is_none());
    }
}
