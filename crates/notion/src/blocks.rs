//! Typed request bodies for Notion blocks, rich text and page properties.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Notion rejects a single text object longer than this.
pub const RICH_TEXT_MAX_CHARS: usize = 2000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Color {
    #[default]
    Default,
    Gray,
    Blue,
}

impl Color {
    fn is_default(&self) -> bool {
        matches!(self, Self::Default)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub bold: bool,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub italic: bool,
    #[serde(default, skip_serializing_if = "Color::is_default")]
    pub color: Color,
}

impl Annotations {
    fn is_plain(&self) -> bool {
        !self.bold && !self.italic && self.color.is_default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextContent {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RichText {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: TextContent,
    #[serde(default, skip_serializing_if = "Annotations::is_plain")]
    pub annotations: Annotations,
}

impl RichText {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            kind: "text".to_string(),
            text: TextContent { content: content.into(), link: None },
            annotations: Annotations::default(),
        }
    }

    /// Splits long text into as many text objects as the API limit requires.
    pub fn chunked(content: &str) -> Vec<Self> {
        if content.is_empty() {
            return Vec::new();
        }
        let chars: Vec<char> = content.chars().collect();
        chars.chunks(RICH_TEXT_MAX_CHARS).map(|chunk| Self::plain(chunk.iter().collect::<String>())).collect()
    }

    /// A single text object cut to the API limit.
    pub fn truncated(content: &str) -> Self {
        Self::plain(content.chars().take(RICH_TEXT_MAX_CHARS).collect::<String>())
    }

    pub fn bold(mut self) -> Self {
        self.annotations.bold = true;
        self
    }

    pub fn italic(mut self) -> Self {
        self.annotations.italic = true;
        self
    }

    pub fn color(mut self, color: Color) -> Self {
        self.annotations.color = color;
        self
    }

    pub fn link(mut self, url: impl Into<String>) -> Self {
        self.text.link = Some(Link { url: url.into() });
        self
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TextBody {
    pub rich_text: Vec<RichText>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<Block>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ToDoBody {
    pub rich_text: Vec<RichText>,
    pub checked: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct EmptyBody {}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    #[serde(rename = "heading_1")]
    Heading1 { heading_1: TextBody },
    Paragraph { paragraph: TextBody },
    Quote { quote: TextBody },
    Divider { divider: EmptyBody },
    ToDo { to_do: ToDoBody },
    BulletedListItem { bulleted_list_item: TextBody },
    Toggle { toggle: TextBody },
}

impl Block {
    pub fn heading(text: impl Into<String>) -> Self {
        Self::Heading1 { heading_1: TextBody { rich_text: vec![RichText::plain(text)], children: None } }
    }

    pub fn paragraph(rich_text: Vec<RichText>) -> Self {
        Self::Paragraph { paragraph: TextBody { rich_text, children: None } }
    }

    pub fn quote(rich_text: Vec<RichText>) -> Self {
        Self::Quote { quote: TextBody { rich_text, children: None } }
    }

    pub fn divider() -> Self {
        Self::Divider { divider: EmptyBody {} }
    }

    pub fn to_do(text: impl Into<String>) -> Self {
        Self::ToDo { to_do: ToDoBody { rich_text: vec![RichText::plain(text)], checked: false } }
    }

    pub fn bullet(rich_text: Vec<RichText>) -> Self {
        Self::BulletedListItem { bulleted_list_item: TextBody { rich_text, children: None } }
    }

    pub fn toggle(rich_text: Vec<RichText>, children: Vec<Block>) -> Self {
        Self::Toggle { toggle: TextBody { rich_text, children: Some(children) } }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Heading1 { .. } => "heading_1",
            Self::Paragraph { .. } => "paragraph",
            Self::Quote { .. } => "quote",
            Self::Divider { .. } => "divider",
            Self::ToDo { .. } => "to_do",
            Self::BulletedListItem { .. } => "bulleted_list_item",
            Self::Toggle { .. } => "toggle",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NamedOption {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DateValue {
    pub start: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObjectRef {
    pub id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyValue {
    Title(Vec<RichText>),
    RichText(Vec<RichText>),
    Select(NamedOption),
    Status(NamedOption),
    Date(DateValue),
    People(Vec<ObjectRef>),
    Relation(Vec<ObjectRef>),
    Url(String),
}

impl PropertyValue {
    pub fn title(text: &str) -> Self {
        Self::Title(vec![RichText::truncated(text)])
    }

    pub fn text(text: &str) -> Self {
        Self::RichText(vec![RichText::truncated(text)])
    }

    pub fn select(name: impl Into<String>) -> Self {
        Self::Select(NamedOption { name: name.into() })
    }

    pub fn status(name: impl Into<String>) -> Self {
        Self::Status(NamedOption { name: name.into() })
    }

    pub fn date(start: impl Into<String>) -> Self {
        Self::Date(DateValue { start: start.into() })
    }

    pub fn people<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::People(ids.into_iter().map(|id| ObjectRef { id: id.into() }).collect())
    }

    pub fn relation<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Relation(ids.into_iter().map(|id| ObjectRef { id: id.into() }).collect())
    }
}

pub type PropertyMap = BTreeMap<String, PropertyValue>;

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{Block, Color, PropertyValue, RichText, RICH_TEXT_MAX_CHARS};

    #[test]
    fn plain_rich_text_omits_annotations() {
        let value = serde_json::to_value(RichText::plain("hello")).expect("serializes");
        assert_eq!(value, json!({"type": "text", "text": {"content": "hello"}}));
    }

    #[test]
    fn annotated_link_serializes_in_api_shape() {
        let value = serde_json::to_value(
            RichText::plain("View in Slack").link("https://example.slack.com").color(Color::Blue),
        )
        .expect("serializes");

        assert_eq!(
            value,
            json!({
                "type": "text",
                "text": {"content": "View in Slack", "link": {"url": "https://example.slack.com"}},
                "annotations": {"color": "blue"}
            })
        );
    }

    #[test]
    fn blocks_are_tagged_with_their_api_type() {
        let heading = serde_json::to_value(Block::heading("🧠 What Happened")).expect("serializes");
        assert_eq!(heading["type"], "heading_1");
        assert_eq!(heading["heading_1"]["rich_text"][0]["text"]["content"], "🧠 What Happened");

        let todo = serde_json::to_value(Block::to_do("Assign an Owner")).expect("serializes");
        assert_eq!(todo["type"], "to_do");
        assert_eq!(todo["to_do"]["checked"], false);

        let divider = serde_json::to_value(Block::divider()).expect("serializes");
        assert_eq!(divider, json!({"type": "divider", "divider": {}}));

        let bullet = serde_json::to_value(Block::bullet(vec![RichText::plain("x")])).expect("serializes");
        assert_eq!(bullet["type"], "bulleted_list_item");
        assert!(bullet["bulleted_list_item"].get("children").is_none());
    }

    #[test]
    fn long_text_is_chunked_at_the_api_limit() {
        let text = "a".repeat(RICH_TEXT_MAX_CHARS * 2 + 5);
        let chunks = RichText::chunked(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].text.content.len(), 5);
        assert!(RichText::chunked("").is_empty());
        assert_eq!(RichText::truncated(&text).text.content.len(), RICH_TEXT_MAX_CHARS);
    }

    #[test]
    fn property_values_use_externally_tagged_shape() {
        assert_eq!(
            serde_json::to_value(PropertyValue::select("High")).expect("serializes"),
            json!({"select": {"name": "High"}})
        );
        assert_eq!(
            serde_json::to_value(PropertyValue::people(["user-1"])).expect("serializes"),
            json!({"people": [{"id": "user-1"}]})
        );
        assert_eq!(
            serde_json::to_value(PropertyValue::Url("https://x".to_string())).expect("serializes"),
            json!({"url": "https://x"})
        );
        assert_eq!(
            serde_json::to_value(PropertyValue::date("2024-01-02")).expect("serializes"),
            json!({"date": {"start": "2024-01-02"}})
        );
    }
}
