//! Highlight records on both sides, and the pieces they share.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Device color codes, indexed by code.
const COLORS: [&str; 4] = ["yellow", "purple", "blue", "green"];

/// Map a desktop color name to the device color code. Unknown names are yellow.
pub fn calibre_color_to_kobo_color(color: &str) -> i64 {
    COLORS
        .iter()
        .position(|c| c.eq_ignore_ascii_case(color.trim()))
        .map_or(0, |i| i as i64)
}

/// Map a device color code to the desktop color name. Unknown codes are yellow.
pub fn kobo_color_to_calibre_color(color: i64) -> &'static str {
    usize::try_from(color)
        .ok()
        .and_then(|i| COLORS.get(i))
        .copied()
        .unwrap_or(COLORS[0])
}

/// Deterministic identifier of a highlight.
///
/// UUID v3 in the DNS namespace over `"{start}*{end}*{text})"`. The closing
/// parenthesis is part of the historical key format; dropping it would make
/// every previously imported highlight look new.
pub fn stable_id(start: &str, end: &str, text: &str) -> Uuid {
    let key = format!("{start}*{end}*{text})");
    Uuid::new_v3(&Uuid::NAMESPACE_DNS, key.as_bytes())
}

/// Book-relative content path from a device ContentID.
///
/// `file:///mnt/onboard/b.kepub.epub!OEBPS!ch1.xhtml#p3` becomes
/// `OEBPS/ch1.xhtml`. Returns `None` when nothing is left.
pub fn content_path_from_id(content_id: &str) -> Option<String> {
    let tail = content_id
        .rsplit_once("epub!")
        .map_or(content_id, |(_, tail)| tail);
    let path = tail.trim_start_matches('!').replace('!', "/");
    let path = match path.split_once('#') {
        Some((before, _)) => before.to_string(),
        None => path,
    };
    (!path.is_empty()).then_some(path)
}

/// Device ContentID for a content file of a volume.
pub fn content_id(volume_id: &str, content_path: &str) -> String {
    format!("{volume_id}!{}", content_path.replace('/', "!"))
}

/// A highlight read from the device store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KoboHighlight {
    pub start_path: String,
    pub end_path: String,
    pub start_offset: usize,
    pub end_offset: usize,
    pub text: String,
    /// Book-relative path of the content file.
    pub content_path: String,
    pub color: Option<i64>,
}

/// A highlight read from the desktop store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalibreHighlight {
    pub start_cfi: String,
    pub end_cfi: String,
    pub spine_name: String,
    pub highlighted_text: String,
    pub color: String,
}

/// Visual style of a desktop highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightStyle {
    pub kind: String,
    #[serde(rename = "type")]
    pub style_type: String,
    pub which: String,
}

impl HighlightStyle {
    pub fn builtin(color: &str) -> Self {
        Self {
            kind: "color".into(),
            style_type: "builtin".into(),
            which: color.into(),
        }
    }
}

/// The `annot_data` payload of a desktop highlight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotData {
    pub start_cfi: String,
    pub end_cfi: String,
    pub highlighted_text: String,
    pub spine_index: usize,
    pub spine_name: String,
    pub style: HighlightStyle,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub annot_type: String,
    pub uuid: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub removed: bool,
}

/// A desktop annotation row ready for insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibreAnnotation {
    pub book: i64,
    pub format: String,
    pub user_type: String,
    pub user: String,
    /// Seconds since the epoch.
    pub timestamp: i64,
    pub annot_id: String,
    pub annot_type: String,
    pub annot_data: serde_json::Value,
    pub searchable_text: String,
}

/// Location of a translated highlight inside the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpineRef {
    pub index: usize,
    pub name: String,
}

impl CalibreAnnotation {
    /// Build the desktop row for a translated highlight.
    pub fn highlight(
        book: i64,
        start_cfi: String,
        end_cfi: String,
        text: &str,
        spine: SpineRef,
        color: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let id = stable_id(&start_cfi, &end_cfi, text).simple().to_string();
        let data = AnnotData {
            start_cfi,
            end_cfi,
            highlighted_text: text.to_string(),
            spine_index: spine.index,
            spine_name: spine.name,
            style: HighlightStyle::builtin(color),
            timestamp: now.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
            annot_type: "highlight".into(),
            uuid: id.clone(),
            removed: false,
        };

        Ok(Self {
            book,
            format: "EPUB".into(),
            user_type: "local".into(),
            user: "viewer".into(),
            timestamp: now.timestamp(),
            annot_id: id,
            annot_type: "highlight".into(),
            annot_data: serde_json::to_value(&data)?,
            searchable_text: text.to_string(),
        })
    }

    /// Typed view of the payload, if it is a well-formed highlight.
    pub fn data(&self) -> Option<AnnotData> {
        serde_json::from_value(self.annot_data.clone()).ok()
    }

    /// Source view of this row, if it is a live local highlight.
    pub fn to_highlight(&self) -> Option<CalibreHighlight> {
        if self.user_type != "local" {
            return None;
        }
        let data = &self.annot_data;
        if data.get("removed").and_then(|v| v.as_bool()).unwrap_or(false) {
            return None;
        }
        if data.get("type").and_then(|v| v.as_str()) != Some("highlight") {
            return None;
        }
        let field = |name: &str| data.get(name).and_then(|v| v.as_str()).map(str::to_string);

        Some(CalibreHighlight {
            start_cfi: field("start_cfi")?,
            end_cfi: field("end_cfi")?,
            spine_name: field("spine_name")?,
            highlighted_text: field("highlighted_text").unwrap_or_default(),
            color: data
                .pointer("/style/which")
                .and_then(|v| v.as_str())
                .unwrap_or("yellow")
                .to_string(),
        })
    }
}

/// A device Bookmark row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KoboBookmark {
    #[serde(rename = "BookmarkID")]
    pub bookmark_id: String,
    #[serde(rename = "VolumeID")]
    pub volume_id: String,
    #[serde(rename = "ContentID")]
    pub content_id: String,
    #[serde(rename = "StartContainerPath")]
    pub start_path: String,
    #[serde(rename = "StartContainerChildIndex", default = "unset_child_index")]
    pub start_child_index: i64,
    #[serde(rename = "StartOffset")]
    pub start_offset: usize,
    #[serde(rename = "EndContainerPath")]
    pub end_path: String,
    #[serde(rename = "EndContainerChildIndex", default = "unset_child_index")]
    pub end_child_index: i64,
    #[serde(rename = "EndOffset")]
    pub end_offset: usize,
    #[serde(rename = "Text", default)]
    pub text: Option<String>,
    #[serde(rename = "Color", default)]
    pub color: Option<i64>,
    #[serde(rename = "Hidden", default = "not_hidden")]
    pub hidden: String,
    #[serde(rename = "DateCreated", default)]
    pub date_created: String,
    #[serde(rename = "DateModified", default)]
    pub date_modified: String,
    #[serde(rename = "Type", default = "highlight_type")]
    pub bookmark_type: String,
}

fn unset_child_index() -> i64 {
    -99
}

fn not_hidden() -> String {
    "false".into()
}

fn highlight_type() -> String {
    "highlight".into()
}

/// Device-side addresses of a translated highlight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRange {
    pub start_path: String,
    pub start_offset: usize,
    pub end_path: String,
    pub end_offset: usize,
}

impl KoboBookmark {
    /// Build the device row for a translated highlight.
    ///
    /// `id_source` is the pair of CFIs the highlight was translated from, so
    /// a highlight keeps the same identifier in both stores.
    pub fn highlight(
        volume_id: &str,
        content_path: &str,
        range: DeviceRange,
        text: &str,
        id_source: (&str, &str),
        color: i64,
        now: DateTime<Utc>,
    ) -> Self {
        let stamp = now.format("%Y-%m-%dT%H:%M:%S%.3f").to_string();
        Self {
            bookmark_id: stable_id(id_source.0, id_source.1, text).hyphenated().to_string(),
            volume_id: volume_id.to_string(),
            content_id: content_id(volume_id, content_path),
            start_path: range.start_path,
            start_child_index: unset_child_index(),
            start_offset: range.start_offset,
            end_path: range.end_path,
            end_child_index: unset_child_index(),
            end_offset: range.end_offset,
            text: Some(text.to_string()),
            color: Some(color),
            hidden: not_hidden(),
            date_created: stamp.clone(),
            date_modified: stamp,
            bookmark_type: highlight_type(),
        }
    }

    /// Source view of this row. Rows without text or content path are not
    /// highlights.
    pub fn to_highlight(&self) -> Option<KoboHighlight> {
        let text = self.text.as_deref().filter(|t| !t.is_empty())?;
        Some(KoboHighlight {
            start_path: self.start_path.clone(),
            end_path: self.end_path.clone(),
            start_offset: self.start_offset,
            end_offset: self.end_offset,
            text: text.to_string(),
            content_path: content_path_from_id(&self.content_id)?,
            color: self.color,
        })
    }
}
