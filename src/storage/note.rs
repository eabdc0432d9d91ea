use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub uuid: String,
    pub title: String,
    pub text: String,
    #[serde(default)]
    pub favorite: bool,
    pub creation_date: DateTime<Utc>,
    pub last_changed: DateTime<Utc>,
}

impl Note {
    /// Create an empty note stamped with the given time
    pub fn new(uuid: impl Into<String>, now: DateTime<Utc>) -> Self {
        Note {
            uuid: uuid.into(),
            title: String::new(),
            text: String::new(),
            favorite: false,
            creation_date: now,
            last_changed: now,
        }
    }

    /// Title for list views; blank titles show as `<untitled>`
    pub fn display_title(&self) -> &str {
        display_title(&self.title)
    }

    /// Merge a patch into this note. Returns true if any field changed.
    pub fn apply(&mut self, patch: &NotePatch) -> bool {
        let mut changed = false;
        if let Some(title) = &patch.title {
            if *title != self.title {
                self.title = title.clone();
                changed = true;
            }
        }
        if let Some(text) = &patch.text {
            if *text != self.text {
                self.text = text.clone();
                changed = true;
            }
        }
        if let Some(favorite) = patch.favorite {
            if favorite != self.favorite {
                self.favorite = favorite;
                changed = true;
            }
        }
        changed
    }
}

/// List projection of a note, without its text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteMeta {
    pub uuid: String,
    pub title: String,
    #[serde(default)]
    pub favorite: bool,
    pub creation_date: DateTime<Utc>,
    pub last_changed: DateTime<Utc>,
}

impl NoteMeta {
    pub fn display_title(&self) -> &str {
        display_title(&self.title)
    }
}

impl From<&Note> for NoteMeta {
    fn from(note: &Note) -> Self {
        NoteMeta {
            uuid: note.uuid.clone(),
            title: note.title.clone(),
            favorite: note.favorite,
            creation_date: note.creation_date,
            last_changed: note.last_changed,
        }
    }
}

fn display_title(title: &str) -> &str {
    let trimmed = title.trim();
    if trimmed.is_empty() { "<untitled>" } else { trimmed }
}

/// Partial update of the mutable note fields.
///
/// `Some` overwrites the field, `None` leaves it alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotePatch {
    pub title: Option<String>,
    pub text: Option<String>,
    pub favorite: Option<bool>,
}

impl NotePatch {
    pub fn title(title: impl Into<String>) -> Self {
        NotePatch { title: Some(title.into()), ..Default::default() }
    }

    pub fn text(text: impl Into<String>) -> Self {
        NotePatch { text: Some(text.into()), ..Default::default() }
    }

    pub fn favorite(favorite: bool) -> Self {
        NotePatch { favorite: Some(favorite), ..Default::default() }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.text.is_none() && self.favorite.is_none()
    }
}

impl From<&ContentUpdate> for NotePatch {
    fn from(update: &ContentUpdate) -> Self {
        NotePatch {
            title: update.title.clone(),
            text: update.text.clone(),
            favorite: None,
        }
    }
}

/// Payload of an `updateNote` request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContentUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ContentUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.text.is_none()
    }
}
