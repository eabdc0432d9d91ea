use std::cmp::Ordering;

use crate::storage::note::NoteMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Title,
    Created,
    Modified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListSort {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for ListSort {
    fn default() -> Self {
        ListSort {
            field: SortField::Title,
            direction: SortDirection::Asc,
        }
    }
}

impl ListSort {
    /// Clicking the current column flips the direction; another column starts ascending
    pub fn toggle(&mut self, field: SortField) {
        if field == self.field {
            self.direction = match self.direction {
                SortDirection::Asc => SortDirection::Desc,
                SortDirection::Desc => SortDirection::Asc,
            };
        } else {
            self.field = field;
            self.direction = SortDirection::Asc;
        }
    }

    pub fn sort(&self, notes: &mut [NoteMeta]) {
        notes.sort_by(|a, b| {
            let ord = match self.field {
                SortField::Title => compare_titles(&a.title, &b.title),
                SortField::Created => a.creation_date.cmp(&b.creation_date),
                SortField::Modified => a.last_changed.cmp(&b.last_changed),
            };
            match self.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
    }
}

/// Case-insensitive title order with the raw string as tie break
pub fn compare_titles(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Favorite notes, alphabetical by title
pub fn favorites(notes: impl IntoIterator<Item = NoteMeta>) -> Vec<NoteMeta> {
    let mut favs: Vec<NoteMeta> = notes.into_iter().filter(|n| n.favorite).collect();
    favs.sort_by(|a, b| compare_titles(&a.title, &b.title));
    favs
}

/// Non-favorite notes, most recently changed first
pub fn latest(notes: impl IntoIterator<Item = NoteMeta>, limit: usize) -> Vec<NoteMeta> {
    let mut rest: Vec<NoteMeta> = notes.into_iter().filter(|n| !n.favorite).collect();
    rest.sort_by(|a, b| b.last_changed.cmp(&a.last_changed));
    rest.truncate(limit);
    rest
}
