pub mod debounce;
pub mod editor;
pub mod listing;
pub mod note_service;

pub use debounce::Debounced;
pub use editor::{Draft, EditState, NoteEditor};
pub use listing::{ListSort, SortDirection, SortField};
pub use note_service::NoteService;
