pub mod cache;
pub mod graphql;
pub mod memory;
pub mod note;
pub mod remote;

pub use cache::{NoteCache, Scope};
pub use graphql::GraphQlStore;
pub use memory::MemoryStore;
pub use note::{ContentUpdate, Note, NoteMeta, NotePatch};
pub use remote::NoteStore;
