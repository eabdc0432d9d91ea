use async_trait::async_trait;
use reqwest::header::COOKIE;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{SyncError, SyncResult};
use crate::storage::note::{ContentUpdate, Note, NoteMeta};
use crate::storage::remote::NoteStore;

pub const SESSION_COOKIE: &str = "HejSessionKey";

const NOTE_FIELDS: &str = "uuid title text favorite creationDate lastChanged";
const NOTE_META_FIELDS: &str = "uuid title favorite creationDate lastChanged";

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Deserialize)]
struct ErrorEntry {
    message: String,
}

#[derive(Deserialize)]
struct NotesData<T> {
    notes: Vec<T>,
}

#[derive(Deserialize)]
struct NoteData {
    note: Option<Note>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeleteData {
    delete_note: bool,
}

/// Note store reached over the GraphQL endpoint.
pub struct GraphQlStore {
    endpoint: String,
    session_key: Option<String>,
    http: Client,
}

impl GraphQlStore {
    pub fn new(endpoint: &str, session_key: Option<String>) -> SyncResult<Self> {
        let http = Client::builder()
            .build()
            .map_err(|e| SyncError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(GraphQlStore {
            endpoint: endpoint.to_string(),
            session_key: session_key.filter(|k| !k.is_empty()),
            http,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Whether a session key is available to authenticate requests
    pub fn is_logged_in(&self) -> bool {
        self.session_key.is_some()
    }

    async fn request<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
    ) -> SyncResult<T> {
        let mut req = self
            .http
            .post(&self.endpoint)
            .json(&json!({ "query": query, "variables": variables }));
        if let Some(key) = &self.session_key {
            req = req.header(COOKIE, format!("{}={}", SESSION_COOKIE, key));
        }

        let resp = req.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        tracing::trace!(%status, bytes = body.len(), "graphql response");
        decode(status, &body)
    }
}

/// Turn an HTTP status and body into the `data` payload or a `SyncError`
fn decode<T: DeserializeOwned>(status: StatusCode, body: &str) -> SyncResult<T> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SyncError::Unauthorized);
    }

    let envelope: Envelope<T> = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(_) if !status.is_success() => {
            return Err(SyncError::Server(format!("HTTP {}", status)));
        }
        Err(e) => return Err(e.into()),
    };

    if !envelope.errors.is_empty() {
        let messages: Vec<String> = envelope.errors.into_iter().map(|e| e.message).collect();
        return Err(SyncError::Server(messages.join("; ")));
    }
    if !status.is_success() {
        return Err(SyncError::Server(format!("HTTP {}", status)));
    }
    envelope
        .data
        .ok_or_else(|| SyncError::Decode("response has no data".to_string()))
}

#[async_trait]
impl NoteStore for GraphQlStore {
    async fn create_note(&self) -> SyncResult<Note> {
        let query = format!(
            "mutation createNote($title: String!, $text: String!) {{ note: createNote(title: $title, text: $text) {{ {} }} }}",
            NOTE_FIELDS
        );
        let data: NoteData = self.request(&query, json!({ "title": "", "text": "" })).await?;
        data.note
            .ok_or_else(|| SyncError::Server("createNote returned null".to_string()))
    }

    async fn update_note(&self, uuid: &str, update: &ContentUpdate) -> SyncResult<Note> {
        let query = format!(
            "mutation updateNote($uuid: ID!, $title: String, $text: String) {{ note: updateNote(uuid: $uuid, title: $title, text: $text) {{ {} }} }}",
            NOTE_FIELDS
        );
        let vars = json!({ "uuid": uuid, "title": update.title, "text": update.text });
        let data: NoteData = self.request(&query, vars).await?;
        data.note.ok_or_else(|| SyncError::NotFound(uuid.to_string()))
    }

    async fn delete_note(&self, uuid: &str) -> SyncResult<bool> {
        let query = "mutation deleteNote($uuid: ID!) { deleteNote(uuid: $uuid) }";
        let data: DeleteData = self.request(query, json!({ "uuid": uuid })).await?;
        Ok(data.delete_note)
    }

    async fn list_notes(&self) -> SyncResult<Vec<Note>> {
        let query = format!("query allNotes {{ notes {{ {} }} }}", NOTE_FIELDS);
        let data: NotesData<Note> = self.request(&query, json!({})).await?;
        Ok(data.notes)
    }

    async fn list_notes_meta(&self) -> SyncResult<Vec<NoteMeta>> {
        let query = format!("query allNotesMeta {{ notes {{ {} }} }}", NOTE_META_FIELDS);
        let data: NotesData<NoteMeta> = self.request(&query, json!({})).await?;
        Ok(data.notes)
    }

    async fn mark_favorite(&self, uuid: &str, favorite: bool) -> SyncResult<Note> {
        let query = format!(
            "mutation markFavorite($uuid: ID!, $favorite: Boolean!) {{ note: markFavorite(uuid: $uuid, favorite: $favorite) {{ {} }} }}",
            NOTE_FIELDS
        );
        let vars = json!({ "uuid": uuid, "favorite": favorite });
        let data: NoteData = self.request(&query, vars).await?;
        data.note.ok_or_else(|| SyncError::NotFound(uuid.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTE_JSON: &str = r#"{
        "uuid": "u1", "title": "Hello", "text": "world", "favorite": true,
        "creationDate": "2024-01-01T00:00:00Z", "lastChanged": "2024-01-02T00:00:00Z"
    }"#;

    #[test]
    fn decodes_note_payload() {
        let body = format!(r#"{{ "data": {{ "note": {} }} }}"#, NOTE_JSON);
        let data: NoteData = decode(StatusCode::OK, &body).unwrap();
        let note = data.note.unwrap();
        assert_eq!(note.title, "Hello");
        assert!(note.favorite);
    }

    #[test]
    fn null_note_decodes_as_none() {
        let data: NoteData = decode(StatusCode::OK, r#"{ "data": { "note": null } }"#).unwrap();
        assert!(data.note.is_none());
    }

    #[test]
    fn graphql_errors_become_server_errors() {
        let body = r#"{ "data": null, "errors": [{ "message": "boom" }, { "message": "bang" }] }"#;
        let err = decode::<NoteData>(StatusCode::OK, body).err().unwrap();
        assert_eq!(err, SyncError::Server("boom; bang".to_string()));
    }

    #[test]
    fn auth_statuses_map_to_unauthorized() {
        let err = decode::<DeleteData>(StatusCode::UNAUTHORIZED, "").err().unwrap();
        assert_eq!(err, SyncError::Unauthorized);
        let err = decode::<DeleteData>(StatusCode::FORBIDDEN, "{}").err().unwrap();
        assert_eq!(err, SyncError::Unauthorized);
    }

    #[test]
    fn non_json_error_page_is_a_server_error() {
        let err = decode::<DeleteData>(StatusCode::BAD_GATEWAY, "<html>").err().unwrap();
        assert_eq!(err, SyncError::Server("HTTP 502 Bad Gateway".to_string()));
    }

    #[test]
    fn delete_payload_uses_field_name() {
        let data: DeleteData =
            decode(StatusCode::OK, r#"{ "data": { "deleteNote": false } }"#).unwrap();
        assert!(!data.delete_note);
    }

    #[test]
    fn empty_session_key_is_not_logged_in() {
        let store = GraphQlStore::new("http://localhost/graphql/", Some(String::new())).unwrap();
        assert!(!store.is_logged_in());
        let store = GraphQlStore::new("http://localhost/graphql/", Some("k".into())).unwrap();
        assert!(store.is_logged_in());
    }
}
