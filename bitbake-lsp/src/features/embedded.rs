//! Wire types for embedded shell and python documents.
//!
//! A client-side router keeps the synthetic documents open with the shell
//! and python backends from `bitbake/embeddedDocumentsChanged`, and asks
//! `bitbake/getEmbeddedLanguageDocInfos` which of them owns a host position
//! before forwarding a request with the mapped position.

use bitbake_analysis::embedded::{EmbeddedDocumentChanges, EmbeddedDocumentInfo};
use serde::{Deserialize, Serialize};
use tower_lsp::lsp_types::notification::Notification;
use tower_lsp::lsp_types::{Position, Url};

pub const GET_EMBEDDED_LANGUAGE_DOC_INFOS: &str = "bitbake/getEmbeddedLanguageDocInfos";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedLanguageDocInfoParams {
    /// Host document.
    pub uri: Url,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedLanguageDocInfoResponse {
    /// Synthetic document owning the position.
    pub uri: Url,
    /// `shell` or `python`.
    pub language_type: String,
    /// LSP language id to open the synthetic document with.
    pub language_id: String,
    /// Version of the synthetic document the position refers to.
    pub version: i32,
    /// The host position in the synthetic document's coordinates.
    pub position: Position,
}

impl EmbeddedLanguageDocInfoResponse {
    pub fn new(document: &EmbeddedDocumentInfo, position: Position) -> Self {
        Self {
            uri: document.uri.clone(),
            language_type: document.language.as_str().to_string(),
            language_id: document.language.language_id().to_string(),
            version: document.version,
            position,
        }
    }
}

/// Sent whenever a host's synthetic documents are opened, change text or go
/// away.
pub enum EmbeddedDocumentsChanged {}

impl Notification for EmbeddedDocumentsChanged {
    type Params = EmbeddedDocumentsChangedParams;
    const METHOD: &'static str = "bitbake/embeddedDocumentsChanged";
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedDocumentItem {
    pub uri: Url,
    pub language_type: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

impl From<&EmbeddedDocumentInfo> for EmbeddedDocumentItem {
    fn from(document: &EmbeddedDocumentInfo) -> Self {
        Self {
            uri: document.uri.clone(),
            language_type: document.language.as_str().to_string(),
            language_id: document.language.language_id().to_string(),
            version: document.version,
            text: document.text.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddedDocumentsChangedParams {
    pub host_uri: Url,
    /// Documents to send `didOpen` for.
    pub opened: Vec<EmbeddedDocumentItem>,
    /// Documents whose full text replaced the previous version.
    pub changed: Vec<EmbeddedDocumentItem>,
    /// Documents to send `didClose` for.
    pub closed: Vec<Url>,
}

impl EmbeddedDocumentsChangedParams {
    pub fn new(host_uri: Url, changes: &EmbeddedDocumentChanges) -> Self {
        Self {
            host_uri,
            opened: changes.opened.iter().map(|doc| doc.as_ref().into()).collect(),
            changed: changes.changed.iter().map(|doc| doc.as_ref().into()).collect(),
            closed: changes.closed.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitbake_analysis::embedded::EmbeddedDocuments;
    use serde_json::json;

    fn host() -> Url {
        Url::parse("file:///recipes/hello.bb").unwrap()
    }

    #[test]
    fn params_use_camel_case() {
        let params: EmbeddedLanguageDocInfoParams = serde_json::from_value(json!({
            "uri": "file:///recipes/hello.bb",
            "position": { "line": 3, "character": 7 },
        }))
        .unwrap();
        assert_eq!(params.uri, host());
        assert_eq!(params.position, Position::new(3, 7));
    }

    #[test]
    fn response_names_language_version_and_mapped_position() {
        let documents = EmbeddedDocuments::new();
        let changes = documents
            .generate_embedded_language_docs(&host(), "python do_hi() {\n    print(1)\n}\n")
            .unwrap();
        let response = EmbeddedLanguageDocInfoResponse::new(&changes.opened[0], Position::new(0, 2));
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({
                "uri": "bitbake-embedded://python/file//recipes/hello.bb.0.py",
                "languageType": "python",
                "languageId": "python",
                "version": 1,
                "position": { "line": 0, "character": 2 },
            })
        );
    }

    #[test]
    fn change_notification_carries_text_for_the_router() {
        let documents = EmbeddedDocuments::new();
        let changes = documents
            .generate_embedded_language_docs(&host(), "do_a() {\n    make\n}\n")
            .unwrap();
        let value = serde_json::to_value(EmbeddedDocumentsChangedParams::new(host(), &changes)).unwrap();
        assert_eq!(value["hostUri"], "file:///recipes/hello.bb");
        assert_eq!(value["opened"][0]["languageId"], "shellscript");
        assert_eq!(value["opened"][0]["text"], "make");
        assert_eq!(value["opened"][0]["version"], 1);
        assert_eq!(value["closed"], json!([]));
    }
}
