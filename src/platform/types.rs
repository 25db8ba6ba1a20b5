use serde::{Deserialize, Deserializer, Serialize};

/// Response from the exchange-member endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeMemberResponse {
    #[serde(deserialize_with = "string_or_number")]
    pub project_member_id: String,
}

/// Pre-signed write target returned when a direct upload is started.
/// Valid for a single PUT.
#[derive(Clone, Deserialize)]
pub struct UploadTarget {
    pub url: String,
    #[serde(rename = "id", deserialize_with = "string_or_number")]
    pub file_id: String,
}

// The pre-signed URL is a credential.
impl std::fmt::Debug for UploadTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadTarget")
            .field("url", &crate::platform::redact_url(&self.url))
            .field("file_id", &self.file_id)
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteFilesForm<'a> {
    pub project_member_id: &'a str,
    pub all_files: bool,
}

#[derive(Debug, Serialize)]
pub struct DirectUploadForm<'a> {
    pub project_member_id: &'a str,
    pub filename: &'a str,
    /// JSON-encoded [`crate::upload::FileMetadata`]
    pub metadata: String,
}

#[derive(Debug, Serialize)]
pub struct CompleteUploadForm<'a> {
    pub project_member_id: &'a str,
    pub file_id: &'a str,
}

/// Identifiers come back as JSON strings or integers depending on the endpoint.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Text(String),
        Number(u64),
    }

    Ok(match Id::deserialize(deserializer)? {
        Id::Text(s) => s,
        Id::Number(n) => n.to_string(),
    })
}
