use async_trait::async_trait;
use reqwest::{header, Client};
use tracing::{debug, warn};

use crate::{
    collaborators::{
        is_clinical_record, read_success_body, RecordStorage, CLINICAL_RECORD_PREFIX,
    },
    config::StorageConfig,
    error::CollaboratorError,
};

const SERVICE: &str = "blob storage";

/// Block blobs in one container, addressed with a SAS token.
pub struct AzureBlobStorage {
    client: Client,
    config: StorageConfig,
}

impl AzureBlobStorage {
    pub fn new(client: Client, config: StorageConfig) -> Self {
        Self { client, config }
    }

    fn container_url(&self) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}",
            self.config.account, self.config.container
        )
    }

    fn blob_url(&self, name: &str) -> String {
        format!("{}/{}?{}", self.container_url(), name, self.config.sas_token)
    }

    async fn download(&self, name: &str) -> Result<String, CollaboratorError> {
        let response = self
            .client
            .get(self.blob_url(name))
            .send()
            .await
            .map_err(|err| CollaboratorError::transient(SERVICE, err))?;
        read_success_body(SERVICE, response).await
    }
}

#[async_trait]
impl RecordStorage for AzureBlobStorage {
    async fn upload(&self, name: &str, content: String) -> Result<(), CollaboratorError> {
        let response = self
            .client
            .put(self.blob_url(name))
            .header("x-ms-blob-type", "BlockBlob")
            .header(header::CONTENT_TYPE, "application/json")
            .body(content)
            .send()
            .await
            .map_err(|err| CollaboratorError::transient(SERVICE, err))?;

        read_success_body(SERVICE, response).await?;
        debug!(target: "storage", blob = name, "uploaded record");
        Ok(())
    }

    async fn list(&self) -> Result<Vec<serde_json::Value>, CollaboratorError> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(format!("{}?{}", self.container_url(), self.config.sas_token))
                .query(&[
                    ("restype", "container"),
                    ("comp", "list"),
                    ("prefix", CLINICAL_RECORD_PREFIX),
                ]);
            if let Some(marker) = &marker {
                request = request.query(&[("marker", marker.as_str())]);
            }

            let response = request
                .send()
                .await
                .map_err(|err| CollaboratorError::transient(SERVICE, err))?;
            let listing = read_success_body(SERVICE, response).await?;

            names.extend(
                blob_names(&listing)
                    .into_iter()
                    .filter(|name| is_clinical_record(name)),
            );
            marker = next_marker(&listing);
            if marker.is_none() {
                break;
            }
        }

        let mut records = Vec::new();
        for name in names {
            let body = match self.download(&name).await {
                Ok(body) => body,
                Err(err) => {
                    warn!(target: "storage", blob = %name, error = %err, "skipping record that failed to download");
                    continue;
                }
            };

            match serde_json::from_str(&body) {
                Ok(record) => records.push(record),
                Err(err) => warn!(target: "storage", blob = %name, error = %err, "skipping unreadable record"),
            }
        }

        Ok(records)
    }
}

/// Continuation token of a paged listing; absent or empty on the last page.
fn next_marker(listing: &str) -> Option<String> {
    let (_, rest) = listing.split_once("<NextMarker>")?;
    let (marker, _) = rest.split_once("</NextMarker>")?;
    let marker = marker.trim();
    (!marker.is_empty()).then(|| marker.to_string())
}

/// Pulls `<Name>` entries out of a List Blobs response.
fn blob_names(listing: &str) -> Vec<String> {
    listing
        .split("<Name>")
        .skip(1)
        .filter_map(|segment| segment.split_once("</Name>"))
        .map(|(name, _)| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect()
}
