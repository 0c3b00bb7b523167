//! Google Drive v3 adapter
//!
//! Uses the access token stored for each user, refreshing it through the
//! OAuth token endpoint once it has expired.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use mini_moka::sync::Cache;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;

use super::{DriveClient, DriveFolder, NameMatch, UploadedFile, file_view_link};
use crate::channels::MediaStream;
use crate::db::UserRepo;
use crate::{Error, Result};

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const DRIVE_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const UPLOAD_BOUNDARY: &str = "intake-gateway-upload-boundary";

/// Tokens are treated as expired this long before their stated expiry
const EXPIRY_SKEW_SECS: i64 = 60;

/// Google Drive client backed by per-user OAuth credentials
pub struct GoogleDrive {
    client: Client,
    users: UserRepo,
    client_id: Option<String>,
    client_secret: Option<SecretString>,
    /// Refreshed access tokens by phone number
    tokens: Cache<String, CachedToken>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: Option<i64>,
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileEntry {
    id: String,
    name: Option<String>,
    web_view_link: Option<String>,
}

impl GoogleDrive {
    /// Create a Drive client
    ///
    /// Without OAuth client credentials, expired tokens cannot be refreshed.
    #[must_use]
    pub fn new(
        users: UserRepo,
        client_id: Option<String>,
        client_secret: Option<SecretString>,
    ) -> Self {
        Self {
            client: Client::new(),
            users,
            client_id,
            client_secret,
            tokens: Cache::builder()
                .max_capacity(1024)
                .time_to_live(Duration::from_secs(3600))
                .build(),
        }
    }

    /// Resolve a usable access token for `phone`
    async fn access_token(&self, phone: &str) -> Result<String> {
        let now = Utc::now();

        if let Some(cached) = self.tokens.get(&phone.to_string())
            && cached.expires_at > now
        {
            return Ok(cached.access_token);
        }

        let user = self
            .users
            .find_by_phone(phone)?
            .ok_or_else(|| Error::Auth(format!("no user for {phone}")))?;

        let Some(access_token) = user.access_token.clone().filter(|t| !t.is_empty()) else {
            return Err(Error::Auth(format!("Drive not linked for {phone}")));
        };

        let expired = user
            .token_expiry
            .is_some_and(|exp| exp <= now + chrono::Duration::seconds(EXPIRY_SKEW_SECS));

        match (expired, user.refresh_token.as_deref()) {
            (true, Some(refresh_token)) => self.refresh(phone, refresh_token).await,
            (true, None) => {
                tracing::warn!(phone, "Drive token expired and no refresh token stored");
                Ok(access_token)
            }
            (false, _) => Ok(access_token),
        }
    }

    async fn refresh(&self, phone: &str, refresh_token: &str) -> Result<String> {
        let (Some(client_id), Some(client_secret)) = (&self.client_id, &self.client_secret) else {
            return Err(Error::Config(
                "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET are required to refresh Drive tokens"
                    .to_string(),
            ));
        };

        let response = self
            .client
            .post(GOOGLE_TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.expose_secret()),
            ])
            .send()
            .await
            .map_err(|e| Error::Auth(format!("Token refresh failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Auth(format!("Token refresh failed: {status} - {body}")));
        }

        let token: TokenResponse = response.json().await?;
        let expires_at = Utc::now()
            + chrono::Duration::seconds(token.expires_in.unwrap_or(3600) - EXPIRY_SKEW_SECS);

        self.users.set_drive_tokens(
            phone,
            &token.access_token,
            token.refresh_token.as_deref(),
            Some(expires_at),
        )?;
        self.tokens.insert(
            phone.to_string(),
            CachedToken {
                access_token: token.access_token.clone(),
                expires_at,
            },
        );

        tracing::info!(phone, "Drive access token refreshed");
        Ok(token.access_token)
    }

    /// Fail with the response body on a non-success status
    async fn check(&self, phone: &str, response: reqwest::Response) -> Result<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            self.tokens.invalidate(&phone.to_string());
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::Drive(format!("Drive API error: {status} - {body}")))
    }
}

#[async_trait]
impl DriveClient for GoogleDrive {
    async fn list_folders_by_name(
        &self,
        phone: &str,
        name: &str,
        matching: NameMatch,
    ) -> Result<Vec<DriveFolder>> {
        let token = self.access_token(phone).await?;
        let page_size = match matching {
            NameMatch::Exact => "5",
            NameMatch::Contains => "10",
        };

        let response = self
            .client
            .get(DRIVE_FILES_URL)
            .bearer_auth(&token)
            .query(&[
                ("q", folder_query(name, matching).as_str()),
                ("fields", "files(id, name)"),
                ("spaces", "drive"),
                ("pageSize", page_size),
            ])
            .send()
            .await
            .map_err(|e| Error::Drive(format!("Drive request failed: {e}")))?;

        let list: FileList = self.check(phone, response).await?.json().await?;
        let folders = list
            .files
            .into_iter()
            .filter_map(|f| f.name.map(|name| DriveFolder { id: f.id, name }))
            .collect::<Vec<_>>();

        tracing::debug!(phone, query = name, found = folders.len(), "Drive folder search");
        Ok(folders)
    }

    async fn create_folder(&self, phone: &str, name: &str) -> Result<DriveFolder> {
        let token = self.access_token(phone).await?;

        let response = self
            .client
            .post(DRIVE_FILES_URL)
            .bearer_auth(&token)
            .query(&[("fields", "id, name")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME }))
            .send()
            .await
            .map_err(|e| Error::Drive(format!("Drive request failed: {e}")))?;

        let created: FileEntry = self.check(phone, response).await?.json().await?;
        tracing::info!(phone, folder_id = %created.id, name, "Drive folder created");

        Ok(DriveFolder {
            id: created.id,
            name: created.name.unwrap_or_else(|| name.to_string()),
        })
    }

    async fn upload_file(
        &self,
        phone: &str,
        folder_id: &str,
        body: MediaStream,
        file_name: &str,
        mime_type: &str,
    ) -> Result<UploadedFile> {
        let token = self.access_token(phone).await?;
        let (head, tail) = multipart_envelope(folder_id, file_name, mime_type)?;

        let stream = stream::once(async move { Ok::<_, Error>(head) })
            .chain(body)
            .chain(stream::once(async move { Ok::<_, Error>(tail) }));

        let response = self
            .client
            .post(DRIVE_UPLOAD_URL)
            .bearer_auth(&token)
            .query(&[("uploadType", "multipart"), ("fields", "id, webViewLink")])
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={UPLOAD_BOUNDARY}"),
            )
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await
            .map_err(|e| Error::Drive(format!("Drive upload failed: {e}")))?;

        let file: FileEntry = self.check(phone, response).await?.json().await?;
        let view_link = file
            .web_view_link
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| file_view_link(&file.id));

        tracing::info!(phone, file_id = %file.id, folder_id, "file uploaded to Drive");
        Ok(UploadedFile {
            id: file.id,
            view_link,
        })
    }
}

/// Build a Drive `q` expression for folders by name
fn folder_query(name: &str, matching: NameMatch) -> String {
    let escaped = escape_query_value(name);
    let op = match matching {
        NameMatch::Exact => "=",
        NameMatch::Contains => "contains",
    };
    format!("mimeType='{FOLDER_MIME}' and trashed=false and name {op} '{escaped}'")
}

fn escape_query_value(value: &str) -> String {
    value.replace('\'', "\\'")
}

/// Bytes that go before and after the media in a multipart/related upload
fn multipart_envelope(folder_id: &str, file_name: &str, mime_type: &str) -> Result<(Vec<u8>, Vec<u8>)> {
    let metadata = serde_json::to_string(&json!({
        "name": file_name,
        "parents": [folder_id],
        "mimeType": mime_type,
    }))?;

    let head = format!(
        "--{UPLOAD_BOUNDARY}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
         --{UPLOAD_BOUNDARY}\r\nContent-Type: {mime_type}\r\n\r\n"
    );
    let tail = format!("\r\n--{UPLOAD_BOUNDARY}--\r\n");

    Ok((head.into_bytes(), tail.into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;

    #[test]
    fn test_folder_query_escapes_quotes() {
        assert_eq!(
            folder_query("O'Brien", NameMatch::Exact),
            "mimeType='application/vnd.google-apps.folder' and trashed=false and name = 'O\\'Brien'"
        );
        assert!(folder_query("Tax", NameMatch::Contains).ends_with("name contains 'Tax'"));
    }

    #[test]
    fn test_multipart_envelope() {
        let (head, tail) = multipart_envelope("f1", "scan.jpg", "image/jpeg").unwrap();
        let head = String::from_utf8(head).unwrap();
        assert!(head.starts_with(&format!("--{UPLOAD_BOUNDARY}\r\n")));
        assert!(head.contains(r#""parents":["f1"]"#));
        assert!(head.ends_with("Content-Type: image/jpeg\r\n\r\n"));
        assert_eq!(
            String::from_utf8(tail).unwrap(),
            format!("\r\n--{UPLOAD_BOUNDARY}--\r\n")
        );
    }

    #[tokio::test]
    async fn test_access_token_from_stored_credentials() {
        let users = UserRepo::new(init_memory().unwrap());
        users.create("1555", None).unwrap();
        let drive = GoogleDrive::new(users.clone(), None, None);

        let err = drive.access_token("1555").await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(matches!(drive.access_token("nobody").await, Err(Error::Auth(_))));

        let later = Utc::now() + chrono::Duration::hours(1);
        users.set_drive_tokens("1555", "tok", Some("refresh"), Some(later)).unwrap();
        assert_eq!(drive.access_token("1555").await.unwrap(), "tok");
    }

    #[tokio::test]
    async fn test_expired_token_needs_client_credentials() {
        let users = UserRepo::new(init_memory().unwrap());
        users.create("1555", None).unwrap();
        let past = Utc::now() - chrono::Duration::hours(1);
        users.set_drive_tokens("1555", "old", Some("refresh"), Some(past)).unwrap();

        let drive = GoogleDrive::new(users, None, None);
        assert!(matches!(drive.access_token("1555").await, Err(Error::Config(_))));
    }
}
