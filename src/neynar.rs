use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::NEYNAR_API_BASE;
use crate::error::{ApiErrorBody, LookupError, PublishError};
use crate::identity::IdentityLookup;
use crate::publish::Publisher;
use crate::types::Announcement;

/// Error code the lookup endpoint uses when no profile matches.
const NOT_FOUND_CODE: &str = "NotFound";

#[derive(Debug, Clone, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub fid: Option<u64>,
}

/// Bulk-by-address response: lowercase address → matching profiles.
pub type BulkUsers = HashMap<String, Vec<UserProfile>>;

#[derive(Debug, Serialize)]
struct CastRequest<'a> {
    signer_uuid: &'a str,
    text: &'a str,
    embeds: Vec<Embed<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct Embed<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    url: &'a str,
}

#[derive(Debug, Deserialize)]
struct CastResponse {
    #[serde(default)]
    cast: Option<CastRef>,
}

#[derive(Debug, Deserialize)]
struct CastRef {
    hash: String,
}

/// Client for the social API: profile lookup by address and cast publishing.
#[derive(Clone)]
pub struct NeynarClient {
    http: reqwest::Client,
    base: String,
    api_key: String,
    signer_uuid: String,
}

impl NeynarClient {
    pub fn new(http: reqwest::Client, api_key: String, signer_uuid: String) -> Self {
        Self::with_base(http, NEYNAR_API_BASE, api_key, signer_uuid)
    }

    pub fn with_base(
        http: reqwest::Client,
        base: &str,
        api_key: String,
        signer_uuid: String,
    ) -> Self {
        Self {
            http,
            base: base.trim_end_matches('/').to_string(),
            api_key,
            signer_uuid,
        }
    }
}

/// Pick the first profile's username for `address` out of a lookup body.
///
/// A `NotFound` error body is a valid "no profile" answer.
pub fn parse_lookup(status: u16, body: &str, address: &str) -> Result<Option<String>, LookupError> {
    if let Ok(err) = serde_json::from_str::<ApiErrorBody>(body) {
        if err.code.as_deref() == Some(NOT_FOUND_CODE) {
            return Ok(None);
        }
    }
    if !(200..300).contains(&status) {
        return Err(LookupError::Status {
            status,
            body: body.to_string(),
        });
    }
    let users: BulkUsers = serde_json::from_str(body)?;
    Ok(users
        .get(&address.to_lowercase())
        .and_then(|profiles| profiles.first())
        .map(|p| p.username.clone()))
}

impl IdentityLookup for NeynarClient {
    async fn lookup(&self, address: &str) -> Result<Option<String>, LookupError> {
        let url = format!("{}/user/bulk-by-address", self.base);
        debug!("Looking up {address}");
        let resp = self
            .http
            .get(&url)
            .query(&[("addresses", address)])
            .header("accept", "application/json")
            .header("x-api-key", &self.api_key)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;
        parse_lookup(status, &body, address)
    }
}

impl Publisher for NeynarClient {
    async fn publish(&self, announcement: &Announcement) -> Result<(), PublishError> {
        let request = CastRequest {
            signer_uuid: &self.signer_uuid,
            text: &announcement.text,
            embeds: vec![Embed {
                kind: "url",
                url: &announcement.embed_url,
            }],
            channel_id: announcement.channel.as_deref(),
        };
        let resp = self
            .http
            .post(format!("{}/cast", self.base))
            .header("x-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            return Err(PublishError::from_response(status.as_u16(), &body));
        }
        if let Ok(CastResponse { cast: Some(cast) }) = serde_json::from_str(&body) {
            debug!("Cast hash {}", cast.hash);
        }
        Ok(())
    }
}
