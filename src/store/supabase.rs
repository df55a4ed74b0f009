//! Supabase REST API client using service_role key, and the KV table on top

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::warn;

use crate::config::Config;

use super::StoreError;

/// Supabase client for server-side database operations
/// Uses service_role key which bypasses RLS - handle with care!
#[derive(Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    service_role_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: impl Into<String>, service_role_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_role_key: service_role_key.into(),
        }
    }

    /// Get the REST API URL for a table
    fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .header("apikey", &self.service_role_key)
            .header("Authorization", format!("Bearer {}", self.service_role_key))
            .header("Content-Type", "application/json")
    }

    /// Make an authenticated GET request
    pub async fn get<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Vec<T>, SupabaseError> {
        let response = self
            .authed(self.client.get(self.rest_url(table)).query(query))
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        let response = check_status(response).await?;
        response.json().await.map_err(SupabaseError::Parse)
    }

    /// Make an authenticated GET request expecting a single row
    pub async fn get_one<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, SupabaseError> {
        let response = self
            .authed(self.client.get(self.rest_url(table)).query(query))
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        if response.status() == reqwest::StatusCode::NOT_ACCEPTABLE {
            // No rows found
            return Ok(None);
        }

        let response = check_status(response).await?;
        response.json().await.map(Some).map_err(SupabaseError::Parse)
    }

    /// Upsert (insert or update on conflict)
    pub async fn upsert<T: Serialize>(
        &self,
        table: &str,
        data: &T,
        on_conflict: &str,
    ) -> Result<(), SupabaseError> {
        let response = self
            .authed(
                self.client
                    .post(self.rest_url(table))
                    .query(&[("on_conflict", on_conflict)]),
            )
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(data)
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        check_status(response).await?;
        Ok(())
    }

    /// Make an authenticated DELETE request
    pub async fn delete(&self, table: &str, query: &[(&str, String)]) -> Result<(), SupabaseError> {
        let response = self
            .authed(self.client.delete(self.rest_url(table)).query(query))
            .send()
            .await
            .map_err(SupabaseError::Request)?;

        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, SupabaseError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(SupabaseError::Api {
        status: status.as_u16(),
        body,
    })
}

/// Row of the KV table: `key text primary key, value text`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KvRow {
    key: String,
    /// Base64 of the stored bytes
    value: String,
}

/// KV store over a Supabase table
pub struct SupabaseKv {
    client: SupabaseClient,
    table: String,
}

impl SupabaseKv {
    pub fn new(config: &Config) -> Result<Self, StoreError> {
        let url = config
            .supabase_url
            .as_deref()
            .ok_or(StoreError::MissingConfig("SUPABASE_URL"))?;
        let key = config
            .supabase_service_role_key
            .as_deref()
            .ok_or(StoreError::MissingConfig("SUPABASE_SERVICE_ROLE_KEY"))?;

        Ok(Self {
            client: SupabaseClient::new(url, key),
            table: config.supabase_table.clone(),
        })
    }

    pub async fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let row = KvRow {
            key: key.to_string(),
            value: BASE64.encode(value),
        };
        self.client.upsert(&self.table, &row, "key").await?;
        Ok(())
    }

    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let row: Option<KvRow> = self
            .client
            .get_one(&self.table, &[("key", format!("eq.{key}"))])
            .await?;
        row.map(decode_row).transpose().map(|r| r.map(|(_, v)| v))
    }

    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.client
            .delete(&self.table, &[("key", format!("eq.{key}"))])
            .await?;
        Ok(())
    }

    pub async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        let rows: Vec<KvRow> = self
            .client
            .get(
                &self.table,
                &[
                    ("key", format!("like.{prefix}*")),
                    ("order", "key.asc".to_string()),
                ],
            )
            .await?;
        Ok(decode_rows(rows))
    }
}

/// Decode scanned rows, skipping any whose value is not valid base64
fn decode_rows(rows: Vec<KvRow>) -> Vec<(String, Vec<u8>)> {
    rows.into_iter()
        .filter_map(|row| match decode_row(row) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(error = %e, "Skipping undecodable KV row");
                None
            }
        })
        .collect()
}

fn decode_row(row: KvRow) -> Result<(String, Vec<u8>), StoreError> {
    match BASE64.decode(row.value.as_bytes()) {
        Ok(bytes) => Ok((row.key, bytes)),
        Err(e) => Err(StoreError::InvalidValue {
            key: row.key,
            reason: e.to_string(),
        }),
    }
}

/// Supabase errors
#[derive(Debug, thiserror::Error)]
pub enum SupabaseError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    Parse(reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_decode_base64_values() {
        let row = KvRow {
            key: "room:1".into(),
            value: BASE64.encode(b"{\"id\":\"1\"}"),
        };
        assert_eq!(decode_row(row).unwrap().1, b"{\"id\":\"1\"}".to_vec());

        let broken = KvRow {
            key: "room:2".into(),
            value: "%%%".into(),
        };
        assert!(matches!(decode_row(broken), Err(StoreError::InvalidValue { .. })));
    }

    #[test]
    fn scan_skips_undecodable_rows() {
        let rows = vec![
            KvRow {
                key: "room:1".into(),
                value: BASE64.encode(b"{}"),
            },
            KvRow {
                key: "room:2".into(),
                value: "%%%".into(),
            },
            KvRow {
                key: "room:3".into(),
                value: BASE64.encode(b"[]"),
            },
        ];

        let keys: Vec<String> = decode_rows(rows).into_iter().map(|(key, _)| key).collect();
        assert_eq!(keys, ["room:1", "room:3"]);
    }

    #[test]
    fn missing_credentials_are_reported() {
        let config = Config::default();
        assert!(matches!(
            SupabaseKv::new(&config),
            Err(StoreError::MissingConfig("SUPABASE_URL"))
        ));
    }
}
