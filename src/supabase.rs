//! Supabase client: PostgREST rows, storage buckets and the `exec_sql` RPC.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::{EVIDENCE_FIELD_PREFIX, REVISIONS_TABLE, USERS_TABLE};
use crate::error::{EvidenceError, Result};
use crate::hosting::provider_error;
use crate::upload::EvidenceRecorder;

const PROVIDER: &str = "supabase";

/// One `revisiones_casitas` row. Only `id` is typed; every other column is
/// kept verbatim so schema additions pass through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub id: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Revision {
    pub fn new(id: i64) -> Self {
        Self {
            id,
            fields: Map::new(),
        }
    }

    pub fn casita(&self) -> Option<String> {
        match self.fields.get("casita")? {
            Value::String(s) => Some(s.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// `(column, url)` for every non-empty evidence column, in column order.
    pub fn evidence_urls(&self) -> Vec<(&str, &str)> {
        let mut urls: Vec<(&str, &str)> = self
            .fields
            .iter()
            .filter(|(k, _)| k.starts_with(EVIDENCE_FIELD_PREFIX))
            .filter_map(|(k, v)| v.as_str().filter(|s| !s.is_empty()).map(|s| (k.as_str(), s)))
            .collect();
        urls.sort_by(|a, b| a.0.cmp(b.0));
        urls
    }

    pub fn set_evidence(&mut self, field: &str, url: &str) {
        self.fields
            .insert(field.to_string(), Value::String(url.to_string()));
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UserRow {
    pub username: String,
    pub password: String,
    #[serde(default = "default_role")]
    pub role: String,
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyOutcome {
    pub name: String,
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetupReport {
    pub bucket: String,
    pub bucket_outcome: BucketOutcome,
    pub policies: Vec<PolicyOutcome>,
}

#[derive(Debug, Clone)]
pub struct SupabaseClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let (url, key) = config.require_supabase()?;
        Ok(Self::new(url, key))
    }

    fn authed(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    fn rest_url(&self, path: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, path)
    }

    pub async fn get_revision(&self, id: i64) -> Result<Option<Revision>> {
        let response = self
            .authed(self.client.get(self.rest_url(REVISIONS_TABLE)))
            .query(&[("id", format!("eq.{}", id)), ("select", "*".to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }

        let rows: Vec<Revision> = response.json().await?;
        Ok(rows.into_iter().next())
    }

    /// Inserts or merges the row and returns what the database stored.
    pub async fn upsert_revision(&self, revision: &Revision) -> Result<Revision> {
        let rows = self.upsert_rows(json!([revision])).await?;
        let mut stored: Vec<Revision> = serde_json::from_value(rows)?;
        if stored.is_empty() {
            return Err(EvidenceError::NotFound(format!(
                "revision {} was not returned after upsert",
                revision.id
            )));
        }
        Ok(stored.remove(0))
    }

    /// Sets one evidence column on a record.
    pub async fn update_evidence(&self, record_id: &str, field: &str, url: &str) -> Result<()> {
        let id = match record_id.parse::<i64>() {
            Ok(n) => Value::from(n),
            Err(_) => Value::from(record_id),
        };
        let mut row = Map::new();
        row.insert("id".to_string(), id);
        row.insert(field.to_string(), Value::from(url));

        self.upsert_rows(Value::Array(vec![Value::Object(row)]))
            .await?;
        debug!(record_id, field, "evidence column updated");
        Ok(())
    }

    async fn upsert_rows(&self, rows: Value) -> Result<Value> {
        let response = self
            .authed(self.client.post(self.rest_url(REVISIONS_TABLE)))
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&rows)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }
        Ok(response.json().await?)
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<UserRow>> {
        let response = self
            .authed(self.client.get(self.rest_url(USERS_TABLE)))
            .query(&[
                ("username", format!("eq.{}", username)),
                ("select", "username,password,role".to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }

        let rows: Vec<UserRow> = response.json().await?;
        Ok(rows.into_iter().next())
    }

    pub async fn create_bucket(&self, name: &str, public: bool) -> Result<BucketOutcome> {
        let response = self
            .authed(
                self.client
                    .post(format!("{}/storage/v1/bucket", self.base_url)),
            )
            .json(&json!({ "id": name, "name": name, "public": public }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(BucketOutcome::Created);
        }

        let err = provider_error(PROVIDER, response).await;
        let duplicate = status == StatusCode::CONFLICT
            || matches!(&err, EvidenceError::Provider { message, .. }
                if message.to_lowercase().contains("already exists"));
        if duplicate {
            Ok(BucketOutcome::AlreadyExists)
        } else {
            Err(err)
        }
    }

    pub async fn run_sql(&self, sql: &str) -> Result<()> {
        let response = self
            .authed(self.client.post(self.rest_url("rpc/exec_sql")))
            .json(&json!({ "sql": sql }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(provider_error(PROVIDER, response).await);
        }
        Ok(())
    }

    /// Creates the evidence bucket and its row-level-security policies.
    /// Policy failures are reported, not raised; an existing policy counts
    /// as applied, so running this twice is harmless.
    pub async fn provision_storage(&self, bucket: &str) -> Result<SetupReport> {
        let bucket_outcome = self.create_bucket(bucket, true).await?;
        info!(bucket, ?bucket_outcome, "storage bucket ready");

        let mut policies = Vec::new();
        for (name, sql) in storage_policies(bucket) {
            let outcome = match self.run_sql(&sql).await {
                Ok(()) => PolicyOutcome {
                    name,
                    applied: true,
                    error: None,
                },
                Err(EvidenceError::Provider { message, .. })
                    if message.to_lowercase().contains("already exists") =>
                {
                    PolicyOutcome {
                        name,
                        applied: true,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!(policy = %name, error = %e, "policy not applied");
                    PolicyOutcome {
                        name,
                        applied: false,
                        error: Some(e.to_string()),
                    }
                }
            };
            policies.push(outcome);
        }

        Ok(SetupReport {
            bucket: bucket.to_string(),
            bucket_outcome,
            policies,
        })
    }
}

fn storage_policies(bucket: &str) -> Vec<(String, String)> {
    [
        ("read", "SELECT", "USING"),
        ("insert", "INSERT", "WITH CHECK"),
        ("update", "UPDATE", "USING"),
        ("delete", "DELETE", "USING"),
    ]
    .into_iter()
    .map(|(label, command, clause)| {
        let name = format!("{} {}", bucket, label);
        let sql = format!(
            "CREATE POLICY \"{name}\" ON storage.objects FOR {command} {clause} (bucket_id = '{bucket}');"
        );
        (name, sql)
    })
    .collect()
}

#[async_trait]
impl EvidenceRecorder for SupabaseClient {
    async fn record(&self, record_id: &str, field_name: &str, url: &str) -> Result<()> {
        self.update_evidence(record_id, field_name, url).await
    }
}
