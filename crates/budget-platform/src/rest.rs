//! REST adapter for the budget backend.
//!
//! Every endpoint replies with the `{ success, message?, result? }` envelope.
//! Uses browser `fetch()` via gloo-net. A forced read sends
//! `Cache-Control: no-cache` and a `_t=<now>` query parameter so neither the
//! browser nor an intermediate proxy answers from cache.

use async_trait::async_trait;
use gloo_net::http::{Request, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use budget_core::ports::*;
use budget_types::{
    BudgetError, Result,
    budget::{Budget, BudgetDraft},
    config::ApiConfig,
    dashboard::DashboardData,
    entry::{Entry, EntryDraft, EntryKind},
    project::{ProjectDetail, ProjectDraft, ProjectStatus, ProjectSummary},
    response::ServiceResponse,
};

pub struct RestClient {
    base_url: String,
    token: Option<String>,
}

impl RestClient {
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        join_url(&self.base_url, path)
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.header("Accept", "application/json");
        match &self.token {
            Some(token) => builder.header("Authorization", &format!("Bearer {}", token)),
            None => builder,
        }
    }

    async fn read<T: DeserializeOwned>(&self, path: &str, mode: FetchMode, what: &str) -> Result<T> {
        let builder = match mode {
            FetchMode::Cached => Request::get(&self.url(path)),
            FetchMode::Force => Request::get(&force_url(&self.url(path), js_sys::Date::now() as u64))
                .header("Cache-Control", "no-cache"),
        };
        let response = self.authorize(builder).send().await.map_err(network)?;
        decode(response, what).await
    }

    async fn write<B, T>(&self, builder: RequestBuilder, body: &B, what: &str) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let response = self
            .authorize(builder)
            .json(body)
            .map_err(network)?
            .send()
            .await
            .map_err(network)?;
        decode(response, what).await
    }

    async fn remove(&self, path: &str, what: &str) -> Result<()> {
        let response = self
            .authorize(Request::delete(&self.url(path)))
            .send()
            .await
            .map_err(network)?;
        let _: Option<Value> = decode_outcome(response, what).await?;
        Ok(())
    }
}

// ─── Helpers ─────────────────────────────────────────────────

/// Join a base URL and an absolute path without doubling the slash.
pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Append the `_t` cache-busting parameter.
pub fn force_url(url: &str, now_ms: u64) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}_t={}", url, separator, now_ms)
}

fn segment(id: &str) -> String {
    String::from(js_sys::encode_uri_component(id))
}

fn network(e: gloo_net::Error) -> BudgetError {
    BudgetError::Network(e.to_string())
}

async fn decode_outcome<T: DeserializeOwned>(response: Response, what: &str) -> Result<Option<T>> {
    if !response.ok() {
        let status = response.status();
        let message = match response.text().await {
            Ok(text) if !text.is_empty() => text,
            _ => response.status_text(),
        };
        return Err(BudgetError::Http { status, message });
    }
    let envelope: ServiceResponse<T> = response
        .json()
        .await
        .map_err(|e| BudgetError::Serialization(format!("{}: {}", what, e)))?;
    envelope.into_outcome()
}

async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    decode_outcome(response, what)
        .await?
        .ok_or_else(|| BudgetError::EmptyResult(what.to_string()))
}

// ─── Ports ───────────────────────────────────────────────────

#[async_trait(?Send)]
impl DashboardPort for RestClient {
    async fn dashboard_metrics(&self, mode: FetchMode) -> Result<DashboardData> {
        self.read("/dashboard/metrics", mode, "dashboard metrics").await
    }
}

#[async_trait(?Send)]
impl ProjectPort for RestClient {
    async fn project_summaries(&self, mode: FetchMode) -> Result<Vec<ProjectSummary>> {
        self.read("/dashboard/projects", mode, "project summaries").await
    }

    async fn project_detail(&self, id: &str, mode: FetchMode) -> Result<ProjectDetail> {
        let path = format!("/projects/{}/dashboard", segment(id));
        self.read(&path, mode, "project detail").await
    }

    async fn update_project_status(&self, id: &str, status: ProjectStatus) -> Result<ProjectSummary> {
        let url = self.url(&format!("/projects/{}/status", segment(id)));
        self.write(Request::patch(&url), &json!({ "status": status }), "project status update")
            .await
    }

    async fn create_project(&self, draft: &ProjectDraft) -> Result<ProjectSummary> {
        self.write(Request::post(&self.url("/projects")), draft, "project create")
            .await
    }

    async fn update_project(&self, id: &str, draft: &ProjectDraft) -> Result<ProjectSummary> {
        let url = self.url(&format!("/projects/{}", segment(id)));
        self.write(Request::put(&url), draft, "project update").await
    }

    async fn delete_project(&self, id: &str) -> Result<()> {
        self.remove(&format!("/projects/{}", segment(id)), "project delete")
            .await
    }
}

#[async_trait(?Send)]
impl BudgetPort for RestClient {
    async fn budgets(&self, mode: FetchMode) -> Result<Vec<Budget>> {
        self.read("/budgets", mode, "budgets").await
    }

    async fn create_budget(&self, draft: &BudgetDraft) -> Result<Budget> {
        self.write(Request::post(&self.url("/budgets")), draft, "budget create")
            .await
    }

    async fn update_budget(&self, id: &str, draft: &BudgetDraft) -> Result<Budget> {
        let url = self.url(&format!("/budgets/{}", segment(id)));
        self.write(Request::put(&url), draft, "budget update").await
    }

    async fn delete_budget(&self, id: &str) -> Result<()> {
        self.remove(&format!("/budgets/{}", segment(id)), "budget delete")
            .await
    }
}

#[async_trait(?Send)]
impl EntryPort for RestClient {
    async fn create_entry(&self, draft: &EntryDraft) -> Result<Entry> {
        let url = self.url(&format!("/{}", draft.kind.resource()));
        self.write(Request::post(&url), draft, "entry create").await
    }

    async fn delete_entry(&self, kind: EntryKind, id: &str) -> Result<()> {
        let path = format!("/{}/{}", kind.resource(), segment(id));
        self.remove(&path, "entry delete").await
    }
}
