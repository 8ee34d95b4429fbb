//! REST client for the clinic API.
//!
//! Requests under the API base carry the session's bearer token; every
//! non-success response is mapped onto [`ClientError`].

use std::sync::Arc;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::error::ApiError;
use tracing::debug;

use crate::{
    error::{ClientError, ClientResult},
    session::SessionContext,
};

mod admin;
mod clinical;
mod notifications;

/// Query string as `(name, value)` pairs; optional filters are left out.
pub type Query = Vec<(&'static str, String)>;

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base: String,
    session: Arc<SessionContext>,
}

impl ApiClient {
    pub fn new(http: Client, session: Arc<SessionContext>) -> Self {
        Self {
            http,
            base: session.api_url().to_string(),
            session,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Only URLs under the API base may receive the bearer token.
    pub fn should_attach_token(&self, url: &str) -> bool {
        url.starts_with(&self.base)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        if !self.should_attach_token(url) {
            return builder;
        }
        match self.session.token().await {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> ClientResult<Response> {
        let response = builder.send().await?;
        debug!(status = response.status().as_u16(), url = %response.url(), "api: response");
        ensure_success(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &Query) -> ClientResult<T> {
        let url = self.url(path);
        let builder = self.request(Method::GET, &url).await.query(query);
        Ok(self.execute(builder).await?.json().await?)
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> ClientResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = self.url(path);
        let builder = self.request(method, &url).await.json(body);
        Ok(self.execute(builder).await?.json().await?)
    }

    /// POST with an empty JSON object, ignoring any response body.
    async fn post_action(&self, path: &str) -> ClientResult<()> {
        let url = self.url(path);
        let builder = self
            .request(Method::POST, &url)
            .await
            .json(&serde_json::json!({}));
        self.execute(builder).await?;
        Ok(())
    }

    async fn post_action_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.send_json(Method::POST, path, &serde_json::json!({})).await
    }

    async fn delete(&self, path: &str) -> ClientResult<()> {
        let url = self.url(path);
        let builder = self.request(Method::DELETE, &url).await;
        self.execute(builder).await?;
        Ok(())
    }
}

/// Passes success responses through; otherwise decodes the server's error
/// body when there is one and maps the status.
pub(crate) async fn ensure_success(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.json::<ApiError>().await.ok();
    Err(ClientError::from_status(status.as_u16(), &url, body))
}

fn push_opt<T: ToString>(query: &mut Query, name: &'static str, value: Option<T>) {
    if let Some(value) = value {
        query.push((name, value.to_string()));
    }
}

#[cfg(test)]
#[path = "../tests/api_tests.rs"]
mod tests;
