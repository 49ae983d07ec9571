use std::time::Duration;

use anyhow::Result;
use reqwest::{header, Client};

use crate::config::Config;
use crate::models::{Joke, Post, User};
use crate::request::HttpRequest;

/// Request factory for the demo endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    joke_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &Config) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            joke_url: config.joke_url.clone(),
            token: None,
        })
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: impl Into<String>) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            joke_url: self.joke_url.clone(),
            token: Some(token.into()),
        }
    }

    fn get<T>(&self, url: String) -> HttpRequest<T> {
        let request = HttpRequest::get(self.client.clone(), url);
        match self.token {
            Some(ref token) => request.bearer_auth(token.clone()),
            None => request,
        }
    }

    pub fn users(&self) -> HttpRequest<Vec<User>> {
        self.get(format!("{}/users", self.base_url))
    }

    pub fn post(&self, id: i64) -> HttpRequest<Post> {
        self.get(format!("{}/posts/{}", self.base_url, id))
    }

    pub fn posts(&self) -> HttpRequest<Vec<Post>> {
        self.get(format!("{}/posts", self.base_url))
    }

    /// The joke service answers with HTML unless JSON is asked for
    pub fn joke(&self) -> HttpRequest<Joke> {
        HttpRequest::get(self.client.clone(), self.joke_url.clone())
            .header(header::ACCEPT, "application/json")
    }
}
