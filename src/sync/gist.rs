//! Minimal GitHub gists client: just the calls the sync manager needs.
//!
//! The base URL is configurable for GitHub Enterprise and for tests; the
//! token never appears in logs or Debug output and is only ever sent to the
//! configured API host.

use std::collections::HashMap;

use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Cap on any response body we are willing to buffer.
const MAX_RESPONSE_SIZE: usize = 10 * 1024 * 1024;

/// Gist listing page size, and a bound on how many pages we will walk.
const LIST_PAGE_SIZE: usize = 100;
const LIST_MAX_PAGES: usize = 10;

const USER_AGENT: &str = concat!("daybook/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("GitHub API error: status {0}")]
    HttpStatus(u16),
    #[error("Authentication failed (check the token and its gist scope)")]
    Unauthorized,
    #[error("Not found")]
    NotFound,
    #[error("Rate limited by the GitHub API, try again later")]
    RateLimited,
    #[error("Response too large (exceeds {0} bytes)")]
    ResponseTooLarge(usize),
    #[error("Invalid UTF-8 in response")]
    InvalidUtf8,
    #[error("Malformed API response: {0}")]
    Malformed(String),
    #[error("Insecure base URL: HTTPS required (except localhost for testing)")]
    InsecureBaseUrl,
}

/// One file inside a gist. List responses carry no `content`; large files
/// come back truncated with a `raw_url` to fetch instead.
#[derive(Debug, Clone, Deserialize)]
pub struct GistFile {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub truncated: bool,
    #[serde(default)]
    pub raw_url: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Gist {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub files: HashMap<String, GistFile>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub login: String,
}

pub struct GistClient {
    http: reqwest::Client,
    base: String,
    token: SecretString,
}

impl GistClient {
    /// Builds a client for the given token. `base_url` overrides the public
    /// GitHub API host (Enterprise instances, wiremock in tests).
    pub fn new(token: SecretString, base_url: Option<&str>) -> Result<Self, ApiError> {
        let base = base_url
            .unwrap_or(DEFAULT_API_BASE)
            .trim_end_matches('/')
            .to_string();
        ensure_https(&base)?;
        if base_url.is_some() && base != DEFAULT_API_BASE {
            tracing::info!(base_url = %base, "Using custom GitHub API base URL");
        }

        let http = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { http, base, token })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base, path))
            .header(
                "Authorization",
                format!("Bearer {}", self.token.expose_secret()),
            )
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    pub async fn get_gist(&self, id: &str) -> Result<Gist, ApiError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/gists/{id}"))
            .send()
            .await?;
        decode_json(check_status(response)?).await
    }

    /// All gists reachable with the token, walking pagination so callers see
    /// the full list (bounded to [`LIST_MAX_PAGES`] pages).
    pub async fn list_gists(&self) -> Result<Vec<Gist>, ApiError> {
        let mut all = Vec::new();
        for page in 1..=LIST_MAX_PAGES {
            let response = self
                .request(
                    reqwest::Method::GET,
                    &format!("/gists?per_page={LIST_PAGE_SIZE}&page={page}"),
                )
                .send()
                .await?;
            let batch: Vec<Gist> = decode_json(check_status(response)?).await?;
            let last_page = batch.len() < LIST_PAGE_SIZE;
            all.extend(batch);
            if last_page {
                return Ok(all);
            }
        }
        tracing::warn!(
            pages = LIST_MAX_PAGES,
            "Gist listing cut off at the page bound"
        );
        Ok(all)
    }

    pub async fn create_gist(
        &self,
        description: &str,
        public: bool,
        filename: &str,
        content: &str,
    ) -> Result<Gist, ApiError> {
        let body = json!({
            "description": description,
            "public": public,
            "files": { filename: { "content": content } },
        });
        let response = self
            .request(reqwest::Method::POST, "/gists")
            .json(&body)
            .send()
            .await?;
        decode_json(check_status(response)?).await
    }

    pub async fn update_gist(
        &self,
        id: &str,
        description: &str,
        filename: &str,
        content: &str,
    ) -> Result<Gist, ApiError> {
        let body = json!({
            "description": description,
            "files": { filename: { "content": content } },
        });
        let response = self
            .request(reqwest::Method::PATCH, &format!("/gists/{id}"))
            .json(&body)
            .send()
            .await?;
        decode_json(check_status(response)?).await
    }

    /// The authenticated user, as a connection test.
    pub async fn get_user(&self) -> Result<User, ApiError> {
        let response = self.request(reqwest::Method::GET, "/user").send().await?;
        decode_json(check_status(response)?).await
    }

    /// Resolves the content of one gist file, following the `raw_url`
    /// indirection GitHub uses for large files.
    pub async fn file_content(
        &self,
        gist: &Gist,
        filename: &str,
    ) -> Result<Option<String>, ApiError> {
        let Some(file) = gist.files.get(filename) else {
            return Ok(None);
        };
        if file.truncated {
            if let Some(raw_url) = &file.raw_url {
                tracing::debug!(gist_id = %gist.id, size = file.size, "Following raw_url for truncated file");
                return Ok(Some(self.fetch_raw(raw_url).await?));
            }
        }
        Ok(file.content.clone())
    }

    /// Plain GET of a raw content URL. Raw gist URLs are capability URLs
    /// served from a different host, so the token is deliberately not sent.
    async fn fetch_raw(&self, raw_url: &str) -> Result<String, ApiError> {
        ensure_https(raw_url)?;
        let response = self.http.get(raw_url).send().await?;
        read_limited_text(check_status(response)?, MAX_RESPONSE_SIZE).await
    }
}

/// SEC-005: Enforce HTTPS so the token cannot leak over cleartext.
/// Allow HTTP only for loopback hosts (testing purposes).
fn ensure_https(raw: &str) -> Result<(), ApiError> {
    let parsed = url::Url::parse(raw).map_err(|_| ApiError::InsecureBaseUrl)?;
    match parsed.scheme() {
        "https" => Ok(()),
        "http" => {
            let loopback = match parsed.host() {
                Some(url::Host::Domain(domain)) => domain == "localhost",
                Some(url::Host::Ipv4(addr)) => addr.is_loopback(),
                Some(url::Host::Ipv6(addr)) => addr.is_loopback(),
                None => false,
            };
            if !loopback {
                tracing::error!(url = %raw, "Rejecting non-HTTPS API URL (HTTPS required except loopback)");
                return Err(ApiError::InsecureBaseUrl);
            }
            tracing::warn!(url = %raw, "Using non-HTTPS API URL (loopback only)");
            Ok(())
        }
        _ => {
            tracing::error!(url = %raw, "Rejecting API URL with unsupported scheme");
            Err(ApiError::InsecureBaseUrl)
        }
    }
}

/// Maps error statuses to the taxonomy callers report on. GitHub signals
/// rate limiting as 403 with a drained quota header as well as 429.
fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    match status.as_u16() {
        401 => Err(ApiError::Unauthorized),
        403 => {
            let drained = response
                .headers()
                .get("x-ratelimit-remaining")
                .and_then(|v| v.to_str().ok())
                == Some("0");
            if drained {
                Err(ApiError::RateLimited)
            } else {
                Err(ApiError::Unauthorized)
            }
        }
        404 => Err(ApiError::NotFound),
        429 => Err(ApiError::RateLimited),
        code => Err(ApiError::HttpStatus(code)),
    }
}

async fn decode_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let text = read_limited_text(response, MAX_RESPONSE_SIZE).await?;
    serde_json::from_str(&text).map_err(|e| ApiError::Malformed(e.to_string()))
}

async fn read_limited_text(
    response: reqwest::Response,
    limit: usize,
) -> Result<String, ApiError> {
    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len as usize > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(ApiError::Network)?;
        // Saturating add so a hostile Content-Length cannot overflow the check
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::ResponseTooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    String::from_utf8(bytes).map_err(|_| ApiError::InvalidUtf8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> GistClient {
        GistClient::new(SecretString::from("test-token"), Some(&server.uri())).unwrap()
    }

    fn gist_json(id: &str, filename: &str) -> serde_json::Value {
        json!({
            "id": id,
            "description": "Daybook - backup",
            "updated_at": "2026-01-02T00:00:00Z",
            "files": { filename: { "content": "{}", "truncated": false, "size": 2 } },
        })
    }

    #[tokio::test]
    async fn test_get_gist_sends_auth_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gists/abc"))
            .and(header("Authorization", "Bearer test-token"))
            .and(header("Accept", "application/vnd.github+json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gist_json("abc", "notes.md")))
            .expect(1)
            .mount(&mock_server)
            .await;

        let gist = client_for(&mock_server).get_gist("abc").await.unwrap();
        assert_eq!(gist.id, "abc");
        assert!(gist.files.contains_key("notes.md"));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gists/gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gists/secret"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gists/limited"))
            .respond_with(
                ResponseTemplate::new(403).insert_header("x-ratelimit-remaining", "0"),
            )
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gists/forbidden"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&mock_server)
            .await;

        let client = client_for(&mock_server);
        assert!(matches!(
            client.get_gist("gone").await,
            Err(ApiError::NotFound)
        ));
        assert!(matches!(
            client.get_gist("secret").await,
            Err(ApiError::Unauthorized)
        ));
        assert!(matches!(
            client.get_gist("limited").await,
            Err(ApiError::RateLimited)
        ));
        assert!(matches!(
            client.get_gist("forbidden").await,
            Err(ApiError::Unauthorized)
        ));
    }

    #[tokio::test]
    async fn test_list_gists_walks_pages() {
        let mock_server = MockServer::start().await;
        let full_page: Vec<serde_json::Value> = (0..LIST_PAGE_SIZE)
            .map(|i| json!({ "id": format!("g{i}"), "files": {} }))
            .collect();
        Mock::given(method("GET"))
            .and(path("/gists"))
            .and(query_param("page", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(&full_page))
            .expect(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/gists"))
            .and(query_param("page", "2"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{ "id": "last", "files": {} }])),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let gists = client_for(&mock_server).list_gists().await.unwrap();
        assert_eq!(gists.len(), LIST_PAGE_SIZE + 1);
        assert_eq!(gists.last().unwrap().id, "last");
    }

    #[tokio::test]
    async fn test_create_gist_posts_secret_document() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/gists"))
            .and(body_partial_json(json!({
                "public": false,
                "files": { "daybook-articles.json": { "content": "{\"articles\":[]}" } },
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(gist_json("new1", "daybook-articles.json")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let gist = client_for(&mock_server)
            .create_gist(
                "Daybook - personal article backup",
                false,
                "daybook-articles.json",
                "{\"articles\":[]}",
            )
            .await
            .unwrap();
        assert_eq!(gist.id, "new1");
    }

    #[tokio::test]
    async fn test_update_gist_patches_file() {
        let mock_server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/gists/abc"))
            .and(body_partial_json(json!({
                "files": { "daybook-articles.json": { "content": "updated" } },
            })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(gist_json("abc", "daybook-articles.json")),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        client_for(&mock_server)
            .update_gist("abc", "Daybook - 0 articles", "daybook-articles.json", "updated")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_file_content_follows_raw_url() {
        let mock_server = MockServer::start().await;
        let raw_url = format!("{}/raw/abc/daybook-articles.json", mock_server.uri());
        Mock::given(method("GET"))
            .and(path("/raw/abc/daybook-articles.json"))
            .respond_with(ResponseTemplate::new(200).set_body_string("the full content"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let gist: Gist = serde_json::from_value(json!({
            "id": "abc",
            "files": {
                "daybook-articles.json": {
                    "content": "cut off",
                    "truncated": true,
                    "raw_url": raw_url,
                    "size": 5_000_000,
                }
            },
        }))
        .unwrap();

        let content = client_for(&mock_server)
            .file_content(&gist, "daybook-articles.json")
            .await
            .unwrap();
        assert_eq!(content.as_deref(), Some("the full content"));
    }

    #[tokio::test]
    async fn test_file_content_missing_file_is_none() {
        let mock_server = MockServer::start().await;
        let gist: Gist = serde_json::from_value(json!({ "id": "abc", "files": {} })).unwrap();
        let content = client_for(&mock_server)
            .file_content(&gist, "daybook-articles.json")
            .await
            .unwrap();
        assert!(content.is_none());
    }

    #[tokio::test]
    async fn test_get_user() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "octocat" })))
            .mount(&mock_server)
            .await;

        let user = client_for(&mock_server).get_user().await.unwrap();
        assert_eq!(user.login, "octocat");
    }

    #[test]
    fn test_http_base_url_rejected() {
        let result = GistClient::new(SecretString::from("t"), Some("http://evil.example.com"));
        assert!(matches!(result, Err(ApiError::InsecureBaseUrl)));
    }

    #[test]
    fn test_localhost_base_url_allowed() {
        assert!(GistClient::new(SecretString::from("t"), Some("http://127.0.0.1:9999")).is_ok());
        assert!(GistClient::new(SecretString::from("t"), Some("http://localhost:9999")).is_ok());
        assert!(GistClient::new(SecretString::from("t"), None).is_ok());
    }

    #[tokio::test]
    async fn test_malformed_response_reported() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gists/abc"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>not json</html>"))
            .mount(&mock_server)
            .await;

        let result = client_for(&mock_server).get_gist("abc").await;
        assert!(matches!(result, Err(ApiError::Malformed(_))));
    }
}
