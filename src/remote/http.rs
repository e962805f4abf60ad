use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

use super::{Document, DocumentPage, DocumentStore, Write};

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    writes: &'a [Write],
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

/// REST client for the hosted document store.
pub struct HttpDocumentStore {
    client: Client,
    base_url: String,
    access_token: Option<String>,
}

impl HttpDocumentStore {
    pub fn new(base_url: &str, access_token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("readlater/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token,
        })
    }

    fn document_url(&self, path: &str) -> String {
        let encoded = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        format!("{}/documents/{}", self.base_url, encoded)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(AppError::NotAuthenticated);
        }
        let error_text = response.text().await.unwrap_or_default();
        Err(AppError::RemoteStore(format!("HTTP {}: {}", status, error_text)))
    }
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn commit(&self, writes: Vec<Write>) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .post(format!("{}/documents:commit", self.base_url))
            .json(&CommitRequest { writes: &writes });
        let response = self.authorized(request).send().await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn list(&self, collection: &str, page_size: usize, page_token: Option<String>) -> Result<DocumentPage> {
        let mut query = vec![("pageSize", page_size.to_string())];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }
        let request = self.client.get(self.document_url(collection)).query(&query);
        let response = Self::check(self.authorized(request).send().await?).await?;
        Ok(response.json().await?)
    }

    async fn get(&self, path: &str) -> Result<Option<Document>> {
        let request = self.client.get(self.document_url(path));
        let response = self.authorized(request).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        Ok(Some(response.json().await?))
    }

    async fn count(&self, collection: &str) -> Result<u64> {
        let request = self
            .client
            .get(format!("{}:count", self.document_url(collection)));
        let response = Self::check(self.authorized(request).send().await?).await?;
        let body: CountResponse = response.json().await?;
        Ok(body.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store(server: &MockServer) -> HttpDocumentStore {
        HttpDocumentStore::new(
            &format!("{}/v1/", server.uri()),
            Some("secret".to_string()),
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn commit_posts_writes_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/documents:commit"))
            .and(header("authorization", "Bearer secret"))
            .and(body_json(json!({
                "writes": [
                    {"set": {"path": "users/u1/articles/a1", "fields": {"title": "t"}}},
                    {"delete": {"path": "users/u1/articles/a1/tags/old"}}
                ]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let store = store(&server).await;
        store
            .commit(vec![
                Write::Set {
                    path: "users/u1/articles/a1".into(),
                    fields: json!({"title": "t"}),
                },
                Write::Delete {
                    path: "users/u1/articles/a1/tags/old".into(),
                },
            ])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn list_passes_page_token_and_parses_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/documents/users/u1/articles"))
            .and(query_param("pageSize", "2"))
            .and(query_param("pageToken", "a1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [{"id": "a2", "fields": {"title": "two"}}],
                "nextPageToken": null
            })))
            .mount(&server)
            .await;

        let page = store(&server)
            .await
            .list("users/u1/articles", 2, Some("a1".into()))
            .await
            .unwrap();
        assert_eq!(page.documents.len(), 1);
        assert_eq!(page.documents[0].id, "a2");
        assert!(page.next_page_token.is_none());
    }

    #[tokio::test]
    async fn get_maps_not_found_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/documents/users/u1/meta/sync"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let doc = store(&server).await.get("users/u1/meta/sync").await.unwrap();
        assert!(doc.is_none());
    }

    #[tokio::test]
    async fn count_reads_count_field() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/documents/users/u1/articles:count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 42})))
            .mount(&server)
            .await;

        assert_eq!(store(&server).await.count("users/u1/articles").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn unauthorized_and_server_errors_are_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/documents/users/u1/articles:count"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/documents:commit"))
            .respond_with(ResponseTemplate::new(503).set_body_string("quota"))
            .mount(&server)
            .await;

        let store = store(&server).await;
        let err = store.count("users/u1/articles").await.unwrap_err();
        assert!(matches!(err, AppError::NotAuthenticated));

        let err = store
            .commit(vec![Write::Delete { path: "users/u1/x".into() }])
            .await
            .unwrap_err();
        match err {
            AppError::RemoteStore(msg) => assert!(msg.contains("quota")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn document_url_encodes_each_segment() {
        let store = HttpDocumentStore::new("https://db.example/v1", None, Duration::from_secs(1)).unwrap();
        assert_eq!(
            store.document_url("users/u 1/articles/a%2Fb"),
            "https://db.example/v1/documents/users/u%201/articles/a%252Fb"
        );
    }
}
