use reqwest::{Client, Response};

use crate::config::basic_auth_credentials;
use crate::error::TransportError;

/// The authenticated HTTP half of `LoopClient`: `get`/`put`/`post`/`delete` against
/// `{host}/api{path}`, all Basic-authed with credentials re-read from the environment on every
/// call.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    host: String,
}

impl HttpClient {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            host: host.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.host.trim_end_matches('/'), path)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, TransportError> {
        let (user, pass) = basic_auth_credentials().ok_or(TransportError::MissingCredentials)?;
        Ok(builder.basic_auth(user, Some(pass)))
    }

    async fn finish(resp: reqwest::Result<Response>, path: &str) -> Result<Response, TransportError> {
        let resp = resp?;
        if resp.status().is_success() {
            Ok(resp)
        } else {
            Err(TransportError::BadStatus {
                status: resp.status(),
                path: path.to_string(),
            })
        }
    }

    pub async fn get(&self, path: &str) -> Result<Response, TransportError> {
        let req = self.authed(self.client.get(self.url(path)))?;
        Self::finish(req.send().await, path).await
    }

    pub async fn delete(&self, path: &str) -> Result<Response, TransportError> {
        let req = self.authed(self.client.delete(self.url(path)))?;
        Self::finish(req.send().await, path).await
    }

    pub async fn post_json<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<Response, TransportError> {
        let req = self.authed(self.client.post(self.url(path)))?.json(body);
        Self::finish(req.send().await, path).await
    }

    pub async fn put_multipart(
        &self,
        path: &str,
        form: reqwest::multipart::Form,
    ) -> Result<Response, TransportError> {
        let req = self.authed(self.client.put(self.url(path)))?.multipart(form);
        Self::finish(req.send().await, path).await
    }

    pub async fn get_bytes(&self, path: &str) -> Result<bytes::Bytes, TransportError> {
        Ok(self.get(path).await?.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn set_credentials() {
        // SAFETY: serialized via `serial_test` so no other test races these env mutations.
        unsafe {
            std::env::set_var("LOOP_USERNAME", "http-test-user");
            std::env::set_var("LOOP_PASSWORD", "http-test-pass");
        }
    }

    #[tokio::test]
    #[serial]
    async fn get_returns_the_response_body_on_success() {
        set_credentials();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/org/projects/proj/data"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = HttpClient::new(server.uri());
        let body = client
            .get("/org/projects/proj/data")
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    #[serial]
    async fn get_turns_a_non_2xx_status_into_bad_status() {
        set_credentials();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/org/projects/proj/data"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpClient::new(server.uri());
        let err = client.get("/org/projects/proj/data").await.unwrap_err();
        assert!(matches!(err, TransportError::BadStatus { .. }));
    }
}
