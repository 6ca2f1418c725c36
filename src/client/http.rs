//! Transport between the session manager and the auth endpoints.

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::error::ClientError;
use crate::api::dto::{AuthResponse, LoginRequest, RegisterRequest, VerifyResponse};

/// The auth endpoints as seen by a client.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ClientError>;
    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ClientError>;
    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ClientError>;
    async fn verify(&self, access_token: &str) -> Result<VerifyResponse, ClientError>;
    async fn logout(&self, access_token: &str) -> Result<(), ClientError>;
}

#[derive(Deserialize)]
struct WireError {
    error: String,
    #[serde(default)]
    message: String,
}

/// [`AuthApi`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: reqwest::Client,
    base: Url,
}

impl HttpAuthApi {
    /// `base_url` is the prefix the auth routes are mounted under,
    /// e.g. `http://localhost:8080/api`.
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, ClientError> {
        let mut base = Url::parse(base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(Self { client, base })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        Ok(self.base.join(path)?)
    }

    async fn send(request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let rejection = match serde_json::from_str::<WireError>(&body) {
            Ok(wire) => ClientError::Rejected {
                status: status.as_u16(),
                code: wire.error,
                message: wire.message,
            },
            Err(_) => ClientError::Rejected {
                status: status.as_u16(),
                code: status.canonical_reason().unwrap_or("Unknown").to_string(),
                message: body,
            },
        };
        Err(rejection)
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ClientError> {
        Ok(Self::send(request).await?.json::<T>().await?)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ClientError> {
        Self::send_json(self.client.post(self.endpoint("login")?).json(request)).await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ClientError> {
        Self::send_json(self.client.post(self.endpoint("register")?).json(request)).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthResponse, ClientError> {
        Self::send_json(
            self.client
                .post(self.endpoint("refresh")?)
                .bearer_auth(refresh_token),
        )
        .await
    }

    async fn verify(&self, access_token: &str) -> Result<VerifyResponse, ClientError> {
        Self::send_json(
            self.client
                .post(self.endpoint("verify")?)
                .bearer_auth(access_token),
        )
        .await
    }

    async fn logout(&self, access_token: &str) -> Result<(), ClientError> {
        Self::send(
            self.client
                .post(self.endpoint("logout")?)
                .bearer_auth(access_token),
        )
        .await?;
        Ok(())
    }
}
