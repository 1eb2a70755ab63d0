use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::attendance::AttendanceFilter;
use crate::error::ClientError;
use crate::submit::Submitter;
use crate::types::{
    AttendanceRecord, Credentials, Registration, ScanReply, ScanRequest, Student, StudentForm,
    UserProfile,
};

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// HTTP client for the attendance backend.
///
/// Any non-2xx status is a failure; the response body is kept verbatim as the
/// error message since the backend answers errors in plain text.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /api/scan` with `{"qr": ...}`.
    pub async fn scan(&self, qr: &str) -> Result<ScanReply, ClientError> {
        let body = ScanRequest { qr: qr.to_string() };
        let resp = self.send(self.request(Method::POST, "/api/scan").json(&body)).await?;
        read_json(resp).await
    }

    pub async fn list_students(&self) -> Result<Vec<Student>, ClientError> {
        let resp = self.send(self.request(Method::GET, "/api/students")).await?;
        read_json(resp).await
    }

    pub async fn create_student(&self, form: &StudentForm) -> Result<Student, ClientError> {
        let resp = self
            .send(self.request(Method::POST, "/api/students").json(form))
            .await?;
        read_json(resp).await
    }

    pub async fn update_student(&self, id: u64, form: &StudentForm) -> Result<Student, ClientError> {
        let path = format!("/api/students/{id}");
        let resp = self.send(self.request(Method::PUT, &path).json(form)).await?;
        read_json(resp).await
    }

    /// The backend refuses to delete students that still have attendance rows.
    pub async fn delete_student(&self, id: u64) -> Result<(), ClientError> {
        let path = format!("/api/students/{id}");
        self.send(self.request(Method::DELETE, &path)).await?;
        Ok(())
    }

    /// `GET /api/attendances`, with `class` and `date` only when set.
    pub async fn list_attendance(
        &self,
        filter: &AttendanceFilter,
    ) -> Result<Vec<AttendanceRecord>, ClientError> {
        let req = self
            .request(Method::GET, "/api/attendances")
            .query(&filter.query_pairs());
        let resp = self.send(req).await?;
        read_json(resp).await
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<UserProfile, ClientError> {
        let resp = self
            .send(self.request(Method::POST, "/api/login").json(credentials))
            .await?;
        read_json(resp).await
    }

    pub async fn register(&self, registration: &Registration) -> Result<(), ClientError> {
        self.send(self.request(Method::POST, "/api/register").json(registration))
            .await?;
        Ok(())
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, format!("{}{}", self.base_url, path))
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, ClientError> {
        let resp = req.send().await?;
        let status = resp.status();
        debug!(url = %resp.url(), status = status.as_u16(), "backend response");
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp
            .text()
            .await
            .map(|t| t.trim().to_string())
            .unwrap_or_default();
        let message = if message.is_empty() {
            status.to_string()
        } else {
            message
        };
        Err(ClientError::Status {
            status: status.as_u16(),
            message,
        })
    }
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, ClientError> {
    Ok(resp.json::<T>().await?)
}

#[async_trait]
impl Submitter for BackendClient {
    async fn submit(&self, payload: &str) -> Result<ScanReply, ClientError> {
        self.scan(payload).await
    }
}
