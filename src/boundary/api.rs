//! HTTP API 边界
//!
//! 封装所有与被测系统 REST 接口的交互

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::boundary::{
    recent_answers_from_json, snapshot_from_json, LoginResponse, QaBoundary, SubmitResponse,
};
use crate::config::{BoundaryKind, Config};
use crate::error::{HarnessError, HarnessResult};
use crate::models::{
    AccessEvidence, Actor, AuthFailure, AuthFailureReason, CapabilityToken, Credential, JobId,
    JobResult, LoginProfile, ProtectedResource, QuestionPayload, ResourceRequest, Role,
    StatusSnapshot, UploadOutcome,
};
use crate::selectors::{read_json, read_json_text, Element};
use crate::utils::logging::truncate_text;

/// 一次 HTTP 调用的结果
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: JsonValue,
    pub location: Option<String>,
    pub raw: String,
}

impl ApiResponse {
    /// 边界返回的错误消息；没有结构化字段时退回原始响应体
    pub fn message(&self) -> String {
        read_json_text(&self.body, Element::ErrorMessage)
            .unwrap_or_else(|| truncate_text(self.raw.trim(), 200))
    }
}

/// API 边界
pub struct ApiBoundary {
    client: Client,
    base_url: String,
    retries: u32,
    retry_delay: Duration,
}

impl ApiBoundary {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            retries: config.transport_retries,
            retry_delay: config.transport_retry_delay(),
        }
    }

    /// 构建共享的 HTTP 客户端
    ///
    /// 不跟随重定向：重定向到拒绝页本身就是访问判定的信号
    pub fn build_client(config: &Config) -> HarnessResult<Client> {
        Client::builder()
            .timeout(config.request_timeout())
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| HarnessError::Config(format!("无法创建 HTTP 客户端: {}", e)))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(builder: RequestBuilder, actor: &Actor) -> RequestBuilder {
        match actor.token() {
            Some(CapabilityToken::Bearer(token)) => builder.bearer_auth(token),
            Some(CapabilityToken::Cookie(cookie)) => builder.header("Cookie", cookie.as_str()),
            None => builder,
        }
    }

    /// 发送请求
    ///
    /// 连接失败最多重试 `retries` 次；请求超时不重试，直接放弃
    async fn send<F>(&self, endpoint: &str, build: F) -> HarnessResult<ApiResponse>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let max_attempts = self.retries + 1;
        let mut attempt = 0;

        loop {
            attempt += 1;
            match build().send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let location = response
                        .headers()
                        .get(reqwest::header::LOCATION)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    let raw = response
                        .text()
                        .await
                        .map_err(|e| HarnessError::transport(endpoint, attempt, e))?;
                    let body = if raw.trim().is_empty() {
                        JsonValue::Null
                    } else {
                        serde_json::from_str(&raw).unwrap_or(JsonValue::Null)
                    };
                    debug!("{} -> HTTP {} {}", endpoint, status, truncate_text(&raw, 200));
                    return Ok(ApiResponse {
                        status,
                        body,
                        location,
                        raw,
                    });
                }
                Err(e) => {
                    let err = HarnessError::transport(endpoint, attempt, e);
                    if !err.is_retryable() || attempt >= max_attempts {
                        return Err(err);
                    }
                    warn!(
                        "连接失败 {} (尝试 {}/{}), 等待 {}ms 后重试: {}",
                        endpoint,
                        attempt,
                        max_attempts,
                        self.retry_delay.as_millis(),
                        err
                    );
                    sleep(self.retry_delay).await;
                }
            }
        }
    }

    fn auth_error(actor: &Actor, response: &ApiResponse) -> HarnessError {
        let reason = if actor.is_authenticated() {
            AuthFailureReason::Unauthorized
        } else {
            AuthFailureReason::MissingToken
        };
        HarnessError::Auth(AuthFailure {
            reason,
            status: Some(response.status),
            message: response.message(),
        })
    }

    fn unexpected(endpoint: &str, response: &ApiResponse) -> HarnessError {
        HarnessError::protocol(
            endpoint,
            format!("意外的响应 HTTP {}: {}", response.status, response.message()),
        )
    }

    /// 把提交响应映射为受理或拒绝；JSON 和原始请求体两种提交共用
    fn submit_response(
        endpoint: &str,
        actor: &Actor,
        response: &ApiResponse,
    ) -> HarnessResult<SubmitResponse> {
        match response.status {
            200 | 201 | 202 => {
                let job_id = read_json_text(&response.body, Element::JobId).ok_or_else(|| {
                    HarnessError::protocol("jobId", format!("提交响应中没有 jobId: {}", response.raw))
                })?;
                let status = read_json_text(&response.body, Element::JobStatus).ok_or_else(|| {
                    HarnessError::protocol("status", format!("提交响应中没有 status: {}", response.raw))
                })?;
                Ok(SubmitResponse::Accepted {
                    job_id,
                    status,
                    submitted_at: read_json_text(&response.body, Element::SubmittedAt),
                })
            }
            401 | 403 => Err(Self::auth_error(actor, response)),
            400 | 413 | 422 => Ok(SubmitResponse::Rejected {
                status: Some(response.status),
                field: read_json_text(&response.body, Element::ErrorField),
                message: response.message(),
            }),
            _ => Err(Self::unexpected(endpoint, response)),
        }
    }

    async fn get_job(&self, actor: &Actor, raw_id: &str) -> HarnessResult<StatusSnapshot> {
        let endpoint = format!("GET /api/v1/qa/{}", raw_id);
        let url = self.url(&format!("/api/v1/qa/{}", raw_id));
        let response = self
            .send(&endpoint, || Self::authorize(self.client.get(&url), actor))
            .await?;

        match response.status {
            200 => snapshot_from_json(&response.body),
            400 => Err(HarnessError::protocol("jobId", response.message())),
            401 | 403 => Err(Self::auth_error(actor, &response)),
            404 => Err(HarnessError::JobNotFound {
                job_id: raw_id.to_string(),
            }),
            _ => Err(Self::unexpected(&endpoint, &response)),
        }
    }

    fn upload_form(file_name: &str, mime: &str, content: &str) -> HarnessResult<Form> {
        let part = Part::text(content.to_string())
            .file_name(file_name.to_string())
            .mime_str(mime)
            .map_err(|e| HarnessError::Config(format!("无效的 MIME 类型 {}: {}", mime, e)))?;
        Ok(Form::new().part("file", part))
    }

    async fn post_upload(
        &self,
        actor: &Actor,
        path: &str,
        file_name: &str,
        mime: &str,
        content: &str,
    ) -> HarnessResult<ApiResponse> {
        // 先校验一次 MIME；表单不可复用，重试时在闭包里重新构建
        Self::upload_form(file_name, mime, content)?;
        let url = self.url(path);
        let endpoint = format!("POST {}", path);
        self.send(&endpoint, || {
            let builder = Self::authorize(self.client.post(&url), actor);
            match Self::upload_form(file_name, mime, content) {
                Ok(form) => builder.multipart(form),
                Err(_) => builder,
            }
        })
        .await
    }
}

#[async_trait]
impl QaBoundary for ApiBoundary {
    fn kind(&self) -> BoundaryKind {
        BoundaryKind::Api
    }

    async fn login(&self, credential: &Credential) -> HarnessResult<LoginResponse> {
        let endpoint = "POST /api/v1/auth/login";
        let url = self.url("/api/v1/auth/login");
        let body = json!({
            "email": credential.email,
            "password": credential.password,
        });
        let response = self
            .send(endpoint, || self.client.post(&url).json(&body))
            .await?;

        match response.status {
            200 => {
                let token = read_json_text(&response.body, Element::Token).ok_or_else(|| {
                    HarnessError::protocol("token", "登录成功但响应中没有 token")
                })?;
                let role = read_json_text(&response.body, Element::UserRole)
                    .and_then(|r| Role::from_str(&r));
                let profile = LoginProfile {
                    user_id: read_json_text(&response.body, Element::UserId),
                    email: read_json_text(&response.body, Element::UserEmail),
                    expires_in: read_json(&response.body, Element::ExpiresIn).and_then(|v| v.as_u64()),
                };
                Ok(LoginResponse::Granted {
                    token: CapabilityToken::Bearer(token),
                    role,
                    profile,
                })
            }
            400 | 401 | 403 => Ok(LoginResponse::Rejected {
                status: Some(response.status),
                message: response.message(),
            }),
            _ => Err(Self::unexpected(endpoint, &response)),
        }
    }

    async fn logout(&self, token: &CapabilityToken) -> HarnessResult<()> {
        let endpoint = "POST /api/v1/auth/logout";
        let url = self.url("/api/v1/auth/logout");
        let response = self
            .send(endpoint, || {
                let builder = self.client.post(&url);
                match token {
                    CapabilityToken::Bearer(t) => builder.bearer_auth(t),
                    CapabilityToken::Cookie(c) => builder.header("Cookie", c.as_str()),
                }
            })
            .await?;

        match response.status {
            200..=299 => Ok(()),
            401 => {
                debug!("令牌已失效，视为已登出");
                Ok(())
            }
            _ => Err(Self::unexpected(endpoint, &response)),
        }
    }

    async fn submit(&self, actor: &Actor, payload: &QuestionPayload) -> HarnessResult<SubmitResponse> {
        let endpoint = "POST /api/v1/qa";
        let url = self.url("/api/v1/qa");
        let response = self
            .send(endpoint, || {
                Self::authorize(self.client.post(&url), actor).json(payload)
            })
            .await?;

        Self::submit_response(endpoint, actor, &response)
    }

    async fn poll_status(&self, actor: &Actor, job_id: &JobId) -> HarnessResult<StatusSnapshot> {
        self.get_job(actor, job_id.as_str()).await
    }

    async fn fetch_result(&self, actor: &Actor, job_id: &JobId) -> HarnessResult<StatusSnapshot> {
        // 结果和状态在同一个资源上
        self.get_job(actor, job_id.as_str()).await
    }

    async fn request_resource(
        &self,
        actor: &Actor,
        resource: &ProtectedResource,
    ) -> HarnessResult<AccessEvidence> {
        let response = match &resource.request {
            ResourceRequest::Get => {
                let url = self.url(&resource.api_path);
                let endpoint = format!("GET {}", resource.api_path);
                self.send(&endpoint, || Self::authorize(self.client.get(&url), actor))
                    .await?
            }
            ResourceRequest::Upload {
                file_name,
                mime,
                content,
            } => {
                self.post_upload(actor, &resource.api_path, file_name, mime, content)
                    .await?
            }
        };

        Ok(AccessEvidence::Http {
            status: response.status,
            location: response.location.clone(),
            body_excerpt: truncate_text(response.raw.trim(), 120),
        })
    }

    async fn upload_companies(
        &self,
        actor: &Actor,
        file_name: &str,
        mime: &str,
        content: &str,
    ) -> HarnessResult<UploadOutcome> {
        let path = "/api/v1/admin/companies/upload";
        let response = self
            .post_upload(actor, path, file_name, mime, content)
            .await?;

        match response.status {
            200 | 201 => {
                let processed_rows = read_json(&response.body, Element::ProcessedRows)
                    .and_then(|v| v.as_u64())
                    .ok_or_else(|| {
                        HarnessError::protocol("processedRows", format!("上传响应缺少 processedRows: {}", response.raw))
                    })?;
                let errors = read_json(&response.body, Element::UploadErrors)
                    .and_then(|v| v.as_array())
                    .map(|items| {
                        items
                            .iter()
                            .map(|e| match e.as_str() {
                                Some(s) => s.to_string(),
                                None => e.to_string(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(UploadOutcome::Accepted {
                    processed_rows,
                    errors,
                })
            }
            415 => Ok(UploadOutcome::UnsupportedMediaType {
                message: response.message(),
            }),
            401 | 403 => Ok(UploadOutcome::Forbidden {
                status: response.status,
                message: response.message(),
            }),
            _ => Err(Self::unexpected(path, &response)),
        }
    }

    async fn lookup_raw(&self, actor: &Actor, raw_id: &str) -> HarnessResult<StatusSnapshot> {
        self.get_job(actor, raw_id).await
    }

    async fn recent_answers(&self, actor: &Actor) -> HarnessResult<Vec<JobResult>> {
        let endpoint = "GET /api/v1/qa";
        let url = self.url("/api/v1/qa");
        let response = self
            .send(endpoint, || Self::authorize(self.client.get(&url), actor))
            .await?;

        match response.status {
            200 => recent_answers_from_json(&response.body),
            401 | 403 => Err(Self::auth_error(actor, &response)),
            _ => Err(Self::unexpected(endpoint, &response)),
        }
    }

    async fn submit_raw(&self, actor: &Actor, body: &str) -> HarnessResult<SubmitResponse> {
        let endpoint = "POST /api/v1/qa (raw)";
        let url = self.url("/api/v1/qa");
        let response = self
            .send(endpoint, || {
                Self::authorize(self.client.post(&url), actor)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body.to_string())
            })
            .await?;

        Self::submit_response(endpoint, actor, &response)
    }
}
