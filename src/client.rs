// 该文件是 Huishou （回收） 项目的一部分。
// src/client.rs - 后端 HTTP 请求
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Huishou contributors

use std::{future::Future, time::Duration};

use reqwest::multipart::{Form, Part};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{FromUrl, input::ImageUpload};

pub const UNREACHABLE_MESSAGE: &str =
  "Unable to connect to the server. Please check if the server is running and try again.";
pub const VALIDATION_MESSAGE: &str =
  "Invalid input. Please make sure your question is clear and try again.";
pub const SERVER_MESSAGE: &str = "The server is having trouble processing your request. This might be due to network issues or server problems. Please try again in a few moments.";
pub const GENERIC_MESSAGE: &str = "An unexpected error occurred. Please try again.";

pub const ANALYSIS_UNREACHABLE_MESSAGE: &str =
  "Cannot connect to the server. Please check if the backend service is running.";
pub const ANALYSIS_VALIDATION_MESSAGE: &str =
  "The image could not be processed. Please check the file and try again.";
pub const ANALYSIS_SERVER_MESSAGE: &str =
  "The server is having trouble analyzing the image. Please try again in a few moments.";
pub const ANALYSIS_GENERIC_MESSAGE: &str = "Error analyzing image. Please try again.";

/// 请求失败分类，状态码 0 表示后端不可达
#[derive(Error, Debug)]
pub enum RequestError {
  #[error("后端不可达: {0}")]
  Unreachable(String),
  #[error("输入校验失败 (422)")]
  Validation { detail: Option<String> },
  #[error("服务器错误 (500)")]
  Server { detail: Option<String> },
  #[error("请求失败，状态码 {status}")]
  Status { status: u16, detail: Option<String> },
  #[error("上传内容无效: {0}")]
  InvalidUpload(String),
}

impl From<reqwest::Error> for RequestError {
  fn from(err: reqwest::Error) -> Self {
    RequestError::Unreachable(err.to_string())
  }
}

impl RequestError {
  pub fn from_status(status: u16, detail: Option<String>) -> Self {
    match status {
      0 => RequestError::Unreachable(detail.unwrap_or_default()),
      422 => RequestError::Validation { detail },
      500 => RequestError::Server { detail },
      status => RequestError::Status { status, detail },
    }
  }

  pub fn status(&self) -> u16 {
    match self {
      RequestError::Unreachable(_) | RequestError::InvalidUpload(_) => 0,
      RequestError::Validation { .. } => 422,
      RequestError::Server { .. } => 500,
      RequestError::Status { status, .. } => *status,
    }
  }

  /// 服务器在错误响应体里给出的 `detail`
  pub fn detail(&self) -> Option<&str> {
    match self {
      RequestError::Validation { detail }
      | RequestError::Server { detail }
      | RequestError::Status { detail, .. } => detail.as_deref(),
      RequestError::Unreachable(_) | RequestError::InvalidUpload(_) => None,
    }
  }

  /// 聊天页面展示给用户的提示
  pub fn user_message(&self) -> &'static str {
    match self {
      RequestError::Unreachable(_) => UNREACHABLE_MESSAGE,
      RequestError::Validation { .. } => VALIDATION_MESSAGE,
      RequestError::Server { .. } => SERVER_MESSAGE,
      RequestError::Status { .. } | RequestError::InvalidUpload(_) => GENERIC_MESSAGE,
    }
  }

  /// 图片分析页面的提示：优先使用服务器给出的 `detail`
  pub fn analysis_message(&self) -> String {
    if let Some(detail) = self.detail() {
      return detail.to_string();
    }
    match self {
      RequestError::Unreachable(_) => ANALYSIS_UNREACHABLE_MESSAGE.to_string(),
      RequestError::Validation { .. } => ANALYSIS_VALIDATION_MESSAGE.to_string(),
      RequestError::Server { .. } => ANALYSIS_SERVER_MESSAGE.to_string(),
      RequestError::Status { .. } | RequestError::InvalidUpload(_) => {
        ANALYSIS_GENERIC_MESSAGE.to_string()
      }
    }
  }
}

#[derive(Error, Debug)]
pub enum EndpointError {
  #[error("地址解析失败: {0}")]
  Parse(#[from] url::ParseError),
  #[error("不支持的地址方案: {0}")]
  UnsupportedScheme(String),
}

/// 后端接口地址，只接受 http/https
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
  url: Url,
}

impl FromUrl for Endpoint {
  type Error = EndpointError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      "http" | "https" => Ok(Endpoint { url: url.clone() }),
      other => Err(EndpointError::UnsupportedScheme(other.to_string())),
    }
  }
}

impl Endpoint {
  pub fn parse(address: &str) -> Result<Self, EndpointError> {
    Self::from_url(&Url::parse(address)?)
  }

  pub fn url(&self) -> &Url {
    &self.url
  }
}

impl std::fmt::Display for Endpoint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.url)
  }
}

/// 发送请求、返回结构化响应或错误的能力
pub trait Transport {
  fn post_json(
    &self,
    endpoint: &Endpoint,
    body: &Value,
  ) -> impl Future<Output = Result<Value, RequestError>>;

  fn post_image(
    &self,
    endpoint: &Endpoint,
    field: &str,
    upload: &ImageUpload,
  ) -> impl Future<Output = Result<Value, RequestError>>;
}

/// 基于 reqwest 的实现
#[derive(Debug, Clone)]
pub struct HttpTransport {
  client: reqwest::Client,
}

impl HttpTransport {
  pub fn new(timeout: Duration) -> Result<Self, RequestError> {
    let client = reqwest::Client::builder().timeout(timeout).build()?;
    Ok(Self { client })
  }
}

impl Transport for HttpTransport {
  async fn post_json(&self, endpoint: &Endpoint, body: &Value) -> Result<Value, RequestError> {
    debug!("POST {} (json)", endpoint);
    let response = self
      .client
      .post(endpoint.url().clone())
      .json(body)
      .send()
      .await?;
    read_payload(response).await
  }

  async fn post_image(
    &self,
    endpoint: &Endpoint,
    field: &str,
    upload: &ImageUpload,
  ) -> Result<Value, RequestError> {
    debug!(
      "POST {} (multipart `{}`: {}, {} 字节)",
      endpoint,
      field,
      upload.file_name(),
      upload.bytes().len()
    );
    let part = Part::bytes(upload.bytes().to_vec())
      .file_name(upload.file_name().to_string())
      .mime_str(upload.mime_type())
      .map_err(|e| RequestError::InvalidUpload(e.to_string()))?;
    let form = Form::new().part(field.to_string(), part);
    let response = self
      .client
      .post(endpoint.url().clone())
      .multipart(form)
      .send()
      .await?;
    read_payload(response).await
  }
}

/// 非 JSON 的响应体按字符串载荷返回，交给调用方判定
async fn read_payload(response: reqwest::Response) -> Result<Value, RequestError> {
  let status = response.status();
  let body = response.text().await?;
  let payload = serde_json::from_str(&body).unwrap_or(Value::String(body));

  if status.is_success() {
    Ok(payload)
  } else {
    warn!("后端返回错误状态: {}", status);
    let detail = payload
      .get("detail")
      .and_then(Value::as_str)
      .map(str::to_string);
    Err(RequestError::from_status(status.as_u16(), detail))
  }
}
