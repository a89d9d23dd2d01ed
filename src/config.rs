// 该文件是 Huishou （回收） 项目的一部分。
// src/config.rs - 运行配置
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

use std::time::Duration;

use url::Url;

use crate::{
  FromUrl,
  analysis::ProgressConfig,
  client::{Endpoint, EndpointError},
  render::TypingConfig,
};

pub const DEFAULT_DETECT_URL: &str = "http://localhost:5001/detect";
pub const DEFAULT_DRONE_URL: &str = "http://localhost:8000/analyze-drone";
pub const DEFAULT_CHAT_URL: &str = "http://localhost:8000/chat";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// 三个页面各自的后端地址与节奏参数
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
  pub detect_endpoint: Endpoint,
  pub drone_endpoint: Endpoint,
  pub chat_endpoint: Endpoint,
  pub typing: TypingConfig,
  pub progress: ProgressConfig,
  pub request_timeout: Duration,
}

impl Settings {
  /// 本机默认后端
  pub fn local() -> Result<Self, EndpointError> {
    Ok(Self {
      detect_endpoint: Endpoint::parse(DEFAULT_DETECT_URL)?,
      drone_endpoint: Endpoint::parse(DEFAULT_DRONE_URL)?,
      chat_endpoint: Endpoint::parse(DEFAULT_CHAT_URL)?,
      typing: TypingConfig::default(),
      progress: ProgressConfig::default(),
      request_timeout: DEFAULT_REQUEST_TIMEOUT,
    })
  }

  pub fn with_endpoints(mut self, detect: &Url, drone: &Url, chat: &Url) -> Result<Self, EndpointError> {
    self.detect_endpoint = Endpoint::from_url(detect)?;
    self.drone_endpoint = Endpoint::from_url(drone)?;
    self.chat_endpoint = Endpoint::from_url(chat)?;
    Ok(self)
  }

  pub fn with_typing_speed(mut self, base_interval: Duration) -> Self {
    self.typing.base_interval = base_interval;
    self
  }

  pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
    self.request_timeout = timeout;
    self
  }
}
