// 该文件是 Huishou （回收） 项目的一部分。
// src/chat.rs - 聊天会话
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

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
  client::{Endpoint, Transport},
  normalize::INVALID_RESPONSE,
  render::{RenderFrame, RenderOutcome, Typewriter, TypingConfig},
};

pub const WELCOME_MESSAGE: &str = "Hello! I am your Waste Assistant. How can I help you today?";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
  /// 显示中的内容，显示过程中逐步增长
  pub text: String,
  pub is_user: bool,
  pub timestamp: DateTime<Utc>,
  pub is_rendering: bool,
  /// 显示完成后的最终格式化文本
  #[serde(skip)]
  formatted: Option<String>,
}

impl ChatMessage {
  pub fn user(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      is_user: true,
      timestamp: Utc::now(),
      is_rendering: false,
      formatted: None,
    }
  }

  pub fn assistant(text: impl Into<String>) -> Self {
    Self {
      text: text.into(),
      is_user: false,
      timestamp: Utc::now(),
      is_rendering: false,
      formatted: None,
    }
  }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ChatError {
  #[error("消息 {0} 正在显示中")]
  RenderInProgress(usize),
}

/// 消息日志与唯一的请求进行中标记
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
  pub messages: Vec<ChatMessage>,
  pub in_flight: bool,
}

impl Default for ChatSession {
  fn default() -> Self {
    Self::new()
  }
}

impl ChatSession {
  pub fn new() -> Self {
    Self {
      messages: vec![ChatMessage::assistant(WELCOME_MESSAGE)],
      in_flight: false,
    }
  }

  pub fn push(&mut self, message: ChatMessage) -> usize {
    self.messages.push(message);
    self.messages.len() - 1
  }

  /// 追加一条待显示的回复。同一时间只允许一条消息处于显示中。
  pub fn begin_rendering(&mut self, formatted: &str) -> Result<usize, ChatError> {
    if let Some(index) = self.rendering_index() {
      return Err(ChatError::RenderInProgress(index));
    }
    let mut message = ChatMessage::assistant(String::new());
    message.is_rendering = true;
    message.formatted = Some(formatted.to_string());
    Ok(self.push(message))
  }

  /// 返回消息是否发生变化
  pub fn apply_frame(&mut self, index: usize, frame: RenderFrame<'_>) -> bool {
    let Some(message) = self.messages.get_mut(index) else {
      return false;
    };
    if !message.is_rendering {
      return false;
    }
    match frame {
      RenderFrame::Partial(text) => message.text = text.to_string(),
      RenderFrame::Complete(markup) => {
        message.text = markup.to_string();
        message.formatted = None;
        message.is_rendering = false;
      }
    }
    true
  }

  /// 直接跳到最终文本
  pub fn finish_rendering(&mut self, index: usize) -> bool {
    let Some(message) = self.messages.get_mut(index) else {
      return false;
    };
    if !message.is_rendering {
      return false;
    }
    if let Some(formatted) = message.formatted.take() {
      message.text = formatted;
    }
    message.is_rendering = false;
    true
  }

  pub fn rendering_index(&self) -> Option<usize> {
    self.messages.iter().position(|m| m.is_rendering)
  }

  pub fn is_busy(&self) -> bool {
    self.in_flight || self.rendering_index().is_some()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatOutcome {
  /// 空白输入或会话忙
  Ignored,
  Answered(RenderOutcome),
  /// 错误已作为一条助手消息追加
  Failed,
  /// 请求还未返回就被取消
  Cancelled,
}

pub struct ChatController<T> {
  endpoint: Endpoint,
  transport: T,
  typing: TypingConfig,
  session: Arc<watch::Sender<ChatSession>>,
}

impl<T: Clone> Clone for ChatController<T> {
  fn clone(&self) -> Self {
    Self {
      endpoint: self.endpoint.clone(),
      transport: self.transport.clone(),
      typing: self.typing,
      session: self.session.clone(),
    }
  }
}

impl<T: Transport> ChatController<T> {
  pub fn new(endpoint: Endpoint, transport: T, typing: TypingConfig) -> Self {
    let (session, _) = watch::channel(ChatSession::new());
    Self {
      endpoint,
      transport,
      typing,
      session: Arc::new(session),
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<ChatSession> {
    self.session.subscribe()
  }

  pub fn snapshot(&self) -> ChatSession {
    self.session.borrow().clone()
  }

  pub async fn send(&self, prompt: &str, cancel: &CancellationToken) -> ChatOutcome {
    if prompt.trim().is_empty() {
      return ChatOutcome::Ignored;
    }
    let accepted = self.session.send_if_modified(|session| {
      if session.is_busy() {
        return false;
      }
      session.push(ChatMessage::user(prompt));
      session.in_flight = true;
      true
    });
    if !accepted {
      debug!("会话忙，忽略输入");
      return ChatOutcome::Ignored;
    }

    info!("发送问题到 {}", self.endpoint);
    let body = json!({ "prompt": prompt });
    let response = tokio::select! {
      biased;
      _ = cancel.cancelled() => {
        warn!("聊天请求被取消");
        self.session.send_modify(|session| session.in_flight = false);
        return ChatOutcome::Cancelled;
      }
      response = self.transport.post_json(&self.endpoint, &body) => response,
    };

    let reply = match response {
      Ok(payload) => match payload.get("response").and_then(Value::as_str) {
        Some(reply) => reply.to_string(),
        None => {
          warn!("回复中缺少 response 字段");
          self.fail_with(INVALID_RESPONSE);
          return ChatOutcome::Failed;
        }
      },
      Err(err) => {
        warn!("聊天请求失败: {}", err);
        self.fail_with(err.user_message());
        return ChatOutcome::Failed;
      }
    };

    let typewriter = Typewriter::new(&reply, &self.typing);
    let mut started = None;
    self.session.send_modify(|session| {
      session.in_flight = false;
      started = Some(session.begin_rendering(typewriter.markup()));
    });
    let index = match started {
      Some(Ok(index)) => index,
      other => {
        warn!("无法开始显示回复: {:?}", other);
        return ChatOutcome::Failed;
      }
    };

    debug!(
      "开始显示回复，共 {} 个字符，间隔 {:?}",
      typewriter.plain().chars().count(),
      typewriter.interval()
    );
    let outcome = typewriter
      .play(cancel, |frame| {
        self
          .session
          .send_if_modified(|session| session.apply_frame(index, frame));
      })
      .await;
    if outcome == RenderOutcome::Cancelled {
      warn!("回复显示被取消");
    }
    ChatOutcome::Answered(outcome)
  }

  /// 把正在显示（或显示被取消）的回复直接补全
  pub fn complete_rendering(&self) -> bool {
    self
      .session
      .send_if_modified(|session| match session.rendering_index() {
        Some(index) => session.finish_rendering(index),
        None => false,
      })
  }

  fn fail_with(&self, message: &str) {
    self.session.send_modify(|session| {
      session.in_flight = false;
      session.push(ChatMessage::assistant(message));
    });
  }
}
