// 该文件是 Huishou （回收） 项目的一部分。
// src/output.rs - 输出定义
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

use std::{
  io::Write,
  sync::{Mutex, PoisonError},
};

use serde::Serialize;
use thiserror::Error;

use crate::{
  analysis::{AnalysisRun, RunStatus},
  chat::ChatMessage,
  client::ANALYSIS_GENERIC_MESSAGE,
  model::{CanonicalDetection, DroneDetection, format_confidence},
  render::strip_markup,
};

/// 把控制器暴露的状态交给展示层
pub trait Render<T: ?Sized> {
  type Error;
  fn render_result(&self, result: &T) -> Result<(), Self::Error>;
}

impl<T: ?Sized, R: Render<T>> Render<T> for &R {
  type Error = R::Error;

  fn render_result(&self, result: &T) -> Result<(), Self::Error> {
    (**self).render_result(result)
  }
}

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("写入输出失败: {0}")]
  Io(#[from] std::io::Error),
  #[error("JSON 序列化失败: {0}")]
  Json(#[from] serde_json::Error),
  #[error("输出锁已损坏")]
  Poisoned,
}

impl<T> From<PoisonError<T>> for OutputError {
  fn from(_: PoisonError<T>) -> Self {
    OutputError::Poisoned
  }
}

/// 单条分析结果在终端中的一行
pub trait ConsoleLine {
  fn console_line(&self) -> String;
}

impl ConsoleLine for CanonicalDetection {
  fn console_line(&self) -> String {
    let tier = self.tier();
    let mut line = format!(
      "{} {} [{} {}] volume={}",
      self.label,
      format_confidence(self.confidence),
      tier.as_str(),
      tier.color_hex(),
      self.volume_estimate
    );
    if !self.bounding_box.is_empty() {
      line.push_str(&format!(" box={:?}", self.bounding_box));
    }
    for (name, value) in [
      ("material", &self.material),
      ("state", &self.state),
      ("contamination", &self.contamination),
    ] {
      if let Some(value) = value {
        line.push_str(&format!(" {}={}", name, value));
      }
    }
    line
  }
}

impl ConsoleLine for DroneDetection {
  fn console_line(&self) -> String {
    let tier = self.tier();
    format!(
      "{} {} [{} {}] at ({}, {}) {}",
      self.waste_type,
      format_confidence(self.confidence),
      tier.as_str(),
      tier.color_hex(),
      self.location.x,
      self.location.y,
      self.image_url
    )
  }
}

/// 面向终端的可读输出
pub struct ConsoleOutput<W: Write> {
  sink: Mutex<W>,
}

impl ConsoleOutput<std::io::Stdout> {
  pub fn stdout() -> Self {
    Self::new(std::io::stdout())
  }
}

impl<W: Write> ConsoleOutput<W> {
  pub fn new(sink: W) -> Self {
    Self {
      sink: Mutex::new(sink),
    }
  }

  pub fn into_inner(self) -> W {
    self.sink.into_inner().unwrap_or_else(PoisonError::into_inner)
  }
}

impl<W: Write, T: ConsoleLine> Render<AnalysisRun<T>> for ConsoleOutput<W> {
  type Error = OutputError;

  fn render_result(&self, run: &AnalysisRun<T>) -> Result<(), Self::Error> {
    let mut sink = self.sink.lock()?;
    match run.status {
      RunStatus::Failed => {
        let error = run.error.as_deref().unwrap_or(ANALYSIS_GENERIC_MESSAGE);
        writeln!(sink, "error: {}", error)?;
      }
      RunStatus::Idle | RunStatus::Submitting => {
        writeln!(sink, "analyzing... {}%", run.progress)?;
      }
      RunStatus::Succeeded => {
        if let Some(warning) = &run.warning {
          writeln!(sink, "note: {}", warning)?;
        }
        for (index, item) in run.results.iter().enumerate() {
          writeln!(sink, "{:>2}. {}", index + 1, item.console_line())?;
        }
      }
    }
    sink.flush()?;
    Ok(())
  }
}

impl<W: Write> Render<ChatMessage> for ConsoleOutput<W> {
  type Error = OutputError;

  fn render_result(&self, message: &ChatMessage) -> Result<(), Self::Error> {
    let mut sink = self.sink.lock()?;
    let speaker = if message.is_user { "you" } else { "assistant" };
    writeln!(sink, "{}> {}", speaker, strip_markup(&message.text))?;
    sink.flush()?;
    Ok(())
  }
}

/// 逐字显示中的助手回复：每次只写出新增的部分
pub struct TypingEcho<W: Write> {
  state: Mutex<(W, usize)>,
}

impl TypingEcho<std::io::Stdout> {
  pub fn stdout() -> Self {
    Self::new(std::io::stdout())
  }
}

impl<W: Write> TypingEcho<W> {
  pub fn new(sink: W) -> Self {
    Self {
      state: Mutex::new((sink, 0)),
    }
  }

  pub fn into_inner(self) -> W {
    self.state.into_inner().unwrap_or_else(PoisonError::into_inner).0
  }
}

impl<W: Write> Render<ChatMessage> for TypingEcho<W> {
  type Error = OutputError;

  fn render_result(&self, message: &ChatMessage) -> Result<(), Self::Error> {
    let mut state = self.state.lock()?;
    let (sink, printed) = &mut *state;
    if message.is_rendering {
      if let Some(fresh) = message.text.get(*printed..) {
        if *printed == 0 && !fresh.is_empty() {
          write!(sink, "assistant> ")?;
        }
        write!(sink, "{}", fresh)?;
        *printed = message.text.len();
      }
    } else {
      // 显示结束时文本变为格式化内容，补齐剩余部分
      let plain = strip_markup(&message.text);
      if *printed == 0 {
        write!(sink, "assistant> ")?;
      }
      write!(sink, "{}", plain.get(*printed..).unwrap_or_default())?;
      writeln!(sink)?;
      *printed = 0;
    }
    sink.flush()?;
    Ok(())
  }
}

/// 机器可读输出，每个结果一行 JSON
pub struct JsonOutput<W: Write> {
  sink: Mutex<W>,
}

impl JsonOutput<std::io::Stdout> {
  pub fn stdout() -> Self {
    Self::new(std::io::stdout())
  }
}

impl<W: Write> JsonOutput<W> {
  pub fn new(sink: W) -> Self {
    Self {
      sink: Mutex::new(sink),
    }
  }

  pub fn into_inner(self) -> W {
    self.sink.into_inner().unwrap_or_else(PoisonError::into_inner)
  }
}

impl<W: Write, T: Serialize> Render<T> for JsonOutput<W> {
  type Error = OutputError;

  fn render_result(&self, result: &T) -> Result<(), Self::Error> {
    let mut sink = self.sink.lock()?;
    serde_json::to_writer(&mut *sink, result)?;
    writeln!(sink)?;
    sink.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use crate::model::Location;

  use super::*;

  fn bottle() -> CanonicalDetection {
    CanonicalDetection {
      label: "bottle".to_string(),
      confidence: 0.92,
      bounding_box: vec![1.0, 2.0, 3.0, 4.0],
      material: Some("plastic".to_string()),
      ..CanonicalDetection::default()
    }
  }

  fn succeeded<T>(results: Vec<T>, warning: Option<&str>) -> AnalysisRun<T> {
    AnalysisRun {
      status: RunStatus::Succeeded,
      progress: 100,
      results,
      warning: warning.map(str::to_string),
      error: None,
    }
  }

  fn text(bytes: Vec<u8>) -> String {
    String::from_utf8(bytes).unwrap()
  }

  #[test]
  fn console_lists_detections() {
    let output = ConsoleOutput::new(Vec::new());
    output
      .render_result(&succeeded(vec![bottle()], Some("Rinse first")))
      .unwrap();
    let printed = text(output.into_inner());
    assert_eq!(
      printed,
      "note: Rinse first\n 1. bottle 92.0% [high #4CAF50] volume=0 box=[1.0, 2.0, 3.0, 4.0] material=plastic\n"
    );
  }

  #[test]
  fn console_shows_drone_and_errors() {
    let output = ConsoleOutput::new(Vec::new());
    let drone = DroneDetection {
      waste_type: "tyre".to_string(),
      confidence: 0.65,
      location: Location { x: 3.0, y: 4.5 },
      image_url: "http://localhost/7.jpg".to_string(),
    };
    output.render_result(&succeeded(vec![drone], None)).unwrap();

    let failed = AnalysisRun::<DroneDetection> {
      status: RunStatus::Failed,
      error: Some("model crashed".to_string()),
      ..AnalysisRun::default()
    };
    output.render_result(&failed).unwrap();

    assert_eq!(
      text(output.into_inner()),
      " 1. tyre 65.0% [medium #FFC107] at (3, 4.5) http://localhost/7.jpg\nerror: model crashed\n"
    );
  }

  #[test]
  fn console_strips_chat_markup() {
    let output = ConsoleOutput::new(Vec::new());
    output.render_result(&ChatMessage::user("hi")).unwrap();
    output
      .render_result(&ChatMessage::assistant("<p>Rinse it</p>"))
      .unwrap();
    assert_eq!(text(output.into_inner()), "you> hi\nassistant> Rinse it\n");
  }

  #[test]
  fn typing_echo_writes_only_new_text() {
    let echo = TypingEcho::new(Vec::new());
    let mut message = ChatMessage::assistant("");
    message.is_rendering = true;
    for partial in ["Hi ", "Hi the"] {
      message.text = partial.to_string();
      echo.render_result(&message).unwrap();
    }
    message.text = "<p>Hi there</p>".to_string();
    message.is_rendering = false;
    echo.render_result(&message).unwrap();

    assert_eq!(text(echo.into_inner()), "assistant> Hi there\n");
  }

  #[test]
  fn json_output_one_line_per_result() {
    let output = JsonOutput::new(Vec::new());
    output
      .render_result(&succeeded(vec![bottle()], None))
      .unwrap();
    let printed = text(output.into_inner());
    let value: serde_json::Value = serde_json::from_str(printed.trim_end()).unwrap();
    assert_eq!(value["status"], "succeeded");
    assert_eq!(value["results"][0]["label"], "bottle");
    assert!(printed.ends_with('\n'));
  }
}
