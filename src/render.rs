// 该文件是 Huishou （回收） 项目的一部分。
// src/render.rs - 回复格式化与逐字显示
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

use tokio::time;
use tokio_util::sync::CancellationToken;

const STEP_OPEN: &str = r#"<div class="step">"#;
const STEP_CLOSE: &str = "</div>";
const STEP_NUMBER_OPEN: &str = r#"<span class="step-number">"#;
const STEP_NUMBER_CLOSE: &str = "</span>";
const PARAGRAPH_OPEN: &str = "<p>";
const PARAGRAPH_CLOSE: &str = "</p>";

/// 格式化所用的全部标签，去标签时只识别这些
const MARKUP_TAGS: [&str; 6] = [
  STEP_OPEN,
  STEP_CLOSE,
  STEP_NUMBER_OPEN,
  STEP_NUMBER_CLOSE,
  PARAGRAPH_OPEN,
  PARAGRAPH_CLOSE,
];

/// 逐字显示参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingConfig {
  /// 短文本每次显示的间隔
  pub base_interval: Duration,
  /// 每次显示的字符数
  pub chars_per_tick: usize,
}

impl Default for TypingConfig {
  fn default() -> Self {
    Self {
      base_interval: Duration::from_millis(30),
      chars_per_tick: 3,
    }
  }
}

/// 格式化后的段落
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
  /// 以 `N.` 开头的步骤
  Step { number: String, body: String },
  Paragraph(String),
}

impl Block {
  fn parse(paragraph: &str) -> Self {
    let digits = paragraph.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 && paragraph[digits..].starts_with('.') {
      Block::Step {
        number: paragraph[..digits].to_string(),
        body: paragraph[digits + 1..].to_string(),
      }
    } else {
      Block::Paragraph(paragraph.to_string())
    }
  }

  fn write_markup(&self, out: &mut String) {
    match self {
      Block::Step { number, body } => {
        out.push_str(STEP_OPEN);
        out.push_str(STEP_NUMBER_OPEN);
        out.push_str(number);
        out.push('.');
        out.push_str(STEP_NUMBER_CLOSE);
        out.push_str(body);
        out.push_str(STEP_CLOSE);
      }
      Block::Paragraph(text) => {
        out.push_str(PARAGRAPH_OPEN);
        out.push_str(text);
        out.push_str(PARAGRAPH_CLOSE);
      }
    }
  }
}

/// 按行切分，丢弃空行，识别步骤
pub fn format_response(text: &str) -> Vec<Block> {
  text
    .lines()
    .filter(|line| !line.trim().is_empty())
    .map(Block::parse)
    .collect()
}

pub fn to_markup(blocks: &[Block]) -> String {
  let mut markup = String::new();
  for block in blocks {
    block.write_markup(&mut markup);
  }
  markup
}

/// 去掉格式化标签，得到实际显示的文本。不属于标签集合的 `<` 原样保留。
pub fn strip_markup(markup: &str) -> String {
  let mut plain = String::with_capacity(markup.len());
  let mut rest = markup;
  while let Some(ch) = rest.chars().next() {
    if ch == '<' {
      if let Some(tag) = MARKUP_TAGS.iter().find(|tag| rest.starts_with(**tag)) {
        rest = &rest[tag.len()..];
        continue;
      }
    }
    plain.push(ch);
    rest = &rest[ch.len_utf8()..];
  }
  plain
}

/// 长文本加快速度，使总时长有界：`min(base, 1s / 字符数)`
pub fn tick_interval(base: Duration, text_len: usize) -> Duration {
  if text_len == 0 {
    return base;
  }
  let len = u32::try_from(text_len).unwrap_or(u32::MAX);
  base.min(Duration::from_secs(1) / len)
}

/// 一次显示产生的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFrame<'a> {
  /// 已显示的纯文本前缀
  Partial(&'a str),
  /// 完整的格式化文本
  Complete(&'a str),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
  Completed,
  /// 被取消，消息停留在最后一次显示的状态
  Cancelled,
}

/// 把完整回复变成按时间推进的逐字显示序列。
///
/// 本身不持有消息，只通过回调把每一帧交给调用方。
#[derive(Debug, Clone)]
pub struct Typewriter {
  markup: String,
  plain: String,
  stops: Vec<usize>,
  interval: Duration,
}

impl Typewriter {
  pub fn new(source: &str, config: &TypingConfig) -> Self {
    let markup = to_markup(&format_response(source));
    let plain = strip_markup(&markup);
    let per_tick = config.chars_per_tick.max(1);

    let mut stops: Vec<usize> = plain
      .char_indices()
      .map(|(idx, _)| idx)
      .skip(per_tick)
      .step_by(per_tick)
      .collect();
    if !plain.is_empty() {
      stops.push(plain.len());
    }

    let interval = tick_interval(config.base_interval, plain.chars().count());
    Self {
      markup,
      plain,
      stops,
      interval,
    }
  }

  pub fn markup(&self) -> &str {
    &self.markup
  }

  pub fn plain(&self) -> &str {
    &self.plain
  }

  pub fn interval(&self) -> Duration {
    self.interval
  }

  /// 不计时的帧序列，每项是逐步增长的纯文本前缀
  pub fn frames(&self) -> impl Iterator<Item = &str> + '_ {
    self.stops.iter().map(|&end| &self.plain[..end])
  }

  /// 按节奏播放。每次显示前检查取消信号；取消后不再产生任何帧，
  /// 也不会跳到最终文本。
  pub async fn play<F>(&self, cancel: &CancellationToken, mut on_frame: F) -> RenderOutcome
  where
    F: FnMut(RenderFrame<'_>),
  {
    for partial in self.frames() {
      if cancel.is_cancelled() {
        return RenderOutcome::Cancelled;
      }
      on_frame(RenderFrame::Partial(partial));
      tokio::select! {
        biased;
        _ = cancel.cancelled() => return RenderOutcome::Cancelled,
        _ = time::sleep(self.interval) => {}
      }
    }

    if cancel.is_cancelled() {
      return RenderOutcome::Cancelled;
    }
    on_frame(RenderFrame::Complete(&self.markup));
    RenderOutcome::Completed
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use super::*;

  #[test]
  fn steps_and_paragraphs() {
    let blocks = format_response("Sort your waste:\n\n1. Rinse the bottle.\n2.Remove the cap\n  \nDone");
    assert_eq!(
      blocks,
      vec![
        Block::Paragraph("Sort your waste:".to_string()),
        Block::Step {
          number: "1".to_string(),
          body: " Rinse the bottle.".to_string(),
        },
        Block::Step {
          number: "2".to_string(),
          body: "Remove the cap".to_string(),
        },
        Block::Paragraph("Done".to_string()),
      ]
    );
  }

  #[test]
  fn number_without_period_is_paragraph() {
    assert_eq!(
      format_response("10 bottles"),
      vec![Block::Paragraph("10 bottles".to_string())]
    );
    assert_eq!(
      format_response(" 1. indented"),
      vec![Block::Paragraph(" 1. indented".to_string())]
    );
  }

  #[test]
  fn markup_grammar() {
    let markup = to_markup(&format_response("Intro\n3. Crush the can"));
    assert_eq!(
      markup,
      r#"<p>Intro</p><div class="step"><span class="step-number">3.</span> Crush the can</div>"#
    );
    assert_eq!(strip_markup(&markup), "Intro3. Crush the can");
  }

  #[test]
  fn strip_keeps_foreign_angle_brackets() {
    let markup = to_markup(&format_response("use a < b and <b>bold</b>"));
    assert_eq!(strip_markup(&markup), "use a < b and <b>bold</b>");
  }

  #[test]
  fn strip_handles_multibyte_text() {
    let markup = to_markup(&format_response("塑料瓶\n1. 清洗"));
    assert_eq!(strip_markup(&markup), "塑料瓶1. 清洗");
  }

  #[test]
  fn interval_adapts_to_length() {
    let base = Duration::from_millis(30);
    assert_eq!(tick_interval(base, 10), base);
    assert_eq!(tick_interval(base, 100), Duration::from_millis(10));
    assert_eq!(tick_interval(base, 0), base);
    assert!(tick_interval(base, 5_000) < Duration::from_millis(1));
  }

  #[test]
  fn frames_reveal_three_chars_at_a_time() {
    let typewriter = Typewriter::new("abcdefg", &TypingConfig::default());
    let frames: Vec<&str> = typewriter.frames().collect();
    assert_eq!(frames, vec!["abc", "abcdef", "abcdefg"]);
    assert_eq!(typewriter.markup(), "<p>abcdefg</p>");
  }

  #[test]
  fn empty_text_has_no_frames() {
    let typewriter = Typewriter::new("\n\n", &TypingConfig::default());
    assert_eq!(typewriter.frames().count(), 0);
    assert_eq!(typewriter.markup(), "");
  }

  #[tokio::test(start_paused = true)]
  async fn play_ends_with_formatted_text() {
    let typewriter = Typewriter::new("1. Rinse\nRecycle", &TypingConfig::default());
    let cancel = CancellationToken::new();
    let mut seen = Vec::new();

    let outcome = typewriter
      .play(&cancel, |frame| match frame {
        RenderFrame::Partial(text) => seen.push(text.to_string()),
        RenderFrame::Complete(text) => seen.push(format!("done:{}", text)),
      })
      .await;

    assert_eq!(outcome, RenderOutcome::Completed);
    assert_eq!(seen.len(), typewriter.frames().count() + 1);
    assert_eq!(seen[seen.len() - 2], "1. RinseRecycle");
    assert_eq!(
      seen.last().map(String::as_str),
      Some(r#"done:<div class="step"><span class="step-number">1.</span> Rinse</div><p>Recycle</p>"#)
    );
  }

  #[tokio::test(start_paused = true)]
  async fn cancellation_stops_growth() {
    let typewriter = Typewriter::new("Plastic bottles go in the yellow bin.", &TypingConfig::default());
    assert_eq!(typewriter.interval(), Duration::from_secs(1) / 37);

    let cancel = CancellationToken::new();
    let seen = Arc::new(Mutex::new(Vec::<String>::new()));
    let sink = seen.clone();

    let (outcome, ()) = tokio::join!(
      typewriter.play(&cancel, move |frame| {
        if let RenderFrame::Partial(text) = frame {
          sink.lock().unwrap().push(text.to_string());
        }
      }),
      async {
        time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
      }
    );

    assert_eq!(outcome, RenderOutcome::Cancelled);
    let frames_at_cancel = seen.lock().unwrap().clone();
    assert!(!frames_at_cancel.is_empty());
    assert!(frames_at_cancel.len() < typewriter.frames().count());

    time::sleep(Duration::from_secs(5)).await;
    let frames_later = seen.lock().unwrap().clone();
    assert_eq!(frames_later, frames_at_cancel);
    assert!(frames_later.windows(2).all(|w| w[0].len() < w[1].len()));
  }

  #[tokio::test(start_paused = true)]
  async fn already_cancelled_emits_nothing() {
    let typewriter = Typewriter::new("hello", &TypingConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();
    let mut frames = 0;
    let outcome = typewriter.play(&cancel, |_| frames += 1).await;
    assert_eq!(outcome, RenderOutcome::Cancelled);
    assert_eq!(frames, 0);
  }
}
