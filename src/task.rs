// 该文件是 Huishou （回收） 项目的一部分。
// src/task.rs - 命令行任务
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

use std::{future::Future, thread, time::Duration};

use tokio::{
  io::{AsyncBufRead, AsyncBufReadExt},
  sync::watch,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use url::Url;

use crate::{
  analysis::{AnalysisController, AnalysisRun, RunStatus, SubmitOutcome, Surface},
  chat::{ChatController, ChatMessage, ChatOutcome, ChatSession},
  client::Transport,
  output::Render,
  render::RenderOutcome,
};

const FORCE_EXIT_AFTER: Duration = Duration::from_secs(30);

/// Ctrl-C 时触发取消信号；30 秒内没有退出则强制结束进程
pub fn install_teardown(cancel: CancellationToken) -> anyhow::Result<()> {
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    cancel.cancel();
    thread::spawn(|| {
      thread::sleep(FORCE_EXIT_AFTER);
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(())
}

pub trait Task<C, O>: Sized {
  type Error;
  fn run_task(
    self,
    controller: C,
    output: O,
    cancel: CancellationToken,
  ) -> impl Future<Output = Result<(), Self::Error>>;
}

/// 提交一张图片并输出最终结果
pub struct AnalysisTask {
  image: Url,
}

impl AnalysisTask {
  pub fn new(image: Url) -> Self {
    Self { image }
  }
}

async fn log_progress<I>(mut rx: watch::Receiver<AnalysisRun<I>>) {
  while rx.changed().await.is_ok() {
    let progress = rx.borrow_and_update().progress;
    info!("分析进度 {}%", progress);
  }
}

impl<
  S: Surface,
  T: Transport,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<AnalysisRun<S::Item>, Error = RE>,
> Task<AnalysisController<S, T>, O> for AnalysisTask
{
  type Error = anyhow::Error;

  async fn run_task(
    self,
    controller: AnalysisController<S, T>,
    output: O,
    cancel: CancellationToken,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let now = std::time::Instant::now();
    // 发送端随控制器存活，进度日志不会先结束
    let outcome = tokio::select! {
      outcome = controller.submit_url(&self.image, &cancel) => outcome,
      _ = log_progress(controller.subscribe()) => SubmitOutcome::Cancelled,
    };
    info!("分析结束，耗时: {:.2?}", now.elapsed());

    match outcome {
      SubmitOutcome::Finished(status) => {
        output.render_result(&controller.snapshot())?;
        if status == RunStatus::Failed {
          anyhow::bail!("分析失败");
        }
        Ok(())
      }
      SubmitOutcome::Cancelled => {
        warn!("任务被取消");
        Ok(())
      }
      SubmitOutcome::Ignored => anyhow::bail!("已有请求在进行"),
    }
  }
}

/// 把会话中尚未输出的助手消息交给输出端。
/// 显示中的消息会被重复交付，直到显示结束。
fn echo_new_messages<O: Render<ChatMessage>>(
  session: &ChatSession,
  shown: &mut usize,
  output: &O,
) -> Result<(), O::Error> {
  for message in session.messages.iter().skip(*shown) {
    if !message.is_user {
      output.render_result(message)?;
    }
    if message.is_rendering {
      break;
    }
    *shown += 1;
  }
  Ok(())
}

async fn converse<T, O>(
  controller: &ChatController<T>,
  prompt: &str,
  output: &O,
  shown: &mut usize,
  cancel: &CancellationToken,
) -> Result<ChatOutcome, O::Error>
where
  T: Transport,
  O: Render<ChatMessage>,
{
  let mut rx = controller.subscribe();
  let send = controller.send(prompt, cancel);
  tokio::pin!(send);

  loop {
    tokio::select! {
      outcome = &mut send => {
        let session = rx.borrow_and_update().clone();
        echo_new_messages(&session, shown, output)?;
        return Ok(outcome);
      }
      Ok(()) = rx.changed() => {
        let session = rx.borrow_and_update().clone();
        echo_new_messages(&session, shown, output)?;
      }
    }
  }
}

/// 问一个问题，输出回复后退出
pub struct OneShotChatTask {
  prompt: String,
}

impl OneShotChatTask {
  pub fn new(prompt: impl Into<String>) -> Self {
    Self {
      prompt: prompt.into(),
    }
  }
}

impl<
  T: Transport,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<ChatMessage, Error = RE>,
> Task<ChatController<T>, O> for OneShotChatTask
{
  type Error = anyhow::Error;

  async fn run_task(
    self,
    controller: ChatController<T>,
    output: O,
    cancel: CancellationToken,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut shown = controller.snapshot().messages.len();
    match converse(&controller, &self.prompt, &output, &mut shown, &cancel).await? {
      ChatOutcome::Answered(RenderOutcome::Completed) => Ok(()),
      ChatOutcome::Answered(RenderOutcome::Cancelled) | ChatOutcome::Cancelled => {
        warn!("任务被取消");
        Ok(())
      }
      ChatOutcome::Failed => anyhow::bail!("对话失败"),
      ChatOutcome::Ignored => anyhow::bail!("问题为空"),
    }
  }
}

/// 逐行读取问题，直到输入结束或收到中断
pub struct ContinuousChatTask<R> {
  lines: R,
}

impl<R: AsyncBufRead + Unpin> ContinuousChatTask<R> {
  pub fn new(lines: R) -> Self {
    Self { lines }
  }
}

impl<
  R: AsyncBufRead + Unpin,
  T: Transport,
  RE: std::error::Error + Sync + Send + 'static,
  O: Render<ChatMessage, Error = RE>,
> Task<ChatController<T>, O> for ContinuousChatTask<R>
{
  type Error = anyhow::Error;

  async fn run_task(
    self,
    controller: ChatController<T>,
    output: O,
    cancel: CancellationToken,
  ) -> Result<(), Self::Error> {
    info!("开始任务...");
    let mut shown = 0;
    echo_new_messages(&controller.snapshot(), &mut shown, &output)?;

    let mut lines = self.lines.lines();
    let mut asked = 0usize;
    loop {
      let line = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          warn!("中断信号接收，退出对话");
          break;
        }
        line = lines.next_line() => line?,
      };
      let Some(prompt) = line else {
        info!("输入结束");
        break;
      };

      match converse(&controller, &prompt, &output, &mut shown, &cancel).await? {
        ChatOutcome::Ignored => continue,
        ChatOutcome::Answered(RenderOutcome::Cancelled) | ChatOutcome::Cancelled => {
          warn!("中断信号接收，退出对话");
          break;
        }
        ChatOutcome::Answered(RenderOutcome::Completed) | ChatOutcome::Failed => asked += 1,
      }
    }

    info!("任务完成，共 {} 个问题，退出", asked);
    Ok(())
  }
}
