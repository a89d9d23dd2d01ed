// 该文件是 Huishou （回收） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;

use huishou::{
  analysis::{AnalysisController, DetectionController, DroneController},
  chat::ChatController,
  client::HttpTransport,
  config::Settings,
  output::{ConsoleOutput, JsonOutput, TypingEcho},
  task::{self, AnalysisTask, ContinuousChatTask, OneShotChatTask, Task},
};

use args::{Args, Command};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("检测接口: {}", args.detect_url);
  info!("无人机接口: {}", args.drone_url);
  info!("聊天接口: {}", args.chat_url);

  let settings = Settings::local()?
    .with_endpoints(&args.detect_url, &args.drone_url, &args.chat_url)?
    .with_typing_speed(Duration::from_millis(args.typing_speed))
    .with_request_timeout(Duration::from_secs(args.timeout));

  let cancel = CancellationToken::new();
  task::install_teardown(cancel.clone())?;

  let runtime = tokio::runtime::Builder::new_current_thread()
    .enable_all()
    .build()?;
  runtime.block_on(run(args.command, settings, cancel))
}

async fn run(command: Command, settings: Settings, cancel: CancellationToken) -> Result<()> {
  let transport = HttpTransport::new(settings.request_timeout)?;

  match command {
    Command::Detect { image, json } => {
      let controller: DetectionController<_> =
        AnalysisController::new(settings.detect_endpoint, transport, settings.progress);
      let task = AnalysisTask::new(image);
      if json {
        task.run_task(controller, JsonOutput::stdout(), cancel).await
      } else {
        task.run_task(controller, ConsoleOutput::stdout(), cancel).await
      }
    }
    Command::Drone { image, json } => {
      let controller: DroneController<_> =
        AnalysisController::new(settings.drone_endpoint, transport, settings.progress);
      let task = AnalysisTask::new(image);
      if json {
        task.run_task(controller, JsonOutput::stdout(), cancel).await
      } else {
        task.run_task(controller, ConsoleOutput::stdout(), cancel).await
      }
    }
    Command::Chat { prompt } => {
      let controller = ChatController::new(settings.chat_endpoint, transport, settings.typing);
      match prompt {
        Some(prompt) => {
          OneShotChatTask::new(prompt)
            .run_task(controller, TypingEcho::stdout(), cancel)
            .await
        }
        None => {
          ContinuousChatTask::new(BufReader::new(tokio::io::stdin()))
            .run_task(controller, TypingEcho::stdout(), cancel)
            .await
        }
      }
    }
  }
}
