// 该文件是 Huishou （回收） 项目的一部分。
// src/analysis.rs - 图像分析会话
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

use std::{fmt, marker::PhantomData, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::{
  sync::watch,
  time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl,
  client::{Endpoint, Transport},
  input::ImageUpload,
  model::{CanonicalDetection, DroneDetection},
  normalize::{INVALID_RESPONSE, backend_error, normalize},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RunStatus {
  #[default]
  Idle,
  Submitting,
  Succeeded,
  Failed,
}

/// 一次提交到结果的完整周期，下一次提交时整体替换
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRun<T> {
  pub status: RunStatus,
  /// 0 到 100
  pub progress: u8,
  pub results: Vec<T>,
  /// 非致命提示，可能与结果同时存在
  pub warning: Option<String>,
  pub error: Option<String>,
}

impl<T> Default for AnalysisRun<T> {
  fn default() -> Self {
    Self {
      status: RunStatus::Idle,
      progress: 0,
      results: Vec::new(),
      warning: None,
      error: None,
    }
  }
}

impl<T> AnalysisRun<T> {
  fn submitting() -> Self {
    Self {
      status: RunStatus::Submitting,
      ..Self::default()
    }
  }

  /// 模拟进度前进一步，不会到达 100
  fn advance(&mut self, config: &ProgressConfig) -> bool {
    let ceiling = config.ceiling.min(99);
    if self.status != RunStatus::Submitting || self.progress >= ceiling {
      return false;
    }
    self.progress = self.progress.saturating_add(config.step).min(ceiling);
    true
  }

  fn succeed(&mut self, results: Vec<T>, warning: Option<String>) {
    self.status = RunStatus::Succeeded;
    self.progress = 100;
    self.results = results;
    self.warning = warning;
    self.error = None;
  }

  fn fail(&mut self, error: String) {
    self.status = RunStatus::Failed;
    self.results.clear();
    self.error = Some(error);
  }

  pub fn is_submitting(&self) -> bool {
    self.status == RunStatus::Submitting
  }
}

const MIN_PROGRESS_TICK: Duration = Duration::from_millis(1);

/// 进度模拟节奏
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressConfig {
  pub tick: Duration,
  pub step: u8,
  /// 真实结果返回前进度的上限
  pub ceiling: u8,
}

impl Default for ProgressConfig {
  fn default() -> Self {
    Self {
      tick: Duration::from_millis(500),
      step: 10,
      ceiling: 90,
    }
  }
}

/// 后端返回内容的解读结果
#[derive(Debug, Clone, PartialEq)]
pub struct Interpreted<T> {
  pub items: Vec<T>,
  pub warning: Option<String>,
}

/// 一个分析页面：上传字段名与响应格式
pub trait Surface {
  type Item: Clone + fmt::Debug + Serialize;

  const NAME: &'static str;
  const UPLOAD_FIELD: &'static str;

  /// `Err` 表示本次分析失败，内容是展示给用户的信息
  fn interpret(payload: &Value) -> Result<Interpreted<Self::Item>, String>;
}

/// 检测页面，响应需要归一化
#[derive(Debug, Clone, Copy)]
pub struct DetectionSurface;

impl Surface for DetectionSurface {
  type Item = CanonicalDetection;

  const NAME: &'static str = "detection";
  const UPLOAD_FIELD: &'static str = "file";

  fn interpret(payload: &Value) -> Result<Interpreted<Self::Item>, String> {
    if let Some(error) = backend_error(payload) {
      return Err(error);
    }
    let normalized = normalize(payload);
    Ok(Interpreted {
      items: normalized.detections,
      warning: normalized.diagnostic,
    })
  }
}

/// 无人机页面，响应直接映射
#[derive(Debug, Clone, Copy)]
pub struct DroneSurface;

impl Surface for DroneSurface {
  type Item = DroneDetection;

  const NAME: &'static str = "drone";
  const UPLOAD_FIELD: &'static str = "image";

  fn interpret(payload: &Value) -> Result<Interpreted<Self::Item>, String> {
    if let Some(error) = backend_error(payload) {
      return Err(error);
    }
    let items = Vec::<DroneDetection>::deserialize(payload).map_err(|e| {
      debug!("无人机结果解析失败: {}", e);
      INVALID_RESPONSE.to_string()
    })?;
    Ok(Interpreted {
      items,
      warning: None,
    })
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
  /// 已有请求在进行，本次提交被忽略
  Ignored,
  /// 视图被销毁或替换
  Cancelled,
  Finished(RunStatus),
}

/// 每个分析页面同一时间只有一个请求。状态通过 watch 通道对外暴露，
/// 展示层只读。
pub struct AnalysisController<S: Surface, T> {
  endpoint: Endpoint,
  transport: T,
  progress: ProgressConfig,
  run: Arc<watch::Sender<AnalysisRun<S::Item>>>,
  _surface: PhantomData<S>,
}

impl<S: Surface, T: Clone> Clone for AnalysisController<S, T> {
  fn clone(&self) -> Self {
    Self {
      endpoint: self.endpoint.clone(),
      transport: self.transport.clone(),
      progress: self.progress,
      run: self.run.clone(),
      _surface: PhantomData,
    }
  }
}

pub type DetectionController<T> = AnalysisController<DetectionSurface, T>;
pub type DroneController<T> = AnalysisController<DroneSurface, T>;

impl<S: Surface, T: Transport> AnalysisController<S, T> {
  pub fn new(endpoint: Endpoint, transport: T, progress: ProgressConfig) -> Self {
    let (run, _) = watch::channel(AnalysisRun::default());
    Self {
      endpoint,
      transport,
      progress,
      run: Arc::new(run),
      _surface: PhantomData,
    }
  }

  pub fn subscribe(&self) -> watch::Receiver<AnalysisRun<S::Item>> {
    self.run.subscribe()
  }

  pub fn snapshot(&self) -> AnalysisRun<S::Item> {
    self.run.borrow().clone()
  }

  /// 从 URL 读取图片再提交；读取失败直接记为失败，不发请求
  pub async fn submit_url(&self, url: &Url, cancel: &CancellationToken) -> SubmitOutcome {
    match ImageUpload::from_url(url) {
      Ok(upload) => self.submit(&upload, cancel).await,
      Err(err) => {
        warn!("[{}] 图像读取失败: {}", S::NAME, err);
        let message = err.user_message().to_string();
        let rejected = self.run.send_if_modified(|run| {
          if run.is_submitting() {
            return false;
          }
          *run = AnalysisRun::default();
          run.fail(message);
          true
        });
        if rejected {
          SubmitOutcome::Finished(RunStatus::Failed)
        } else {
          SubmitOutcome::Ignored
        }
      }
    }
  }

  pub async fn submit(&self, upload: &ImageUpload, cancel: &CancellationToken) -> SubmitOutcome {
    let accepted = self.run.send_if_modified(|run| {
      if run.is_submitting() {
        return false;
      }
      *run = AnalysisRun::submitting();
      true
    });
    if !accepted {
      debug!("[{}] 已有请求进行中，忽略提交", S::NAME);
      return SubmitOutcome::Ignored;
    }

    info!("[{}] 提交 {} 到 {}", S::NAME, upload.file_name(), self.endpoint);
    let request = self
      .transport
      .post_image(&self.endpoint, S::UPLOAD_FIELD, upload);
    tokio::pin!(request);

    // interval 不接受零周期
    let tick = self.progress.tick.max(MIN_PROGRESS_TICK);
    let mut ticker = time::interval_at(Instant::now() + tick, tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let response = loop {
      tokio::select! {
        biased;
        _ = cancel.cancelled() => {
          warn!("[{}] 请求被取消", S::NAME);
          self.run.send_modify(|run| run.status = RunStatus::Idle);
          return SubmitOutcome::Cancelled;
        }
        response = &mut request => break response,
        _ = ticker.tick() => {
          self.run.send_if_modified(|run| run.advance(&self.progress));
        }
      }
    };
    drop(ticker);

    let status = match response {
      Ok(payload) => match S::interpret(&payload) {
        Ok(Interpreted { items, warning }) => {
          info!("[{}] 分析完成，{} 个结果", S::NAME, items.len());
          if let Some(warning) = &warning {
            warn!("[{}] {}", S::NAME, warning);
          }
          self.run.send_modify(|run| run.succeed(items, warning));
          RunStatus::Succeeded
        }
        Err(message) => {
          warn!("[{}] 后端报告错误: {}", S::NAME, message);
          self.run.send_modify(|run| {
            run.progress = 100;
            run.fail(message);
          });
          RunStatus::Failed
        }
      },
      Err(err) => {
        warn!("[{}] 请求失败: {}", S::NAME, err);
        self.run.send_modify(|run| run.fail(err.analysis_message()));
        RunStatus::Failed
      }
    };
    SubmitOutcome::Finished(status)
  }
}
