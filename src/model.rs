// 该文件是 Huishou （回收） 项目的一部分。
// src/model.rs - 检测结果模型
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

use serde::{Deserialize, Serialize};

/// 缺省标签
pub const UNKNOWN_LABEL: &str = "Unknown";

/// 统一的检测结果，与后端返回格式无关
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalDetection {
  /// 物体/类别名称
  pub label: String,
  /// 置信度，总在 [0, 1] 内
  pub confidence: f64,
  /// 原始坐标序列，格式不做解释
  pub bounding_box: Vec<f64>,
  /// 体积估计
  pub volume_estimate: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub material: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub state: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub contamination: Option<String>,
}

impl Default for CanonicalDetection {
  fn default() -> Self {
    Self {
      label: UNKNOWN_LABEL.to_string(),
      confidence: 0.0,
      bounding_box: Vec::new(),
      volume_estimate: 0.0,
      material: None,
      state: None,
      contamination: None,
    }
  }
}

impl CanonicalDetection {
  pub fn tier(&self) -> ConfidenceTier {
    ConfidenceTier::from_confidence(self.confidence)
  }
}

/// 原始检测器输出不带材质信息时使用的占位分级。
///
/// 这不是推断结果，只是在后端补齐分类前的固定填充值。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaceholderGrade {
  pub material: &'static str,
  pub state: &'static str,
  pub contamination: &'static str,
}

pub const RAW_DETECTOR_PLACEHOLDER: PlaceholderGrade = PlaceholderGrade {
  material: "plastic",
  state: "clear",
  contamination: "none",
};

/// 无人机页面的检测结果，直接映射后端格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DroneDetection {
  pub waste_type: String,
  pub confidence: f64,
  pub location: Location,
  pub image_url: String,
}

impl DroneDetection {
  pub fn tier(&self) -> ConfidenceTier {
    ConfidenceTier::from_confidence(self.confidence)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
  pub x: f64,
  pub y: f64,
}

/// 置信度展示分级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConfidenceTier {
  Low,
  Medium,
  High,
}

impl ConfidenceTier {
  pub const HIGH_THRESHOLD: f64 = 0.8;
  pub const MEDIUM_THRESHOLD: f64 = 0.6;

  /// 对任意输入都有定义；NaN 与越界值归为 `Low`
  pub fn from_confidence(confidence: f64) -> Self {
    if !(0.0..=1.0).contains(&confidence) {
      ConfidenceTier::Low
    } else if confidence >= Self::HIGH_THRESHOLD {
      ConfidenceTier::High
    } else if confidence >= Self::MEDIUM_THRESHOLD {
      ConfidenceTier::Medium
    } else {
      ConfidenceTier::Low
    }
  }

  pub fn color_hex(&self) -> &'static str {
    match self {
      ConfidenceTier::High => "#4CAF50",
      ConfidenceTier::Medium => "#FFC107",
      ConfidenceTier::Low => "#F44336",
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      ConfidenceTier::High => "high",
      ConfidenceTier::Medium => "medium",
      ConfidenceTier::Low => "low",
    }
  }
}

/// 百分比形式，保留一位小数
pub fn format_confidence(confidence: f64) -> String {
  format!("{:.1}%", confidence * 100.0)
}
