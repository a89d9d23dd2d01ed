// 该文件是 Huishou （回收） 项目的一部分。
// src/normalize.rs - 后端检测结果归一化
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

//! 检测后端会返回几种互不兼容的格式：
//!
//! - 原始检测器输出：数组，首元素带 `boxes`（`cls` / `conf` / `xyxy`）
//! - 通用 `objects` 列表
//! - 通用 `detections` 列表
//!
//! 这里把它们统一成 [`CanonicalDetection`] 序列。归一化从不失败，
//! 无法识别的输入退化为空结果加诊断信息。

use serde_json::{Map, Value};

use crate::model::{CanonicalDetection, RAW_DETECTOR_PLACEHOLDER, UNKNOWN_LABEL};

pub const NO_OBJECTS_DETECTED: &str = "No objects detected in the image";
pub const INVALID_RESPONSE: &str = "Invalid response from server";

const LABEL_KEYS: [&str; 2] = ["label", "name"];
const CONFIDENCE_KEYS: [&str; 2] = ["confidence", "score"];
const BOX_KEYS: [&str; 2] = ["bounding_box", "box"];
const VOLUME_KEYS: [&str; 2] = ["volume_estimate", "volumeEstimate"];

/// 归一化结果
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Normalized {
  pub detections: Vec<CanonicalDetection>,
  /// 非致命诊断信息，可能与非空结果同时出现
  pub diagnostic: Option<String>,
}

/// 载荷格式，按优先级排列
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PayloadShape<'a> {
  RawDetector {
    boxes: &'a [Value],
    names: Option<&'a Value>,
  },
  Objects(&'a [Value]),
  Detections(&'a [Value]),
  Unrecognized,
  Invalid,
}

impl<'a> PayloadShape<'a> {
  pub fn classify(payload: &'a Value) -> Self {
    let map = match payload {
      Value::Array(items) => {
        return match items.first().and_then(raw_boxes) {
          Some(shape) => shape,
          None => PayloadShape::Unrecognized,
        };
      }
      Value::Object(map) => map,
      _ => return PayloadShape::Invalid,
    };

    // 对象形式的载荷也可能以 "0" 为键携带原始结果
    if let Some(shape) = map.get("0").and_then(raw_boxes) {
      return shape;
    }
    if let Some(Value::Array(objects)) = map.get("objects") {
      return PayloadShape::Objects(objects);
    }
    if let Some(Value::Array(detections)) = map.get("detections") {
      return PayloadShape::Detections(detections);
    }
    PayloadShape::Unrecognized
  }
}

/// 首元素带非空 `boxes` 时才算原始检测器格式，否则交给后续分支
fn raw_boxes(first: &Value) -> Option<PayloadShape<'_>> {
  let first = first.as_object()?;
  match first.get("boxes") {
    Some(Value::Array(boxes)) if !boxes.is_empty() => Some(PayloadShape::RawDetector {
      boxes,
      names: first.get("names"),
    }),
    _ => None,
  }
}

pub fn normalize(payload: &Value) -> Normalized {
  let mut normalized = match PayloadShape::classify(payload) {
    PayloadShape::RawDetector { boxes, names } => Normalized {
      detections: boxes.iter().map(|b| from_raw_box(b, names)).collect(),
      diagnostic: None,
    },
    PayloadShape::Objects(entries) | PayloadShape::Detections(entries) => Normalized {
      detections: entries.iter().map(from_generic_entry).collect(),
      diagnostic: None,
    },
    PayloadShape::Unrecognized => Normalized {
      detections: Vec::new(),
      diagnostic: Some(NO_OBJECTS_DETECTED.to_string()),
    },
    PayloadShape::Invalid => {
      return Normalized {
        detections: Vec::new(),
        diagnostic: Some(INVALID_RESPONSE.to_string()),
      };
    }
  };

  if let Some(report) = report_of(payload) {
    normalized.diagnostic = Some(report);
  }
  normalized
}

/// 后端在载荷里直接报告的错误，例如 `{"error": "model not loaded"}`
pub fn backend_error(payload: &Value) -> Option<String> {
  payload.get("error").and_then(text_of)
}

fn report_of(payload: &Value) -> Option<String> {
  match payload.get("report")? {
    Value::Null | Value::Bool(false) => None,
    report => text_of(report).or_else(|| Some(report.to_string())),
  }
}

fn from_raw_box(raw: &Value, names: Option<&Value>) -> CanonicalDetection {
  let empty = Map::new();
  let raw = raw.as_object().unwrap_or(&empty);
  CanonicalDetection {
    label: raw
      .get("cls")
      .and_then(|cls| class_name(cls, names))
      .unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
    confidence: raw.get("conf").map(confidence_of).unwrap_or(0.0),
    bounding_box: raw.get("xyxy").map(coordinates_of).unwrap_or_default(),
    volume_estimate: 0.0,
    material: Some(RAW_DETECTOR_PLACEHOLDER.material.to_string()),
    state: Some(RAW_DETECTOR_PLACEHOLDER.state.to_string()),
    contamination: Some(RAW_DETECTOR_PLACEHOLDER.contamination.to_string()),
  }
}

fn from_generic_entry(entry: &Value) -> CanonicalDetection {
  let empty = Map::new();
  let entry = entry.as_object().unwrap_or(&empty);
  CanonicalDetection {
    label: first_of(entry, &LABEL_KEYS, text_of).unwrap_or_else(|| UNKNOWN_LABEL.to_string()),
    confidence: first_of(entry, &CONFIDENCE_KEYS, Value::as_f64)
      .map(clamp_confidence)
      .unwrap_or(0.0),
    bounding_box: first_of(entry, &BOX_KEYS, |v| v.as_array().map(|_| coordinates_of(v)))
      .unwrap_or_default(),
    volume_estimate: first_of(entry, &VOLUME_KEYS, Value::as_f64)
      .filter(|v| v.is_finite())
      .unwrap_or(0.0),
    material: entry.get("material").and_then(text_of),
    state: entry.get("state").and_then(text_of),
    contamination: entry.get("contamination").and_then(text_of),
  }
}

/// 按顺序取第一个存在且可转换的字段
fn first_of<T>(entry: &Map<String, Value>, keys: &[&str], convert: impl Fn(&Value) -> Option<T>) -> Option<T> {
  keys
    .iter()
    .filter_map(|key| entry.get(*key))
    .find_map(convert)
}

fn text_of(value: &Value) -> Option<String> {
  match value {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(number_text(n)),
    _ => None,
  }
}

fn number_text(n: &serde_json::Number) -> String {
  if let Some(i) = n.as_i64() {
    i.to_string()
  } else if let Some(u) = n.as_u64() {
    u.to_string()
  } else {
    n.to_string()
  }
}

/// 数字类别通过 `names` 表解析成名称，表可以是对象或数组
fn class_name(cls: &Value, names: Option<&Value>) -> Option<String> {
  if let (Some(id), Some(names)) = (cls.as_u64(), names) {
    let resolved = match names {
      Value::Object(table) => table.get(&id.to_string()),
      Value::Array(table) => usize::try_from(id).ok().and_then(|i| table.get(i)),
      _ => None,
    };
    if let Some(name) = resolved.and_then(text_of) {
      return Some(name);
    }
  }
  text_of(cls)
}

fn confidence_of(value: &Value) -> f64 {
  let raw = match value {
    Value::Array(items) => items.first().and_then(Value::as_f64),
    other => other.as_f64(),
  };
  raw.map(clamp_confidence).unwrap_or(0.0)
}

fn clamp_confidence(confidence: f64) -> f64 {
  if confidence.is_nan() {
    0.0
  } else {
    confidence.clamp(0.0, 1.0)
  }
}

/// 坐标原样透传，嵌套一层的数组（如 `[[x1, y1, x2, y2]]`）展开
fn coordinates_of(value: &Value) -> Vec<f64> {
  let Some(items) = value.as_array() else {
    return Vec::new();
  };
  let mut coords = Vec::with_capacity(items.len());
  for item in items {
    match item {
      Value::Number(n) => coords.extend(n.as_f64()),
      Value::Array(inner) => coords.extend(inner.iter().filter_map(Value::as_f64)),
      _ => {}
    }
  }
  coords
}
