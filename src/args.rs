// 该文件是 Huishou （回收） 项目的一部分。
// src/args.rs - 命令行参数
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

use clap::{Parser, Subcommand};
use url::Url;

use huishou::config;

/// Huishou 垃圾分类客户端
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测接口地址
  #[arg(
    long,
    global = true,
    env = "HUISHOU_DETECT_URL",
    default_value = config::DEFAULT_DETECT_URL,
    value_name = "URL"
  )]
  pub detect_url: Url,

  /// 无人机图像分析接口地址
  #[arg(
    long,
    global = true,
    env = "HUISHOU_DRONE_URL",
    default_value = config::DEFAULT_DRONE_URL,
    value_name = "URL"
  )]
  pub drone_url: Url,

  /// 聊天接口地址
  #[arg(
    long,
    global = true,
    env = "HUISHOU_CHAT_URL",
    default_value = config::DEFAULT_CHAT_URL,
    value_name = "URL"
  )]
  pub chat_url: Url,

  /// 请求超时（秒）
  #[arg(
    long,
    global = true,
    default_value_t = config::DEFAULT_REQUEST_TIMEOUT.as_secs(),
    value_name = "SECONDS"
  )]
  pub timeout: u64,

  /// 逐字显示的基础间隔（毫秒）
  #[arg(long, global = true, default_value_t = 30, value_name = "MILLIS")]
  pub typing_speed: u64,

  #[command(subcommand)]
  pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
  /// 上传图片做垃圾检测
  Detect {
    /// 图片地址，image:///path/to.jpg 或 file:///path/to.jpg
    #[arg(long, value_name = "IMAGE")]
    image: Url,
    /// 以 JSON 输出
    #[arg(long)]
    json: bool,
  },
  /// 上传无人机拍摄的图片
  Drone {
    /// 图片地址，image:///path/to.jpg 或 file:///path/to.jpg
    #[arg(long, value_name = "IMAGE")]
    image: Url,
    /// 以 JSON 输出
    #[arg(long)]
    json: bool,
  },
  /// 与垃圾分类助手对话；不给出问题时从标准输入逐行读取
  Chat {
    #[arg(long, value_name = "TEXT")]
    prompt: Option<String>,
  },
}
