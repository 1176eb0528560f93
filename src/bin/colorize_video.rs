// 该文件是 Danqing （丹青） 项目的一部分。
// src/bin/colorize_video.rs - 视频逐帧上色程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{sync::mpsc, thread, time::Duration};

use anyhow::{Result, bail};
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use danqing::{
  FromUrl,
  config::ResourceRoot,
  input::{FrameSource, InputWrapper},
  model::ColorizerBuilder,
  output::{OutputWrapper, play_video},
  task::{ContinuousTask, StopReason, Task},
};

/// 黑白视频逐帧上色，输出 H.264/MP4
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 eccv16:///opt/danqing；缺省时自动查找资源目录
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,
  /// 输入视频（路径或 gst://file/ 地址）
  #[arg(long, value_name = "INPUT")]
  pub input: String,
  /// 输出视频（路径或 gst:/// 地址）
  #[arg(long, value_name = "OUTPUT")]
  pub output: String,
  /// 最多处理的帧数
  #[arg(long, value_name = "COUNT")]
  pub max_frames: Option<usize>,
  /// 处理完成后回放输出视频
  #[arg(long)]
  pub preview: bool,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let builder = match &args.model {
    Some(url) => ColorizerBuilder::from_url(url)?,
    None => ColorizerBuilder::from_resource_root(&ResourceRoot::resolve()),
  };
  info!("模型文件: {}", builder.bundle().network.display());
  let colorizer = builder.build()?;

  let input = InputWrapper::from_location(&args.input)?;
  let output = OutputWrapper::from_location(&args.output, &input.stream_info())?;

  let output_path = output.path().to_path_buf();

  let (tx, rx) = mpsc::channel();
  let (preview_tx, preview_rx) = mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，写完当前帧后结束...");
    let _ = tx.send(());
    let _ = preview_tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;

  let report = ContinuousTask::default()
    .with_frame_number(args.max_frames)
    .with_stop_signal(rx)
    .run_task(input, colorizer, output)?;

  info!("共写入 {} 帧: {}", report.frames, args.output);
  if report.stop.is_failure() {
    bail!("处理在第 {} 帧后中止: {:?}", report.frames, report.stop);
  }

  if args.preview && report.stop != StopReason::Interrupted {
    play_video(&output_path, Some(&preview_rx))?;
  }
  Ok(())
}
