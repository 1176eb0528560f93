// 该文件是 Danqing （丹青） 项目的一部分。
// src/output/playback.rs - 输出视频回放
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{path::Path, sync::mpsc::Receiver};

use gstreamer::{self as gst, prelude::*};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

const POLL_INTERVAL_MS: u64 = 100;

#[derive(Error, Debug)]
pub enum PlaybackError {
  #[error("无法转换为文件 URI: {0}")]
  InvalidPath(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Pipeline error: {0}")]
  PipelineError(String),
}

/// playbin 需要绝对路径的 `file://` URI
pub fn playback_uri(path: &Path) -> Result<Url, PlaybackError> {
  let absolute = std::path::absolute(path)?;
  Url::from_file_path(&absolute)
    .map_err(|_| PlaybackError::InvalidPath(absolute.display().to_string()))
}

/// 用 playbin 播放写好的视频，直到播放结束、出错或收到停止信号
pub fn play_video(path: &Path, stop: Option<&Receiver<()>>) -> Result<(), PlaybackError> {
  gst::init()?;
  let uri = playback_uri(path)?;
  info!("回放视频: {}", uri);

  let playbin = gst::ElementFactory::make("playbin")
    .property("uri", uri.as_str())
    .build()?;
  let bus = playbin
    .bus()
    .ok_or_else(|| PlaybackError::PipelineError("Pipeline has no bus".to_string()))?;
  playbin.set_state(gst::State::Playing)?;

  let result = loop {
    if let Some(stop) = stop
      && stop.try_recv().is_ok()
    {
      info!("回放被中断");
      break Ok(());
    }

    let Some(message) = bus.timed_pop_filtered(
      gst::ClockTime::from_mseconds(POLL_INTERVAL_MS),
      &[gst::MessageType::Eos, gst::MessageType::Error],
    ) else {
      continue;
    };
    match message.view() {
      gst::MessageView::Eos(..) => break Ok(()),
      gst::MessageView::Error(err) => {
        break Err(PlaybackError::PipelineError(err.error().to_string()));
      }
      _ => {}
    }
  };

  if let Err(e) = playbin.set_state(gst::State::Null) {
    warn!("Failed to stop playback pipeline: {}", e);
  }
  result
}
