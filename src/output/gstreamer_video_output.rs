// 该文件是 Danqing （丹青） 项目的一部分。
// src/output/gstreamer_video_output.rs - GStreamer 视频文件输出
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

//! # GStreamer 视频文件输出
//!
//! 把上色后的帧编码为 H.264 并封装为 MP4。尺寸和帧率与输入流保持一致，
//! 帧率不可知时使用 30/1。
//!
//! ## URL Scheme
//!
//! `gst:///output.mp4?width=1280&height=720&fps=30000/1001`
//!
//! 与输入流一起使用时通过 [`GStreamerVideoOutput::create`] 直接传入流信息。
//!
//! ## 收尾
//!
//! 必须调用 `finish`：发送 EOS 并等待 mp4mux 写完文件索引，
//! 否则文件无法播放。

use std::path::{Path, PathBuf};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  frame::{AsNhwcFrame, FrameRate, RgbNhwcFrame, StreamInfo},
  output::Render,
  quote_pipeline_value,
};

const EOS_TIMEOUT_SECS: u64 = 30;

/// GStreamer 视频输出错误类型
#[derive(Error, Debug)]
pub enum GStreamerVideoOutputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("Invalid parameter: {0}")]
  InvalidParameter(String),
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsrc element")]
  AppSrcNotFound,
  #[error("Failed to convert element to appsrc")]
  AppSrcConversionFailed,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
  #[error("Buffer creation error")]
  BufferCreationError,
  #[error("Frame size mismatch: expected {expected:?}, got {actual:?}")]
  FrameSizeMismatch {
    expected: (usize, usize),
    actual: (usize, usize),
  },
}

/// 解析 `30`、`25/1`、`30000/1001` 形式的帧率
fn parse_frame_rate(value: &str) -> Option<FrameRate> {
  match value.split_once('/') {
    Some((numer, denom)) => FrameRate::new(numer.trim().parse().ok()?, denom.trim().parse().ok()?),
    None => FrameRate::new(value.trim().parse().ok()?, 1),
  }
}

/// GStreamer 视频文件输出
pub struct GStreamerVideoOutput {
  pipeline: gst::Pipeline,
  appsrc: gst_app::AppSrc,
  path: PathBuf,
  info: StreamInfo,
  frame_rate: FrameRate,
  frame_count: u64,
  finished: bool,
}

impl FromUrlWithScheme for GStreamerVideoOutput {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  /// URL 中必须给出 `width` 和 `height`
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let info = StreamInfo {
      width: 0,
      height: 0,
      frame_rate: None,
    };
    Self::from_url_with_info(url, &info)
  }
}

impl GStreamerVideoOutput {
  /// 查询参数优先，缺省的部分取自 `info`
  pub fn from_url_with_info(url: &Url, info: &StreamInfo) -> Result<Self, GStreamerVideoOutputError> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(GStreamerVideoOutputError::SchemeMismatch);
    }

    let mut info = *info;
    for (key, value) in url.query_pairs() {
      let invalid = || GStreamerVideoOutputError::InvalidParameter(format!("{}={}", key, value));
      match key.as_ref() {
        "width" => info.width = value.parse().map_err(|_| invalid())?,
        "height" => info.height = value.parse().map_err(|_| invalid())?,
        "fps" => info.frame_rate = Some(parse_frame_rate(&value).ok_or_else(invalid)?),
        _ => return Err(invalid()),
      }
    }

    Self::create(decode_url_path(url), &info)
  }

  pub fn create(path: impl AsRef<Path>, info: &StreamInfo) -> Result<Self, GStreamerVideoOutputError> {
    let path = path.as_ref();
    if info.width == 0 || info.height == 0 {
      return Err(GStreamerVideoOutputError::InvalidParameter(format!(
        "视频尺寸无效: {}x{}",
        info.width, info.height
      )));
    }
    let frame_rate = info.frame_rate.unwrap_or(FrameRate::DEFAULT);

    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)
        .map_err(|e| GStreamerVideoOutputError::PipelineError(e.to_string()))?;
    }

    gst::init()?;

    let location = path.to_string_lossy();
    let pipeline_desc = format!(
      "appsrc name=src ! videoconvert ! video/x-raw,format=I420 ! x264enc speed-preset=fast ! h264parse ! mp4mux ! filesink location={}",
      quote_pipeline_value(&location)
    );
    info!("Creating video output pipeline: {}", pipeline_desc);

    let pipeline = gst::parse::launch(&pipeline_desc)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| {
        GStreamerVideoOutputError::PipelineError("Failed to create pipeline".to_string())
      })?;

    let appsrc = pipeline
      .by_name("src")
      .ok_or(GStreamerVideoOutputError::AppSrcNotFound)?
      .downcast::<gst_app::AppSrc>()
      .map_err(|_| GStreamerVideoOutputError::AppSrcConversionFailed)?;

    let caps = gst::Caps::builder("video/x-raw")
      .field("format", "RGB")
      .field("width", info.width as i32)
      .field("height", info.height as i32)
      .field(
        "framerate",
        gst::Fraction::new(frame_rate.numer, frame_rate.denom),
      )
      .build();
    appsrc.set_caps(Some(&caps));
    appsrc.set_format(gst::Format::Time);

    // 启动成功之前不需要补发 EOS
    let mut output = GStreamerVideoOutput {
      pipeline,
      appsrc,
      path: path.to_path_buf(),
      info: *info,
      frame_rate,
      frame_count: 0,
      finished: true,
    };
    output.pipeline.set_state(gst::State::Playing)?;
    output.finished = false;

    info!(
      "Video output initialized: {}x{} @ {}/{} fps -> {}",
      info.width,
      info.height,
      frame_rate.numer,
      frame_rate.denom,
      path.display()
    );
    Ok(output)
  }

  pub fn frame_count(&self) -> u64 {
    self.frame_count
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn push_frame(&mut self, frame: &RgbNhwcFrame) -> Result<(), GStreamerVideoOutputError> {
    let actual = (frame.width(), frame.height());
    let expected = (self.info.width, self.info.height);
    if actual != expected {
      return Err(GStreamerVideoOutputError::FrameSizeMismatch { expected, actual });
    }

    // RGB 的默认行跨度按 4 字节对齐
    let row_bytes = frame.width() * 3;
    let stride = (row_bytes + 3) & !3;
    let data = if stride == row_bytes {
      frame.as_nhwc().to_vec()
    } else {
      let mut padded = vec![0u8; stride * frame.height()];
      for (dst, src) in padded
        .chunks_exact_mut(stride)
        .zip(frame.as_nhwc().chunks_exact(row_bytes))
      {
        dst[..row_bytes].copy_from_slice(src);
      }
      padded
    };

    let mut buffer = gst::Buffer::from_mut_slice(data);
    let (pts, duration) = self.frame_rate.timing_ns(self.frame_count);
    {
      let buffer_ref = buffer
        .get_mut()
        .ok_or(GStreamerVideoOutputError::BufferCreationError)?;
      buffer_ref.set_pts(gst::ClockTime::from_nseconds(pts));
      buffer_ref.set_duration(gst::ClockTime::from_nseconds(duration));
    }

    self.appsrc.push_buffer(buffer).map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to push buffer: {:?}", e))
    })?;
    self.frame_count += 1;
    debug!("写入第 {} 帧", self.frame_count);

    Ok(())
  }

  /// 发送 EOS 并等待封装完成
  fn close(&mut self) -> Result<(), GStreamerVideoOutputError> {
    self.finished = true;
    self.appsrc.end_of_stream().map_err(|e| {
      GStreamerVideoOutputError::PipelineError(format!("Failed to send EOS: {:?}", e))
    })?;

    let bus = self
      .pipeline
      .bus()
      .ok_or_else(|| GStreamerVideoOutputError::PipelineError("Pipeline has no bus".to_string()))?;
    let message = bus.timed_pop_filtered(
      gst::ClockTime::from_seconds(EOS_TIMEOUT_SECS),
      &[gst::MessageType::Eos, gst::MessageType::Error],
    );

    match message.as_ref().map(|m| m.view()) {
      Some(gst::MessageView::Eos(..)) => {
        info!(
          "Video output closed. Total frames written: {} -> {}",
          self.frame_count,
          self.path.display()
        );
        Ok(())
      }
      Some(gst::MessageView::Error(err)) => Err(GStreamerVideoOutputError::PipelineError(
        format!("{}", err.error()),
      )),
      _ => Err(GStreamerVideoOutputError::PipelineError(
        "等待视频封装完成超时".to_string(),
      )),
    }
  }
}

impl Drop for GStreamerVideoOutput {
  fn drop(&mut self) {
    if !self.finished {
      warn!("视频输出未正常结束，尝试补发 EOS: {}", self.path.display());
      if let Err(e) = self.close() {
        warn!("Failed to finalize video output: {}", e);
      }
    }

    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer video output pipeline: {}", e);
    }
  }
}

impl Render<RgbNhwcFrame, RgbNhwcFrame> for GStreamerVideoOutput {
  type Error = GStreamerVideoOutputError;

  fn render_result(
    &mut self,
    _frame: &RgbNhwcFrame,
    result: &RgbNhwcFrame,
  ) -> Result<(), Self::Error> {
    self.push_frame(result)
  }

  fn finish(mut self) -> Result<(), Self::Error> {
    self.close()
  }
}
