// 该文件是 Danqing （丹青） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 视频文件输入
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

//! # GStreamer 视频文件输入
//!
//! 通过 `decodebin` 解码任意容器与编码，统一转换为 RGB 后逐帧交给调用方。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## 用法
//!
//! ```no_run
//! use danqing::input::{FrameSource, GStreamerInput};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let input = GStreamerInput::open("clip.mp4")?;
//! println!("{:?}", input.stream_info());
//! for frame in input {
//!     let frame = frame?;
//!     println!("帧: {}x{}", frame.width(), frame.height());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! URL 形式为 `gst://file/<路径>`。
//!
//! ## 帧的交付
//!
//! appsink 不丢帧（`drop=false`）且不按时钟同步（`sync=false`），
//! 所以离线处理时每一帧都会按顺序交付。

use std::path::{Path, PathBuf};

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path, quote_pipeline_value,
  error::FrameError,
  frame::{FrameRate, RgbNhwcFrame, StreamInfo},
  input::FrameSource,
};

const PREROLL_TIMEOUT_SECS: u64 = 10;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://file/..."）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("File not found: {0}")]
  FileNotFound(String),
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  #[error("Unsupported video format")]
  UnsupportedFormat,
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

pub enum GStreamerInputBuilderItem {
  FileSource(PathBuf),
  TargetFormat { format: String },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        let location = path.to_string_lossy();
        format!("filesrc location={} ! decodebin", quote_pipeline_value(&location))
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
    }
  }
}

/// GStreamer 输入管道构建器
pub struct GStreamerInputPipelineBuilder {
  source_name: String,
  items: Vec<GStreamerInputBuilderItem>,
}

impl GStreamerInputPipelineBuilder {
  pub fn file(path: impl AsRef<Path>) -> Self {
    let path = path.as_ref();
    Self {
      source_name: path.display().to_string(),
      items: vec![
        GStreamerInputBuilderItem::FileSource(path.to_path_buf()),
        GStreamerInputBuilderItem::TargetFormat {
          format: "RGB".to_string(),
        },
      ],
    }
  }

  pub fn description(&self) -> String {
    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    format!(
      "{} ! appsink name=sink sync=false max-buffers=4 drop=false",
      basic_pipeline
    )
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.description();
    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    let mut input = GStreamerInput {
      pipeline,
      appsink,
      source_name: self.source_name,
      info: StreamInfo {
        width: 0,
        height: 0,
        frame_rate: None,
      },
      finished: false,
    };
    // 出错时 Drop 负责把管道置回 Null
    input.preroll()?;
    Ok(input)
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    match url.host_str() {
      Some("file") => Ok(Self::file(decode_url_path(url))),
      _ => Err(GStreamerInputError::SchemeMismatch),
    }
  }
}

/// GStreamer 视频输入
///
/// 打开时先预读到第一帧以获得尺寸与帧率，之后按顺序产出 RGB 帧。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  source_name: String,
  info: StreamInfo,
  finished: bool,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, GStreamerInputError> {
    let path = path.as_ref();
    if !path.is_file() {
      return Err(GStreamerInputError::FileNotFound(path.display().to_string()));
    }
    GStreamerInputPipelineBuilder::file(path).build()
  }

  fn preroll(&mut self) -> Result<(), GStreamerInputError> {
    self.pipeline.set_state(gst::State::Paused)?;
    let (result, _, _) = self
      .pipeline
      .state(gst::ClockTime::from_seconds(PREROLL_TIMEOUT_SECS));
    if let Err(e) = result {
      let reason = self.bus_error().unwrap_or_else(|| e.to_string());
      return Err(GStreamerInputError::PipelineError(reason));
    }

    // 预读的样本在进入 Playing 后仍由第一次 pull_sample 返回
    let preroll = self
      .appsink
      .pull_preroll()
      .map_err(|_| GStreamerInputError::PipelineError("视频中没有可解码的帧".to_string()))?;
    let caps = preroll
      .caps()
      .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;
    let video_info =
      gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

    let fps = video_info.fps();
    self.info = StreamInfo {
      width: video_info.width() as usize,
      height: video_info.height() as usize,
      frame_rate: FrameRate::new(fps.numer(), fps.denom()),
    };
    info!(
      "打开视频 {}: {}x{}, 帧率 {:?}",
      self.source_name, self.info.width, self.info.height, self.info.frame_rate
    );

    self.pipeline.set_state(gst::State::Playing)?;
    Ok(())
  }

  fn bus_error(&self) -> Option<String> {
    let bus = self.pipeline.bus()?;
    let message = bus.pop_filtered(&[gst::MessageType::Error])?;
    match message.view() {
      gst::MessageView::Error(err) => Some(match err.debug() {
        Some(debug) => format!("{} ({})", err.error(), debug),
        None => err.error().to_string(),
      }),
      _ => None,
    }
  }
}

impl Iterator for GStreamerInput {
  type Item = Result<RgbNhwcFrame, FrameError>;

  fn next(&mut self) -> Option<Self::Item> {
    if self.finished {
      return None;
    }

    match self.appsink.pull_sample() {
      Ok(sample) => {
        let frame = convert_sample(&sample).map_err(|e| {
          error!("Failed to convert sample: {}", e);
          FrameError::decode(&self.source_name, e)
        });
        self.finished = frame.is_err();
        Some(frame)
      }
      Err(_) => {
        self.finished = true;
        // 解复用器出错时会先发 Error 再推 EOS，所以 EOS 之前也要查总线
        end_of_stream(&self.source_name, self.appsink.is_eos(), self.bus_error())
      }
    }
  }
}

/// 拉取失败后的收尾：总线上有错误就报告一次，干净的 EOS 正常结束
fn end_of_stream(
  source_name: &str,
  eos: bool,
  bus_error: Option<String>,
) -> Option<Result<RgbNhwcFrame, FrameError>> {
  match (bus_error, eos) {
    (Some(reason), _) => {
      error!("Failed to pull sample: {}", reason);
      Some(Err(FrameError::decode(source_name, reason)))
    }
    (None, true) => {
      debug!("视频流结束: {}", source_name);
      None
    }
    (None, false) => {
      error!("Failed to pull sample: 管道在结束前停止");
      Some(Err(FrameError::decode(source_name, "管道在结束前停止")))
    }
  }
}

impl FrameSource for GStreamerInput {
  fn stream_info(&self) -> StreamInfo {
    self.info
  }
}

/// 按行拷贝，去掉每行末尾的对齐填充
fn convert_sample(sample: &gst::Sample) -> Result<RgbNhwcFrame, GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;
  if video_info.format() != gst_video::VideoFormat::Rgb {
    return Err(GStreamerInputError::UnsupportedFormat);
  }

  let width = video_info.width() as usize;
  let height = video_info.height() as usize;
  let stride = video_info.stride()[0] as usize;
  let row_bytes = width * 3;

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;
  let data = map.as_slice();

  let expected_size = stride * height.saturating_sub(1) + row_bytes;
  if height == 0 || stride < row_bytes || data.len() < expected_size {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected: expected_size,
      actual: data.len(),
    });
  }

  let mut pixels = Vec::with_capacity(row_bytes * height);
  for row in data.chunks(stride).take(height) {
    pixels.extend_from_slice(&row[..row_bytes]);
  }

  RgbNhwcFrame::from_raw(width, height, pixels)
    .map_err(|e| GStreamerInputError::PipelineError(e.to_string()))
}
