// 该文件是 Danqing （丹青） 项目的一部分。
// src/output.rs - 输出定义
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

use std::path::Path;

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  frame::{RgbNhwcFrame, StreamInfo},
  input::is_image_path,
};

/// 结果渲染
///
/// `frame` 是原始帧，`result` 是模型输出。`finish` 在最后一帧之后调用一次，
/// 需要收尾的输出（例如封装视频文件）在这里完成。
pub trait Render<Frame, Output>: Sized {
  type Error;

  fn render_result(&mut self, frame: &Frame, result: &Output) -> Result<(), Self::Error>;

  fn finish(self) -> Result<(), Self::Error> {
    Ok(())
  }
}

mod save_image_file;
pub use self::save_image_file::{SaveImageFileError, SaveImageFileOutput, image_save_target};

#[cfg(feature = "gstreamer_output")]
mod gstreamer_video_output;
#[cfg(feature = "gstreamer_output")]
pub use self::gstreamer_video_output::{GStreamerVideoOutput, GStreamerVideoOutputError};

#[cfg(feature = "gstreamer_input")]
mod playback;
#[cfg(feature = "gstreamer_input")]
pub use self::playback::{PlaybackError, play_video, playback_uri};

#[derive(Error, Debug)]
pub enum OutputError {
  #[error("保存图像文件错误: {0}")]
  SaveImageFileError(#[from] SaveImageFileError),
  #[cfg(feature = "gstreamer_output")]
  #[error("GStreamer 视频输出错误: {0}")]
  GStreamerVideoOutputError(#[from] GStreamerVideoOutputError),
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("不支持的输出: {0}")]
  UnsupportedTarget(String),
}

pub enum OutputWrapper {
  SaveImageFileOutput(SaveImageFileOutput),
  #[cfg(feature = "gstreamer_output")]
  GStreamerVideoOutput(GStreamerVideoOutput),
}

impl FromUrl for OutputWrapper {
  type Error = OutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      SaveImageFileOutput::SCHEME => {
        let output = SaveImageFileOutput::from_url(url)?;
        Ok(OutputWrapper::SaveImageFileOutput(output))
      }
      #[cfg(feature = "gstreamer_output")]
      GStreamerVideoOutput::SCHEME => {
        let output = GStreamerVideoOutput::from_url(url)?;
        Ok(OutputWrapper::GStreamerVideoOutput(output))
      }
      _ => Err(OutputError::SchemeMismatch),
    }
  }
}

impl OutputWrapper {
  /// URL 或普通路径，视频输出的尺寸与帧率取自输入流
  pub fn from_location(location: &str, info: &StreamInfo) -> Result<Self, OutputError> {
    if let Ok(url) = Url::parse(location) {
      match url.scheme() {
        SaveImageFileOutput::SCHEME => {
          return Ok(OutputWrapper::SaveImageFileOutput(
            SaveImageFileOutput::from_url(&url)?,
          ));
        }
        #[cfg(feature = "gstreamer_output")]
        GStreamerVideoOutput::SCHEME => {
          return Ok(OutputWrapper::GStreamerVideoOutput(
            GStreamerVideoOutput::from_url_with_info(&url, info)?,
          ));
        }
        _ => {}
      }
    }

    let path = Path::new(location);
    if is_image_path(path) {
      return Ok(OutputWrapper::SaveImageFileOutput(SaveImageFileOutput::new(
        path,
      )));
    }
    Self::create_video(path, info)
  }

  /// 输出写入的文件
  pub fn path(&self) -> &Path {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => output.path(),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output.path(),
    }
  }

  /// 单张图片的输出，路径按 [`image_save_target`] 补全
  ///
  /// 没有扩展名的路径保存为 PNG，而不是交给视频编码器。
  pub fn for_still_image(location: &str) -> Result<Self, OutputError> {
    let path = match Url::parse(location) {
      Ok(url) if url.scheme() == SaveImageFileOutput::SCHEME => decode_url_path(&url),
      Ok(url) if url.scheme().len() > 1 => {
        return Err(OutputError::UnsupportedTarget(format!(
          "图片只能保存到文件: {}",
          location
        )));
      }
      // 相对路径或 Windows 盘符
      _ => location.to_string(),
    };
    let target = image_save_target(Path::new(&path));
    Ok(OutputWrapper::SaveImageFileOutput(SaveImageFileOutput::new(
      target,
    )))
  }

  #[cfg(feature = "gstreamer_output")]
  fn create_video(path: &Path, info: &StreamInfo) -> Result<Self, OutputError> {
    Ok(OutputWrapper::GStreamerVideoOutput(
      GStreamerVideoOutput::create(path, info)?,
    ))
  }

  #[cfg(not(feature = "gstreamer_output"))]
  fn create_video(path: &Path, _info: &StreamInfo) -> Result<Self, OutputError> {
    Err(OutputError::UnsupportedTarget(path.display().to_string()))
  }
}

impl Render<RgbNhwcFrame, RgbNhwcFrame> for OutputWrapper {
  type Error = OutputError;

  fn render_result(
    &mut self,
    frame: &RgbNhwcFrame,
    result: &RgbNhwcFrame,
  ) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => output
        .render_result(frame, result)
        .map_err(OutputError::from),
    }
  }

  fn finish(self) -> Result<(), Self::Error> {
    match self {
      OutputWrapper::SaveImageFileOutput(output) => {
        Render::<RgbNhwcFrame, RgbNhwcFrame>::finish(output).map_err(OutputError::from)
      }
      #[cfg(feature = "gstreamer_output")]
      OutputWrapper::GStreamerVideoOutput(output) => {
        Render::<RgbNhwcFrame, RgbNhwcFrame>::finish(output).map_err(OutputError::from)
      }
    }
  }
}
