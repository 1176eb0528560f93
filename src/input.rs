// 该文件是 Danqing （丹青） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  error::FrameError,
  frame::{RgbNhwcFrame, StreamInfo},
};

/// 帧来源
///
/// 按顺序产出帧；某一帧解码失败时产出一次 `Err`，之后迭代结束。
pub trait FrameSource: Iterator<Item = Result<RgbNhwcFrame, FrameError>> {
  fn stream_info(&self) -> StreamInfo;
}

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError, read_image_frame};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder};

const IMAGE_EXTENSIONS: [&str; 8] = ["jpg", "jpeg", "png", "bmp", "gif", "webp", "tif", "tiff"];

/// 按扩展名判断是否为图片文件
pub fn is_image_path(path: &Path) -> bool {
  path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
    .unwrap_or(false)
}

#[derive(Error, Debug)]
pub enum InputError {
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("Unsupported input source: {0}")]
  UnsupportedSource(String),
}

pub enum InputWrapper {
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() == ImageFileInput::SCHEME {
      let input = ImageFileInput::from_url(url)?;
      return Ok(InputWrapper::ReadImageFile(input));
    }
    #[cfg(feature = "gstreamer_input")]
    {
      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
    }
    Err(InputError::SchemeMismatch)
  }
}

impl InputWrapper {
  fn known_scheme(scheme: &str) -> bool {
    #[cfg(feature = "gstreamer_input")]
    if scheme == GStreamerInputPipelineBuilder::SCHEME {
      return true;
    }
    scheme == ImageFileInput::SCHEME
  }

  /// URL（`image://`、`gst://`）或普通路径
  ///
  /// 普通路径按扩展名区分：图片扩展名读取为单帧图片，其余视为视频文件。
  pub fn from_location(location: &str) -> Result<Self, InputError> {
    if let Ok(url) = Url::parse(location)
      && Self::known_scheme(url.scheme())
    {
      return Self::from_url(&url);
    }

    let path = Path::new(location);
    if is_image_path(path) {
      debug!("按图片文件打开: {}", location);
      return Ok(InputWrapper::ReadImageFile(ImageFileInput::open(path)?));
    }
    Self::open_video(path)
  }

  /// 只接受图片的场合（交互模式）把位置解析为本地路径
  ///
  /// `image://` 地址解码为路径，其他 URL 方案直接拒绝。
  pub fn image_path(location: &str) -> Result<PathBuf, InputError> {
    match Url::parse(location) {
      Ok(url) if url.scheme() == ImageFileInput::SCHEME => Ok(PathBuf::from(decode_url_path(&url))),
      Ok(url) if url.scheme().len() > 1 => Err(InputError::UnsupportedSource(format!(
        "这里只能打开图片文件: {}",
        location
      ))),
      _ => Ok(PathBuf::from(location)),
    }
  }

  #[cfg(feature = "gstreamer_input")]
  fn open_video(path: &Path) -> Result<Self, InputError> {
    debug!("按视频文件打开: {}", path.display());
    Ok(InputWrapper::GStreamerInput(GStreamerInput::open(path)?))
  }

  #[cfg(not(feature = "gstreamer_input"))]
  fn open_video(path: &Path) -> Result<Self, InputError> {
    Err(InputError::UnsupportedSource(path.display().to_string()))
  }
}

impl Iterator for InputWrapper {
  type Item = Result<RgbNhwcFrame, FrameError>;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      InputWrapper::ReadImageFile(input) => input.next(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next(),
    }
  }
}

impl FrameSource for InputWrapper {
  fn stream_info(&self) -> StreamInfo {
    match self {
      InputWrapper::ReadImageFile(input) => input.stream_info(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.stream_info(),
    }
  }
}
