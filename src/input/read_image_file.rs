// 该文件是 Danqing （丹青） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::ImageReader;
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  error::FrameError,
  frame::{RgbNhwcFrame, StreamInfo},
  input::FrameSource,
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("{0}")]
  Frame(#[from] FrameError),
}

/// 读取并解码一张图片，任何格式都转换为 8 位 RGB
///
/// 格式按文件内容判断，扩展名不可信时也能解码。
pub fn read_image_frame(path: &Path) -> Result<RgbNhwcFrame, FrameError> {
  let source_name = path.display().to_string();
  let image = ImageReader::open(path)
    .and_then(|reader| reader.with_guessed_format())
    .map_err(|e| FrameError::decode(&source_name, e))?
    .decode()
    .map_err(|e| FrameError::decode(&source_name, e))?;

  debug!(
    "读取图片 {}: {}x{} {:?}",
    source_name,
    image.width(),
    image.height(),
    image.color()
  );
  RgbNhwcFrame::try_from(image.into_rgb8())
}

/// 单张图片作为只有一帧的来源
pub struct ImageFileInput {
  info: StreamInfo,
  frame: Option<RgbNhwcFrame>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch);
    }

    Self::open(decode_url_path(url))
  }
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let frame = read_image_frame(path.as_ref())?;
    Ok(Self::from_frame(frame))
  }

  pub fn from_frame(frame: RgbNhwcFrame) -> Self {
    let info = StreamInfo {
      width: frame.width(),
      height: frame.height(),
      frame_rate: None,
    };
    Self {
      info,
      frame: Some(frame),
    }
  }
}

impl Iterator for ImageFileInput {
  type Item = Result<RgbNhwcFrame, FrameError>;

  fn next(&mut self) -> Option<Self::Item> {
    self.frame.take().map(Ok)
  }
}

impl FrameSource for ImageFileInput {
  fn stream_info(&self) -> StreamInfo {
    self.info
  }
}
