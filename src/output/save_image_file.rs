// 该文件是 Danqing （丹青） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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
use tracing::info;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, decode_url_path, frame::RgbNhwcFrame, output::Render};

/// 把上色结果保存为图片，格式由扩展名决定
pub struct SaveImageFileOutput {
  path: PathBuf,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(Self::new(decode_url_path(uri)))
  }
}

/// 保存路径的补全规则
///
/// 目录下自动生成带时间戳的文件名，没有扩展名时补 `.png`。
pub fn image_save_target(path: &Path) -> PathBuf {
  if path.is_dir() {
    let name = format!(
      "colorized_{}.png",
      chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    return path.join(name);
  }
  if path.extension().is_none() {
    return path.with_extension("png");
  }
  path.to_path_buf()
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>) -> Self {
    Self { path: path.into() }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn save_frame(&self, frame: &RgbNhwcFrame) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    frame.to_rgb_image().save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }
}

impl Render<RgbNhwcFrame, RgbNhwcFrame> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(
    &mut self,
    _frame: &RgbNhwcFrame,
    result: &RgbNhwcFrame,
  ) -> Result<(), Self::Error> {
    self.save_frame(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_saves_result_and_creates_parent() {
    let dir = std::env::temp_dir().join(format!("danqing-save-image-{}", std::process::id()));
    let path = dir.join("nested").join("out.png");
    let mut output = SaveImageFileOutput::new(&path);

    let original = RgbNhwcFrame::filled(3, 2, [0, 0, 0]).unwrap();
    let colorized = RgbNhwcFrame::filled(3, 2, [200, 100, 50]).unwrap();
    output.render_result(&original, &colorized).unwrap();

    let saved = image::open(&path).unwrap().into_rgb8();
    assert_eq!(saved.dimensions(), (3, 2));
    assert_eq!(saved.get_pixel(1, 1).0, [200, 100, 50]);

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn test_save_target_appends_png() {
    assert_eq!(
      image_save_target(Path::new("/nonexistent/danqing/result")),
      PathBuf::from("/nonexistent/danqing/result.png")
    );
    assert_eq!(
      image_save_target(Path::new("/nonexistent/danqing/result.JPG")),
      PathBuf::from("/nonexistent/danqing/result.JPG")
    );
  }

  #[test]
  fn test_save_target_in_directory() {
    let target = image_save_target(&std::env::temp_dir());
    let name = target.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("colorized_"));
    assert!(name.ends_with(".png"));
  }

  #[test]
  fn test_percent_encoded_url_path() {
    let url = Url::parse("image:///tmp/my%20photo.png").unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), Path::new("/tmp/my photo.png"));
  }
}
