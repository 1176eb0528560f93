// 该文件是 Danqing （丹青） 项目的一部分。
// src/frame.rs - NHWC 帧定义
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

use image::RgbImage;

use crate::error::FrameError;

const RGB_CHANNELS: usize = 3;

pub trait AsNhwcFrame {
  fn as_nhwc(&self) -> &[u8];
}

/// RGB 帧，按 HWC 顺序存放 8 位通道
///
/// 构造后不可修改，流水线的每一步都产生新的帧。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbNhwcFrame {
  width: usize,
  height: usize,
  data: Box<[u8]>,
}

impl RgbNhwcFrame {
  pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self, FrameError> {
    if width == 0 || height == 0 {
      return Err(FrameError::InvalidFrame(format!(
        "帧尺寸为空: {}x{}",
        width, height
      )));
    }
    let expected = RGB_CHANNELS * width * height;
    if data.len() != expected {
      return Err(FrameError::InvalidFrame(format!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        expected,
        data.len()
      )));
    }

    Ok(Self {
      width,
      height,
      data: data.into_boxed_slice(),
    })
  }

  /// 每个像素都相同的帧
  pub fn filled(width: usize, height: usize, rgb: [u8; 3]) -> Result<Self, FrameError> {
    let data = rgb
      .iter()
      .copied()
      .cycle()
      .take(RGB_CHANNELS * width * height)
      .collect();
    Self::from_raw(width, height, data)
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
    let index = (y * self.width + x) * RGB_CHANNELS;
    [self.data[index], self.data[index + 1], self.data[index + 2]]
  }

  pub fn pixels(&self) -> impl Iterator<Item = [u8; 3]> + '_ {
    self
      .data
      .chunks_exact(RGB_CHANNELS)
      .map(|p| [p[0], p[1], p[2]])
  }

  pub fn to_rgb_image(&self) -> RgbImage {
    // 尺寸与长度在构造时已经校验
    RgbImage::from_fn(self.width as u32, self.height as u32, |x, y| {
      image::Rgb(self.pixel(x as usize, y as usize))
    })
  }
}

impl AsNhwcFrame for RgbNhwcFrame {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

impl TryFrom<RgbImage> for RgbNhwcFrame {
  type Error = FrameError;

  fn try_from(image: RgbImage) -> Result<Self, Self::Error> {
    let (width, height) = image.dimensions();
    Self::from_raw(width as usize, height as usize, image.into_raw())
  }
}

/// 精确帧率（分数形式）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRate {
  pub numer: i32,
  pub denom: i32,
}

impl FrameRate {
  pub const DEFAULT: FrameRate = FrameRate {
    numer: 30,
    denom: 1,
  };

  pub fn new(numer: i32, denom: i32) -> Option<Self> {
    (numer > 0 && denom > 0).then_some(Self { numer, denom })
  }

  pub fn as_f64(&self) -> f64 {
    self.numer as f64 / self.denom as f64
  }

  /// 第 `index` 帧的时间戳与时长（纳秒）
  pub fn timing_ns(&self, index: u64) -> (u64, u64) {
    let numer = self.numer as u64;
    let denom = self.denom as u64;
    let pts = index * denom * 1_000_000_000 / numer;
    let next = (index + 1) * denom * 1_000_000_000 / numer;
    (pts, next - pts)
  }
}

/// 输入流的基本信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
  pub width: usize,
  pub height: usize,
  pub frame_rate: Option<FrameRate>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_from_raw_rejects_length_mismatch() {
    let err = RgbNhwcFrame::from_raw(2, 2, vec![0u8; 11]).unwrap_err();
    assert!(matches!(err, FrameError::InvalidFrame(_)));
  }

  #[test]
  fn test_from_raw_rejects_empty() {
    assert!(RgbNhwcFrame::from_raw(0, 4, Vec::new()).is_err());
  }

  #[test]
  fn test_rgb_image_conversion_keeps_layout() {
    let mut image = RgbImage::new(3, 2);
    image.put_pixel(2, 1, image::Rgb([10, 20, 30]));
    let frame = RgbNhwcFrame::try_from(image.clone()).unwrap();
    assert_eq!(frame.width(), 3);
    assert_eq!(frame.height(), 2);
    assert_eq!(frame.pixel(2, 1), [10, 20, 30]);
    assert_eq!(frame.to_rgb_image(), image);
  }

  #[test]
  fn test_ntsc_frame_timing() {
    let rate = FrameRate::new(30000, 1001).unwrap();
    let (pts, duration) = rate.timing_ns(0);
    assert_eq!(pts, 0);
    assert_eq!(duration, 33_366_666);
    let (pts, _) = rate.timing_ns(30000);
    assert_eq!(pts, 1001 * 1_000_000_000);
  }

  #[test]
  fn test_frame_rate_rejects_zero() {
    assert!(FrameRate::new(0, 1).is_none());
    assert!(FrameRate::new(25, 0).is_none());
  }
}
