// 该文件是 Danqing （丹青） 项目的一部分。
// src/color.rs - sRGB 与 CIE Lab 互转
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

use ndarray::Array2;
use palette::{FromColor, Lab, LinSrgb, Srgb, convert::IntoColorUnclamped};

use crate::{error::FrameError, frame::RgbNhwcFrame};

/// Lab 三个平面，均为 (height, width)
#[derive(Debug, Clone)]
pub struct LabImage {
  pub l: Array2<f32>,
  pub a: Array2<f32>,
  pub b: Array2<f32>,
}

impl LabImage {
  pub fn width(&self) -> usize {
    self.l.ncols()
  }

  pub fn height(&self) -> usize {
    self.l.nrows()
  }
}

/// 单个像素 sRGB (0-1) 转 Lab (D65)
pub fn srgb_to_lab(rgb: [f32; 3]) -> [f32; 3] {
  let linear: LinSrgb<f32> = Srgb::new(rgb[0], rgb[1], rgb[2]).into_linear();
  let lab = Lab::from_color(linear);
  [lab.l, lab.a, lab.b]
}

/// 单个像素 Lab 转 sRGB，结果未截断，可能越界
///
/// 线性空间内不做截断，越界值经过伽马曲线后统一交给 [`quantize`] 处理。
pub fn lab_to_srgb(lab: [f32; 3]) -> [f32; 3] {
  let linear: LinSrgb<f32> = Lab::new(lab[0], lab[1], lab[2]).into_color_unclamped();
  let srgb: Srgb<f32> = Srgb::from_linear(linear);
  [srgb.red, srgb.green, srgb.blue]
}

/// 归一化到 [0, 1] 后转换到 Lab
pub fn frame_to_lab(frame: &RgbNhwcFrame) -> LabImage {
  let shape = (frame.height(), frame.width());
  let mut l = Array2::<f32>::zeros(shape);
  let mut a = Array2::<f32>::zeros(shape);
  let mut b = Array2::<f32>::zeros(shape);

  for (index, pixel) in frame.pixels().enumerate() {
    let position = (index / frame.width(), index % frame.width());
    let [lv, av, bv] = srgb_to_lab([
      pixel[0] as f32 / 255.0,
      pixel[1] as f32 / 255.0,
      pixel[2] as f32 / 255.0,
    ]);
    l[position] = lv;
    a[position] = av;
    b[position] = bv;
  }

  LabImage { l, a, b }
}

/// Lab 转回 sRGB，截断到 [0, 1] 后量化为 8 位
pub fn lab_to_frame(lab: &LabImage) -> Result<RgbNhwcFrame, FrameError> {
  if lab.a.dim() != lab.l.dim() || lab.b.dim() != lab.l.dim() {
    return Err(FrameError::InvalidFrame(format!(
      "Lab 平面尺寸不一致: L {:?}, a {:?}, b {:?}",
      lab.l.dim(),
      lab.a.dim(),
      lab.b.dim()
    )));
  }

  let mut data = Vec::with_capacity(lab.l.len() * 3);
  for ((&l, &a), &b) in lab.l.iter().zip(lab.a.iter()).zip(lab.b.iter()) {
    for channel in lab_to_srgb([l, a, b]) {
      data.push(quantize(channel));
    }
  }

  RgbNhwcFrame::from_raw(lab.width(), lab.height(), data)
}

/// 截断到 [0, 1]，乘 255 后向零取整
fn quantize(value: f32) -> u8 {
  (value.clamp(0.0, 1.0) * 255.0) as u8
}
