// 该文件是 Danqing （丹青） 项目的一部分。
// src/resize.rs - 浮点平面双线性缩放
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

//! Lab 平面的取值范围超出 `image` 浮点像素的 [0, 1] 约定，所以在 ndarray 上直接做双线性插值。
//! 采样点使用像素中心对齐：`src = (dst + 0.5) * scale - 0.5`，越界时钳到边缘。

use ndarray::{Array2, ArrayView2};

/// 一个方向上的采样表：(左侧索引, 右侧索引, 右侧权重)
fn sample_table(src_len: usize, dst_len: usize) -> Vec<(usize, usize, f32)> {
  let scale = src_len as f64 / dst_len as f64;
  let last = src_len - 1;

  (0..dst_len)
    .map(|dst| {
      let pos = (dst as f64 + 0.5) * scale - 0.5;
      let floor = pos.floor();
      let (left, weight) = if pos <= 0.0 {
        (0, 0.0)
      } else if floor as usize >= last {
        (last, 0.0)
      } else {
        (floor as usize, (pos - floor) as f32)
      };
      (left, (left + 1).min(last), weight)
    })
    .collect()
}

/// 双线性缩放到 (height, width)
///
/// 空平面或目标尺寸为 0 时返回空数组。
pub fn resize_bilinear(src: ArrayView2<'_, f32>, height: usize, width: usize) -> Array2<f32> {
  let (src_h, src_w) = src.dim();
  if src_h == 0 || src_w == 0 || height == 0 || width == 0 {
    return Array2::zeros((height, width));
  }
  if (src_h, src_w) == (height, width) {
    return src.to_owned();
  }

  let rows = sample_table(src_h, height);
  let cols = sample_table(src_w, width);

  Array2::from_shape_fn((height, width), |(y, x)| {
    let (y0, y1, wy) = rows[y];
    let (x0, x1, wx) = cols[x];
    let top = src[(y0, x0)] * (1.0 - wx) + src[(y0, x1)] * wx;
    let bottom = src[(y1, x0)] * (1.0 - wx) + src[(y1, x1)] * wx;
    top * (1.0 - wy) + bottom * wy
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::array;

  #[test]
  fn test_constant_plane_stays_constant() {
    let src = Array2::from_elem((7, 5), 42.5f32);
    let dst = resize_bilinear(src.view(), 224, 224);
    assert_eq!(dst.dim(), (224, 224));
    assert!(dst.iter().all(|&v| (v - 42.5).abs() < 1e-4));
  }

  #[test]
  fn test_same_size_is_identity() {
    let src = array![[1.0f32, -2.0], [3.5, 100.0]];
    assert_eq!(resize_bilinear(src.view(), 2, 2), src);
  }

  #[test]
  fn test_upscale_uses_pixel_centers() {
    let src = array![[0.0f32, 1.0]];
    let dst = resize_bilinear(src.view(), 1, 4);
    let expected = [0.0f32, 0.25, 0.75, 1.0];
    for (v, e) in dst.iter().zip(expected) {
      assert!((v - e).abs() < 1e-6, "{} vs {}", v, e);
    }
  }

  #[test]
  fn test_downscale_by_two_averages_pairs() {
    let src = array![[0.0f32, 2.0, 4.0, 6.0]];
    let dst = resize_bilinear(src.view(), 1, 2);
    assert!((dst[(0, 0)] - 1.0).abs() < 1e-6);
    assert!((dst[(0, 1)] - 5.0).abs() < 1e-6);
  }

  #[test]
  fn test_keeps_values_outside_unit_range() {
    let src = array![[-128.0f32, 127.0], [-128.0, 127.0]];
    let dst = resize_bilinear(src.view(), 3, 3);
    assert!((dst[(1, 0)] + 128.0).abs() < 1e-4);
    assert!((dst[(1, 2)] - 127.0).abs() < 1e-4);
  }
}
