// 该文件是 Danqing （丹青） 项目的一部分。
// src/model/head.rs - 色彩分类头（注入参数的两层）
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

//! 网络主干输出 313 个色彩分箱的 logits，之后的三步在这里完成：
//!
//! 1. `conv8_313_rh`：逐分箱缩放（再平衡系数 2.606）
//! 2. `class8_313_rh`：在分箱维度上做 softmax
//! 3. `class8_ab`：1x1 卷积，把分箱概率投影到 ab 两个通道，权重为聚类中心表的转置
//!
//! 第 1、3 层的参数不随模型发布，必须在第一次推理前按层名注入。

use ndarray::{Array1, Array2, Array4, ArrayView4, Axis};
use tracing::debug;

use crate::{
  config::{CHROMA_CHANNELS, COLOR_BIN_COUNT, PROJECTION_LAYER, REBALANCE_LAYER},
  error::LoadError,
};

#[derive(Debug, Clone)]
struct ScaleLayer {
  name: &'static str,
  // [1, bins]
  blob: Option<Array2<f32>>,
}

#[derive(Debug, Clone)]
struct ProjectionLayer {
  name: &'static str,
  // [channels, bins]
  blob: Option<Array2<f32>>,
}

/// 注入参数的色彩分类头
#[derive(Debug, Clone)]
pub struct ColorHead {
  rebalance: ScaleLayer,
  projection: ProjectionLayer,
}

impl Default for ColorHead {
  fn default() -> Self {
    Self {
      rebalance: ScaleLayer {
        name: REBALANCE_LAYER,
        blob: None,
      },
      projection: ProjectionLayer {
        name: PROJECTION_LAYER,
        blob: None,
      },
    }
  }
}

fn check_shape(layer: &str, expected: [usize; 2], blob: &Array2<f32>) -> Result<(), LoadError> {
  if blob.shape() != expected {
    return Err(LoadError::BlobShape {
      layer: layer.to_string(),
      expected: expected.to_vec(),
      actual: blob.shape().to_vec(),
    });
  }
  Ok(())
}

impl ColorHead {
  /// 按层名注入参数
  pub fn set_blob(&mut self, layer: &str, blob: Array2<f32>) -> Result<(), LoadError> {
    if layer == self.rebalance.name {
      check_shape(layer, [1, COLOR_BIN_COUNT], &blob)?;
      self.rebalance.blob = Some(blob);
    } else if layer == self.projection.name {
      check_shape(layer, [CHROMA_CHANNELS, COLOR_BIN_COUNT], &blob)?;
      self.projection.blob = Some(blob);
    } else {
      return Err(LoadError::UnknownLayer(layer.to_string()));
    }
    debug!("已注入层 {} 的参数", layer);
    Ok(())
  }

  pub fn is_ready(&self) -> bool {
    self.rebalance.blob.is_some() && self.projection.blob.is_some()
  }

  /// 注入聚类中心表 (bins, 2) 和再平衡系数
  pub fn with_cluster_centers(
    cluster_centers: &Array2<f32>,
    rebalance: f32,
  ) -> Result<Self, LoadError> {
    let mut head = Self::default();
    head.set_blob(
      PROJECTION_LAYER,
      cluster_centers.t().as_standard_layout().to_owned(),
    )?;
    head.set_blob(
      REBALANCE_LAYER,
      Array2::from_elem((1, COLOR_BIN_COUNT), rebalance),
    )?;
    Ok(head)
  }

  /// logits (1, bins, h, w) -> ab (1, 2, h, w)
  pub fn forward(&self, logits: ArrayView4<'_, f32>) -> Result<Array4<f32>, LoadError> {
    let scale = self
      .rebalance
      .blob
      .as_ref()
      .ok_or(LoadError::LayerNotInjected(REBALANCE_LAYER))?;
    let weights = self
      .projection
      .blob
      .as_ref()
      .ok_or(LoadError::LayerNotInjected(PROJECTION_LAYER))?;

    let (batch, bins, height, width) = logits.dim();
    if bins != COLOR_BIN_COUNT {
      return Err(LoadError::OutputContract(format!(
        "期望 {} 个色彩分箱, 实际 {}",
        COLOR_BIN_COUNT, bins
      )));
    }

    let scale = scale.row(0);
    let mut output = Array4::<f32>::zeros((batch, CHROMA_CHANNELS, height, width));
    let mut prob = Array1::<f32>::zeros(bins);

    for n in 0..batch {
      for y in 0..height {
        for x in 0..width {
          let column = logits.slice(ndarray::s![n, .., y, x]);

          // 缩放后做数值稳定的 softmax
          let mut max = f32::NEG_INFINITY;
          for (p, (&z, &s)) in prob.iter_mut().zip(column.iter().zip(scale.iter())) {
            *p = z * s;
            max = max.max(*p);
          }
          let mut sum = 0.0f32;
          for p in prob.iter_mut() {
            *p = (*p - max).exp();
            sum += *p;
          }
          prob /= sum;

          for (c, row) in weights.axis_iter(Axis(0)).enumerate() {
            output[(n, c, y, x)] = row.dot(&prob);
          }
        }
      }
    }

    Ok(output)
  }
}
