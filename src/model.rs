// 该文件是 Danqing （丹青） 项目的一部分。
// src/model.rs - 模型
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

use ndarray::Array4;

use crate::error::FrameError;

/// 帧级模型：一帧输入，一个结果
///
/// 推理需要独占访问，同一时刻只有一次调用在进行。
pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model + ?Sized> Model for &mut M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

/// 不透明的推理引擎，`forward(NCHW) -> NCHW`
pub trait InferenceEngine {
  fn forward(&mut self, input: Array4<f32>) -> Result<Array4<f32>, FrameError>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
  fn forward(&mut self, input: Array4<f32>) -> Result<Array4<f32>, FrameError> {
    (**self).forward(input)
  }
}

mod bundle;
mod colorizer;
mod head;
mod onnx;

pub use self::bundle::ModelBundle;
pub use self::colorizer::{COLORIZER_SCHEME, Colorization, Colorizer, ColorizerBuilder};
pub use self::head::ColorHead;
pub use self::onnx::OnnxEngine;
