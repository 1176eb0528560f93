// 该文件是 Danqing （丹青） 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理引擎
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

use ndarray::Array4;
use ort::{
  inputs,
  session::{Session, builder::GraphOptimizationLevel},
  value::Tensor,
};
use tracing::{debug, info};

use crate::{
  error::{FrameError, LoadError},
  model::InferenceEngine,
};

pub struct OnnxEngine {
  session: Session,
}

fn load_session(network: &Path) -> Result<Session, ort::Error> {
  let session = Session::builder()?
    .with_optimization_level(GraphOptimizationLevel::Level3)?
    .commit_from_file(network)?;
  Ok(session)
}

impl OnnxEngine {
  /// 从网络定义文件创建会话，外部权重由运行时在同一目录下解析，
  /// 调用前由 [`ModelBundle::verify`](crate::model::ModelBundle::verify) 确认引用一致
  pub fn from_file(network: &Path) -> Result<Self, LoadError> {
    info!("创建 ONNX Runtime 推理会话: {}", network.display());
    let session = load_session(network).map_err(|e| LoadError::Runtime(e.to_string()))?;
    Ok(Self { session })
  }
}

fn inference_error(e: impl std::fmt::Display) -> FrameError {
  FrameError::Inference(e.to_string())
}

impl InferenceEngine for OnnxEngine {
  fn forward(&mut self, input: Array4<f32>) -> Result<Array4<f32>, FrameError> {
    let (n, c, h, w) = input.dim();
    let (data, _offset) = input.as_standard_layout().into_owned().into_raw_vec_and_offset();
    let input_tensor = Tensor::from_array(([n, c, h, w], data)).map_err(inference_error)?;

    debug!("执行模型推理");
    let outputs = self
      .session
      .run(inputs![input_tensor])
      .map_err(inference_error)?;

    let (shape, data) = outputs[0]
      .try_extract_tensor::<f32>()
      .map_err(inference_error)?;
    debug!("模型输出形状: {:?}", shape);
    if shape.len() != 4 || shape.iter().any(|&d| d < 0) {
      return Err(FrameError::Inference(format!(
        "模型输出形状不符合预期: {:?}",
        shape
      )));
    }

    let dims = (
      shape[0] as usize,
      shape[1] as usize,
      shape[2] as usize,
      shape[3] as usize,
    );
    Array4::from_shape_vec(dims, data.to_vec()).map_err(inference_error)
  }
}
