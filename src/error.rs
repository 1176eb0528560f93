// 该文件是 Danqing （丹青） 项目的一部分。
// src/error.rs - 加载错误与帧错误
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

use std::path::PathBuf;

use thiserror::Error;

/// 模型加载错误
///
/// 网络定义、权重或聚类中心表缺失或损坏。对整个会话是致命的，不做重试。
#[derive(Error, Debug)]
pub enum LoadError {
  #[error("缺少{kind}文件: {}", path.display())]
  MissingArtifact { kind: &'static str, path: PathBuf },
  #[error("{kind}文件为空: {}", path.display())]
  EmptyArtifact { kind: &'static str, path: PathBuf },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("聚类中心表无效: {0}")]
  ClusterTable(String),
  #[error("推理引擎错误: {0}")]
  Runtime(String),
  #[error("未知的注入层: {0}")]
  UnknownLayer(String),
  #[error("层 {layer} 参数形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  BlobShape {
    layer: String,
    expected: Vec<usize>,
    actual: Vec<usize>,
  },
  #[error("层 {0} 尚未注入参数")]
  LayerNotInjected(&'static str),
  #[error("网络输出不符合约定: {0}")]
  OutputContract(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("网络定义与权重文件不一致: {0}")]
  InconsistentBundle(String),
}

/// 单帧错误
///
/// 某一张图片或某一帧无法解码或处理。只影响当前调用，已加载的网络保持可用。
#[derive(Error, Debug)]
pub enum FrameError {
  #[error("无法解码 {source_name}: {reason}")]
  Decode { source_name: String, reason: String },
  #[error("帧数据无效: {0}")]
  InvalidFrame(String),
  #[error("推理失败: {0}")]
  Inference(String),
}

impl FrameError {
  pub fn decode(source_name: impl Into<String>, reason: impl ToString) -> Self {
    FrameError::Decode {
      source_name: source_name.into(),
      reason: reason.to_string(),
    }
  }
}
