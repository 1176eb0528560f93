// 该文件是 Danqing （丹青） 项目的一部分。
// src/model/bundle.rs - 模型文件组
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

use std::{fs::File, path::PathBuf};

use ndarray::{Array2, ArrayD, Ix2};
use ndarray_npy::ReadNpyExt;
use tracing::{debug, info};

use crate::{
  config::{CHROMA_CHANNELS, COLOR_BIN_COUNT, NETWORK_FILE, POINTS_FILE, ResourceRoot, WEIGHTS_FILE},
  error::LoadError,
};

/// 网络定义、训练权重和聚类中心表三个文件
///
/// 权重是网络定义引用的外部数据文件，两者必须放在同一目录下，
/// 校验时会确认网络定义确实引用了这个权重文件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelBundle {
  pub network: PathBuf,
  pub weights: PathBuf,
  pub points: PathBuf,
}

impl ModelBundle {
  /// 资源目录下 `models/` 中的默认文件名
  pub fn in_root(root: &ResourceRoot) -> Self {
    let dir = root.model_dir();
    Self {
      network: dir.join(NETWORK_FILE),
      weights: dir.join(WEIGHTS_FILE),
      points: dir.join(POINTS_FILE),
    }
  }

  /// 三个文件都必须存在且非空
  pub fn verify(&self) -> Result<(), LoadError> {
    for (kind, path) in [
      ("网络定义", &self.network),
      ("权重", &self.weights),
      ("聚类中心", &self.points),
    ] {
      let metadata = std::fs::metadata(path).map_err(|_| LoadError::MissingArtifact {
        kind,
        path: path.clone(),
      })?;
      if !metadata.is_file() {
        return Err(LoadError::MissingArtifact {
          kind,
          path: path.clone(),
        });
      }
      if metadata.len() == 0 {
        return Err(LoadError::EmptyArtifact {
          kind,
          path: path.clone(),
        });
      }
      debug!(
        "{}文件: {} ({:.2} MB)",
        kind,
        path.display(),
        metadata.len() as f64 / (1024.0 * 1024.0)
      );
    }
    self.verify_weights_reference()
  }

  /// 运行时按网络定义里记录的 `location` 在同一目录下查找外部权重，
  /// 所以权重必须与网络定义同目录，且文件名出现在网络定义中
  fn verify_weights_reference(&self) -> Result<(), LoadError> {
    if self.weights.parent() != self.network.parent() {
      return Err(LoadError::InconsistentBundle(format!(
        "权重 {} 与网络定义 {} 不在同一目录",
        self.weights.display(),
        self.network.display()
      )));
    }

    let name = self
      .weights
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_default();
    let network = std::fs::read(&self.network)?;
    if name.is_empty()
      || !network
        .windows(name.len())
        .any(|window| window == name.as_bytes())
    {
      return Err(LoadError::InconsistentBundle(format!(
        "网络定义 {} 没有引用外部权重 {}",
        self.network.display(),
        name
      )));
    }
    Ok(())
  }

  /// 读取聚类中心表，形状必须是 (313, 2)
  pub fn load_cluster_centers(&self) -> Result<Array2<f32>, LoadError> {
    info!("加载聚类中心表: {}", self.points.display());
    let file = File::open(&self.points)?;
    let table = match ArrayD::<f32>::read_npy(file) {
      Ok(table) => table,
      // 原始表以 float64 保存
      Err(_) => {
        let file = File::open(&self.points)?;
        ArrayD::<f64>::read_npy(file)
          .map_err(|e| LoadError::ClusterTable(e.to_string()))?
          .mapv(|v| v as f32)
      }
    };

    let table = table
      .into_dimensionality::<Ix2>()
      .map_err(|e| LoadError::ClusterTable(format!("维度错误: {}", e)))?;
    if table.dim() != (COLOR_BIN_COUNT, CHROMA_CHANNELS) {
      return Err(LoadError::ClusterTable(format!(
        "期望形状 ({}, {}), 实际 {:?}",
        COLOR_BIN_COUNT,
        CHROMA_CHANNELS,
        table.dim()
      )));
    }
    if table.iter().any(|v| !v.is_finite()) {
      return Err(LoadError::ClusterTable("包含非有限值".to_string()));
    }

    Ok(table)
  }
}
