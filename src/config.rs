// 该文件是 Danqing （丹青） 项目的一部分。
// src/config.rs - 常量与资源目录
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

use std::{
  ffi::OsString,
  path::{Path, PathBuf},
};

use tracing::debug;

// 网络输入输出约定
pub const NETWORK_INPUT_SIZE: usize = 224;
pub const COLOR_BIN_COUNT: usize = 313;
pub const CHROMA_CHANNELS: usize = 2;
pub const REBALANCE_FACTOR: f32 = 2.606;
pub const LIGHTNESS_BIAS: f32 = 50.0;

// 注入参数的两个层名
pub const REBALANCE_LAYER: &str = "conv8_313_rh";
pub const PROJECTION_LAYER: &str = "class8_ab";

// 预览尺寸
pub const PREVIEW_SIZE: u32 = 400;

// 模型文件
pub const MODEL_DIR: &str = "models";
pub const NETWORK_FILE: &str = "colorization_deploy_v2.onnx";
pub const WEIGHTS_FILE: &str = "colorization_release_v2.onnx.data";
pub const POINTS_FILE: &str = "pts_in_hull.npy";

/// 指定资源目录的环境变量
pub const RESOURCE_ROOT_ENV: &str = "DANQING_RESOURCE_ROOT";

/// 应用资源根目录
///
/// 支持开发布局（当前目录下的 `models/`）和打包布局（可执行文件旁的 `models/`）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRoot {
  root: PathBuf,
}

impl ResourceRoot {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// 依次尝试环境变量、可执行文件目录、当前目录
  pub fn resolve() -> Self {
    let exe_dir = std::env::current_exe()
      .ok()
      .and_then(|exe| exe.parent().map(Path::to_path_buf));
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    Self::resolve_from(std::env::var_os(RESOURCE_ROOT_ENV), exe_dir, cwd)
  }

  fn resolve_from(env_root: Option<OsString>, exe_dir: Option<PathBuf>, cwd: PathBuf) -> Self {
    if let Some(root) = env_root.filter(|root| !root.is_empty()) {
      debug!("使用环境变量 {} 指定的资源目录", RESOURCE_ROOT_ENV);
      return Self::new(root);
    }

    // 打包布局：models/ 与可执行文件放在一起
    if let Some(dir) = exe_dir.filter(|dir| dir.join(MODEL_DIR).is_dir()) {
      debug!("使用可执行文件所在目录: {}", dir.display());
      return Self::new(dir);
    }

    debug!("使用当前工作目录: {}", cwd.display());
    Self::new(cwd)
  }

  pub fn path(&self) -> &Path {
    &self.root
  }

  /// 解析相对于资源根目录的路径
  pub fn join(&self, relative: impl AsRef<Path>) -> PathBuf {
    self.root.join(relative)
  }

  pub fn model_dir(&self) -> PathBuf {
    self.root.join(MODEL_DIR)
  }
}
