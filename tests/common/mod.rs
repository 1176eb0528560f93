// 该文件是 Danqing （丹青） 项目的一部分。
// tests/common/mod.rs - 测试公共工具
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

#![allow(dead_code)]

use std::{
  path::{Path, PathBuf},
  sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
    mpsc::Receiver,
  },
};

use danqing::{
  config::{CHROMA_CHANNELS, COLOR_BIN_COUNT, NETWORK_FILE, POINTS_FILE, ResourceRoot, WEIGHTS_FILE},
  error::FrameError,
  frame::{AsNhwcFrame, RgbNhwcFrame},
  model::{ColorizerBuilder, Colorizer, InferenceEngine, Model, ModelBundle},
  output::Render,
};
use ndarray::{Array2, Array4};

/// 真实网络的输出分辨率
pub const LOGITS_SIZE: usize = 56;

/// 每个临时目录带上进程号，避免并行测试互相覆盖
pub struct TempDir {
  path: PathBuf,
}

impl TempDir {
  pub fn new(name: &str) -> Self {
    let path = std::env::temp_dir().join(format!("danqing-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&path);
    std::fs::create_dir_all(&path).unwrap();
    Self { path }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn join(&self, name: &str) -> PathBuf {
    self.path.join(name)
  }
}

impl Drop for TempDir {
  fn drop(&mut self) {
    let _ = std::fs::remove_dir_all(&self.path);
  }
}

/// 所有分箱的 logits 都相同，softmax 后是均匀分布
pub struct UniformLogits;

impl InferenceEngine for UniformLogits {
  fn forward(&mut self, _input: Array4<f32>) -> Result<Array4<f32>, FrameError> {
    Ok(Array4::zeros((1, COLOR_BIN_COUNT, LOGITS_SIZE, LOGITS_SIZE)))
  }
}

/// 某一个分箱的 logit 远大于其余分箱
pub struct PeakedLogits {
  pub bin: usize,
}

impl InferenceEngine for PeakedLogits {
  fn forward(&mut self, _input: Array4<f32>) -> Result<Array4<f32>, FrameError> {
    let mut logits = Array4::zeros((1, COLOR_BIN_COUNT, LOGITS_SIZE, LOGITS_SIZE));
    logits
      .slice_mut(ndarray::s![0, self.bin, .., ..])
      .fill(1000.0);
    Ok(logits)
  }
}

/// 输出只有两个通道，违反网络输出约定
pub struct TwoChannelEngine;

impl InferenceEngine for TwoChannelEngine {
  fn forward(&mut self, _input: Array4<f32>) -> Result<Array4<f32>, FrameError> {
    Ok(Array4::zeros((1, 2, LOGITS_SIZE, LOGITS_SIZE)))
  }
}

/// 记录调用次数与输入形状
pub struct CountingEngine<E> {
  pub inner: E,
  pub calls: Arc<AtomicUsize>,
  pub shapes: Arc<Mutex<Vec<(usize, usize, usize, usize)>>>,
}

impl<E> CountingEngine<E> {
  pub fn new(inner: E) -> Self {
    Self {
      inner,
      calls: Arc::new(AtomicUsize::new(0)),
      shapes: Arc::new(Mutex::new(Vec::new())),
    }
  }
}

impl<E: InferenceEngine> InferenceEngine for CountingEngine<E> {
  fn forward(&mut self, input: Array4<f32>) -> Result<Array4<f32>, FrameError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.shapes.lock().unwrap().push(input.dim());
    self.inner.forward(input)
  }
}

/// 所有分箱的中心都是同一个 (a, b)
pub fn constant_centers(a: f32, b: f32) -> Array2<f32> {
  Array2::from_shape_fn((COLOR_BIN_COUNT, CHROMA_CHANNELS), |(_, c)| {
    if c == 0 { a } else { b }
  })
}

/// 分箱 k 的中心为 (k - 156, 156 - k)，均值为 (0, 0)
pub fn spread_centers() -> Array2<f32> {
  Array2::from_shape_fn((COLOR_BIN_COUNT, CHROMA_CHANNELS), |(k, c)| {
    let offset = k as f32 - 156.0;
    if c == 0 { offset } else { -offset }
  })
}

/// 在 `root/models/` 下写出一组模型文件；网络和权重只是占位内容
pub fn write_bundle(root: &Path, centers: &Array2<f32>) -> ModelBundle {
  let bundle = ModelBundle::in_root(&ResourceRoot::new(root));
  std::fs::create_dir_all(root.join("models")).unwrap();
  write_network(&bundle.network, WEIGHTS_FILE);
  std::fs::write(&bundle.weights, b"placeholder weights").unwrap();
  ndarray_npy::write_npy(&bundle.points, centers).unwrap();
  assert_eq!(bundle.network.file_name().unwrap(), NETWORK_FILE);
  assert_eq!(bundle.weights.file_name().unwrap(), WEIGHTS_FILE);
  assert_eq!(bundle.points.file_name().unwrap(), POINTS_FILE);
  bundle
}

/// 占位的网络定义，只带外部权重的 location 引用
pub fn write_network(path: &Path, weights_name: &str) {
  let content = format!("placeholder network; external_data location={}", weights_name);
  std::fs::write(path, content).unwrap();
}

/// 用合成引擎组装完整的上色流水线
pub fn colorizer_with<E: InferenceEngine>(
  dir: &TempDir,
  centers: &Array2<f32>,
  engine: E,
) -> Colorizer<E> {
  let bundle = write_bundle(dir.path(), centers);
  ColorizerBuilder::new(bundle)
    .build_with_engine(engine)
    .unwrap()
}

/// 水平灰度渐变
pub fn gray_gradient(width: usize, height: usize) -> RgbNhwcFrame {
  let mut data = Vec::with_capacity(width * height * 3);
  for _ in 0..height {
    for x in 0..width {
      let v = (x * 255 / (width - 1).max(1)) as u8;
      data.extend_from_slice(&[v, v, v]);
    }
  }
  RgbNhwcFrame::from_raw(width, height, data).unwrap()
}

/// 彩色测试图
pub fn color_pattern(width: usize, height: usize) -> RgbNhwcFrame {
  let mut data = Vec::with_capacity(width * height * 3);
  for y in 0..height {
    for x in 0..width {
      data.extend_from_slice(&[
        (x * 255 / width) as u8,
        (y * 255 / height) as u8,
        ((x + y) * 127 / (width + height)) as u8 + 64,
      ]);
    }
  }
  RgbNhwcFrame::from_raw(width, height, data).unwrap()
}

/// 反色模型，用来区分输入与输出
pub struct InvertModel;

pub fn invert(frame: &RgbNhwcFrame) -> RgbNhwcFrame {
  let data = frame.as_nhwc().iter().map(|v| 255 - v).collect();
  RgbNhwcFrame::from_raw(frame.width(), frame.height(), data).unwrap()
}

impl Model for InvertModel {
  type Input = RgbNhwcFrame;
  type Output = RgbNhwcFrame;
  type Error = FrameError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    Ok(invert(input))
  }
}

/// 第 `fail_at` 次（从 1 开始）调用失败
pub struct FailingModel {
  pub fail_at: usize,
  pub calls: usize,
}

impl Model for FailingModel {
  type Input = RgbNhwcFrame;
  type Output = RgbNhwcFrame;
  type Error = FrameError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.calls += 1;
    if self.calls == self.fail_at {
      return Err(FrameError::Inference("synthetic failure".to_string()));
    }
    Ok(input.clone())
  }
}

/// 每次推理前等待放行信号
pub struct GatedModel {
  pub gate: Receiver<()>,
}

impl Model for GatedModel {
  type Input = RgbNhwcFrame;
  type Output = RgbNhwcFrame;
  type Error = FrameError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self
      .gate
      .recv()
      .map_err(|_| FrameError::Inference("gate closed".to_string()))?;
    Ok(invert(input))
  }
}

#[derive(Default)]
pub struct Recorded {
  pub frames: Vec<RgbNhwcFrame>,
  pub finished: bool,
}

/// 记录写入的结果帧以及是否调用了 finish
#[derive(Default, Clone)]
pub struct RecordingOutput {
  pub recorded: Arc<Mutex<Recorded>>,
}

impl Render<RgbNhwcFrame, RgbNhwcFrame> for RecordingOutput {
  type Error = FrameError;

  fn render_result(
    &mut self,
    _frame: &RgbNhwcFrame,
    result: &RgbNhwcFrame,
  ) -> Result<(), Self::Error> {
    self.recorded.lock().unwrap().frames.push(result.clone());
    Ok(())
  }

  fn finish(self) -> Result<(), Self::Error> {
    self.recorded.lock().unwrap().finished = true;
    Ok(())
  }
}

/// 写出一张 PNG 测试图片
pub fn write_png(path: &Path, frame: &RgbNhwcFrame) {
  frame.to_rgb_image().save(path).unwrap();
}
