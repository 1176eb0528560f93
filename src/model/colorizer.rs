// 该文件是 Danqing （丹青） 项目的一部分。
// src/model/colorizer.rs - 上色流水线
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

use std::path::{Path, PathBuf};

use ndarray::{Array4, ArrayView2, s};
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, decode_url_path,
  color::{LabImage, frame_to_lab, lab_to_frame},
  config::{LIGHTNESS_BIAS, NETWORK_INPUT_SIZE, REBALANCE_FACTOR, ResourceRoot},
  error::{FrameError, LoadError},
  frame::RgbNhwcFrame,
  input::read_image_frame,
  model::{ColorHead, InferenceEngine, Model, ModelBundle, OnnxEngine},
  resize::resize_bilinear,
};

pub const COLORIZER_SCHEME: &str = "eccv16";

/// 一次上色的结果：原图与上色图
#[derive(Debug, Clone)]
pub struct Colorization {
  pub original: RgbNhwcFrame,
  pub colorized: RgbNhwcFrame,
}

/// 上色流水线
///
/// 只有色度在 224x224 上预测再放大回原尺寸，亮度始终使用原分辨率。
pub struct Colorizer<E = OnnxEngine> {
  engine: E,
  head: ColorHead,
}

impl<E: InferenceEngine> Colorizer<E> {
  /// 组装引擎与分类头，并用全零输入预热一次来校验输出约定
  pub fn from_parts(engine: E, head: ColorHead) -> Result<Self, LoadError> {
    let mut colorizer = Self { engine, head };
    colorizer.warm_up()?;
    Ok(colorizer)
  }

  fn warm_up(&mut self) -> Result<(), LoadError> {
    let input = Array4::<f32>::zeros((1, 1, NETWORK_INPUT_SIZE, NETWORK_INPUT_SIZE));
    let logits = self
      .engine
      .forward(input)
      .map_err(|e| LoadError::OutputContract(e.to_string()))?;

    let (batch, bins, height, width) = logits.dim();
    if batch != 1 || height == 0 || width == 0 {
      return Err(LoadError::OutputContract(format!(
        "输出形状 {:?} 无效",
        logits.dim()
      )));
    }
    self.head.forward(logits.view())?;

    info!(
      "模型预热完成: 输入 1x1x{}x{}, 输出 {}x{}x{}",
      NETWORK_INPUT_SIZE, NETWORK_INPUT_SIZE, bins, height, width
    );
    Ok(())
  }

  /// 上色并同时返回原图
  pub fn colorize(&mut self, source: RgbNhwcFrame) -> Result<Colorization, FrameError> {
    let colorized = self.colorize_frame(&source)?;
    Ok(Colorization {
      original: source,
      colorized,
    })
  }

  /// 读取图片文件并上色
  pub fn colorize_path(&mut self, path: impl AsRef<Path>) -> Result<Colorization, FrameError> {
    let frame = read_image_frame(path.as_ref())?;
    self.colorize(frame)
  }

  fn predict_chroma(&mut self, lightness: ArrayView2<'_, f32>) -> Result<Array4<f32>, FrameError> {
    let mut resized = resize_bilinear(lightness, NETWORK_INPUT_SIZE, NETWORK_INPUT_SIZE);
    resized -= LIGHTNESS_BIAS;

    let input = resized
      .into_shape_with_order((1, 1, NETWORK_INPUT_SIZE, NETWORK_INPUT_SIZE))
      .map_err(|e| FrameError::Inference(e.to_string()))?;
    let logits = self.engine.forward(input)?;
    self
      .head
      .forward(logits.view())
      .map_err(|e| FrameError::Inference(e.to_string()))
  }

  fn colorize_frame(&mut self, frame: &RgbNhwcFrame) -> Result<RgbNhwcFrame, FrameError> {
    let (height, width) = (frame.height(), frame.width());
    let lab = frame_to_lab(frame);
    let ab = self.predict_chroma(lab.l.view())?;
    debug!("色度预测尺寸: {:?}, 放大到 {}x{}", ab.dim(), width, height);

    let a = resize_bilinear(ab.slice(s![0, 0, .., ..]), height, width);
    let b = resize_bilinear(ab.slice(s![0, 1, .., ..]), height, width);
    lab_to_frame(&LabImage { l: lab.l, a, b })
  }
}

impl<E: InferenceEngine> Model for Colorizer<E> {
  type Input = RgbNhwcFrame;
  type Output = RgbNhwcFrame;
  type Error = FrameError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.colorize_frame(input)
  }
}

pub struct ColorizerBuilder {
  bundle: ModelBundle,
}

impl FromUrlWithScheme for ColorizerBuilder {
  const SCHEME: &'static str = COLORIZER_SCHEME;
}

impl FromUrl for ColorizerBuilder {
  type Error = LoadError;

  /// `eccv16:///<资源目录>?network=..&weights=..&points=..`
  ///
  /// 资源目录为空时自动解析；文件名相对于 `models/`。
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LoadError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        Self::SCHEME
      )));
    }

    let root = match decode_url_path(url).as_str() {
      "" | "/" => ResourceRoot::resolve(),
      path => ResourceRoot::new(path),
    };
    let mut bundle = ModelBundle::in_root(&root);
    let model_dir = root.model_dir();
    for (key, value) in url.query_pairs() {
      let path = model_dir.join(PathBuf::from(value.as_ref()));
      match key.as_ref() {
        "network" => bundle.network = path,
        "weights" => bundle.weights = path,
        "points" => bundle.points = path,
        other => {
          return Err(LoadError::ModelPathError(format!("未知参数: {}", other)));
        }
      }
    }

    Ok(Self { bundle })
  }
}

impl ColorizerBuilder {
  pub fn new(bundle: ModelBundle) -> Self {
    Self { bundle }
  }

  pub fn from_resource_root(root: &ResourceRoot) -> Self {
    Self::new(ModelBundle::in_root(root))
  }

  pub fn bundle(&self) -> &ModelBundle {
    &self.bundle
  }

  fn load_head(&self) -> Result<ColorHead, LoadError> {
    self.bundle.verify()?;
    let centers = self.bundle.load_cluster_centers()?;
    ColorHead::with_cluster_centers(&centers, REBALANCE_FACTOR)
  }

  /// 使用 ONNX Runtime 加载网络
  pub fn build(self) -> Result<Colorizer<OnnxEngine>, LoadError> {
    let head = self.load_head()?;
    let engine = OnnxEngine::from_file(&self.bundle.network)?;
    let colorizer = Colorizer::from_parts(engine, head)?;
    info!("模型加载完成");
    Ok(colorizer)
  }

  /// 使用自定义推理引擎，文件组的校验与参数注入不变
  pub fn build_with_engine<E: InferenceEngine>(self, engine: E) -> Result<Colorizer<E>, LoadError> {
    let head = self.load_head()?;
    Colorizer::from_parts(engine, head)
  }
}
