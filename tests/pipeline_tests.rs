// 该文件是 Danqing （丹青） 项目的一部分。
// tests/pipeline_tests.rs - 上色流水线测试
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

mod common;

use std::sync::atomic::Ordering;

use danqing::{
  color::frame_to_lab,
  config::NETWORK_INPUT_SIZE,
  error::{FrameError, LoadError},
  frame::RgbNhwcFrame,
  model::{ColorizerBuilder, Model},
};

use common::*;

#[test]
fn test_output_dimensions_match_input() {
  let dir = TempDir::new("pipeline-dims");
  let mut colorizer = colorizer_with(&dir, &spread_centers(), UniformLogits);

  for (width, height) in [(37, 23), (224, 224), (300, 120), (1, 1)] {
    let frame = color_pattern(width, height);
    let colorized = colorizer.infer(&frame).unwrap();
    assert_eq!(colorized.width(), width);
    assert_eq!(colorized.height(), height);
  }
}

#[test]
fn test_network_sees_fixed_size_lightness() {
  let dir = TempDir::new("pipeline-input-shape");
  let engine = CountingEngine::new(UniformLogits);
  let shapes = engine.shapes.clone();
  let mut colorizer = colorizer_with(&dir, &spread_centers(), engine);

  colorizer.infer(&color_pattern(640, 480)).unwrap();

  let shapes = shapes.lock().unwrap();
  // 加载时的预热 + 一次推理
  assert_eq!(shapes.len(), 2);
  for shape in shapes.iter() {
    assert_eq!(*shape, (1, 1, NETWORK_INPUT_SIZE, NETWORK_INPUT_SIZE));
  }
}

#[test]
fn test_gray_input_round_trips_with_neutral_chroma() {
  let dir = TempDir::new("pipeline-gray");
  let mut colorizer = colorizer_with(&dir, &spread_centers(), UniformLogits);

  let frame = gray_gradient(64, 16);
  let colorized = colorizer.infer(&frame).unwrap();

  for (input, output) in frame.pixels().zip(colorized.pixels()) {
    for c in 0..3 {
      let diff = (input[c] as i32 - output[c] as i32).abs();
      assert!(diff <= 1, "input {:?} output {:?}", input, output);
    }
  }
}

#[test]
fn test_lightness_preserved_at_full_resolution() {
  let dir = TempDir::new("pipeline-lightness");
  let mut colorizer = colorizer_with(&dir, &constant_centers(0.0, 0.0), UniformLogits);

  let frame = color_pattern(97, 61);
  let colorized = colorizer.infer(&frame).unwrap();

  let before = frame_to_lab(&frame);
  let after = frame_to_lab(&colorized);
  for (l_in, l_out) in before.l.iter().zip(after.l.iter()) {
    assert!((l_in - l_out).abs() < 1.0, "L {} -> {}", l_in, l_out);
  }
  // 色度全部来自网络，这里是 0
  for (&a, &b) in after.a.iter().zip(after.b.iter()) {
    assert!(a.abs() < 1.5 && b.abs() < 1.5, "a = {}, b = {}", a, b);
  }
}

#[test]
fn test_extreme_chroma_saturates() {
  let dir = TempDir::new("pipeline-saturate");
  let mut colorizer = colorizer_with(&dir, &constant_centers(400.0, -400.0), UniformLogits);

  let frame = RgbNhwcFrame::filled(16, 16, [128, 128, 128]).unwrap();
  let colorized = colorizer.infer(&frame).unwrap();

  for pixel in colorized.pixels() {
    assert!(
      pixel.iter().all(|&c| c == 0 || c == 255),
      "not saturated: {:?}",
      pixel
    );
    assert_eq!(pixel[2], 255);
  }
}

#[test]
fn test_peaked_prediction_follows_cluster_center() {
  let dir = TempDir::new("pipeline-peaked");
  // 分箱 216 的中心是 (60, -60)，偏紫
  let mut colorizer = colorizer_with(&dir, &spread_centers(), PeakedLogits { bin: 216 });

  let frame = RgbNhwcFrame::filled(8, 8, [128, 128, 128]).unwrap();
  let colorized = colorizer.infer(&frame).unwrap();

  let lab = frame_to_lab(&colorized);
  for (&a, &b) in lab.a.iter().zip(lab.b.iter()) {
    assert!((a - 60.0).abs() < 3.0, "a = {}", a);
    assert!((b + 60.0).abs() < 3.0, "b = {}", b);
  }
  let [r, g, b] = colorized.pixel(4, 4);
  assert!(r > g && b > g, "pixel {:?}", [r, g, b]);
}

#[test]
fn test_colorization_is_deterministic() {
  let dir = TempDir::new("pipeline-deterministic");
  let mut colorizer = colorizer_with(&dir, &spread_centers(), PeakedLogits { bin: 40 });

  let frame = color_pattern(53, 29);
  let first = colorizer.infer(&frame).unwrap();
  let second = colorizer.infer(&frame).unwrap();
  assert_eq!(first, second);
}

#[test]
fn test_colorize_keeps_original() {
  let dir = TempDir::new("pipeline-original");
  let mut colorizer = colorizer_with(&dir, &spread_centers(), UniformLogits);

  let frame = color_pattern(20, 10);
  let colorization = colorizer.colorize(frame.clone()).unwrap();
  assert_eq!(colorization.original, frame);
  assert_eq!(colorization.colorized.width(), 20);
}

#[test]
fn test_unreadable_path_does_not_poison_colorizer() {
  let dir = TempDir::new("pipeline-bad-path");
  let mut colorizer = colorizer_with(&dir, &spread_centers(), UniformLogits);

  let err = colorizer
    .colorize_path(dir.join("missing.png"))
    .unwrap_err();
  assert!(matches!(err, FrameError::Decode { .. }));

  let garbage = dir.join("garbage.jpg");
  std::fs::write(&garbage, b"definitely not a jpeg").unwrap();
  assert!(matches!(
    colorizer.colorize_path(&garbage),
    Err(FrameError::Decode { .. })
  ));

  let good = dir.join("good.png");
  write_png(&good, &gray_gradient(32, 32));
  let colorization = colorizer.colorize_path(&good).unwrap();
  assert_eq!(colorization.colorized.width(), 32);
}

#[test]
fn test_output_contract_checked_at_load() {
  let dir = TempDir::new("pipeline-contract");
  let bundle = write_bundle(dir.path(), &spread_centers());
  let engine = CountingEngine::new(TwoChannelEngine);
  let calls = engine.calls.clone();

  let result = ColorizerBuilder::new(bundle).build_with_engine(engine);
  assert!(matches!(result, Err(LoadError::OutputContract(_))));
  // 只有预热调用
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}
