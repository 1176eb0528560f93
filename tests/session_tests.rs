// 该文件是 Danqing （丹青） 项目的一部分。
// tests/session_tests.rs - 交互式会话测试
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

use std::{sync::mpsc, time::Duration};

use danqing::{
  config::PREVIEW_SIZE,
  session::{Session, SessionError, Status},
};

use common::*;

const WAIT: Duration = Duration::from_secs(30);

#[test]
fn test_open_and_complete() {
  let dir = TempDir::new("session-complete");
  let source = dir.join("gray.png");
  let frame = gray_gradient(120, 80);
  write_png(&source, &frame);

  let mut session = Session::spawn(InvertModel).unwrap();
  assert_eq!(session.status(), &Status::Idle);
  session.open(&source).unwrap();
  assert_eq!(session.wait(WAIT), &Status::Complete(source.clone()));

  let colorization = session.colorization().unwrap();
  assert_eq!(colorization.original, frame);
  assert_eq!(colorization.colorized, invert(&frame));

  let previews = session.previews().unwrap();
  assert_eq!(previews.original.dimensions(), (PREVIEW_SIZE, PREVIEW_SIZE));
  assert_eq!(previews.colorized.dimensions(), (PREVIEW_SIZE, PREVIEW_SIZE));
}

#[test]
fn test_busy_session_refuses_new_image() {
  let dir = TempDir::new("session-busy");
  let first = dir.join("first.png");
  let second = dir.join("second.png");
  write_png(&first, &gray_gradient(16, 16));
  write_png(&second, &gray_gradient(8, 8));

  let (gate, gate_rx) = mpsc::channel();
  let mut session = Session::spawn(GatedModel { gate: gate_rx }).unwrap();
  // 放行端先于会话释放，断言失败时后台线程不会一直等待
  let gate = gate;

  session.open(&first).unwrap();
  assert!(session.is_busy());
  assert!(matches!(session.open(&second), Err(SessionError::Busy(_))));
  assert_eq!(session.poll(), &Status::Processing(first.clone()));

  gate.send(()).unwrap();
  assert_eq!(session.wait(WAIT), &Status::Complete(first.clone()));
  assert_eq!(session.colorization().unwrap().original.width(), 16);

  // 新图片提交后旧结果立即清除
  session.open(&second).unwrap();
  assert!(session.colorization().is_none());
  assert!(session.previews().is_none());
  assert!(matches!(session.save(dir.join("early.png")), Err(SessionError::NoResult)));

  gate.send(()).unwrap();
  assert_eq!(session.wait(WAIT), &Status::Complete(second.clone()));
  assert_eq!(session.colorization().unwrap().original.width(), 8);
}

#[test]
fn test_failure_clears_previews_and_session_recovers() {
  let dir = TempDir::new("session-failure");
  let good = dir.join("good.png");
  write_png(&good, &gray_gradient(32, 32));

  let mut session = Session::spawn(InvertModel).unwrap();
  session.open(&good).unwrap();
  session.wait(WAIT);
  assert!(session.previews().is_some());

  session.open(dir.join("missing.png")).unwrap();
  match session.wait(WAIT) {
    Status::Failed(message) => assert!(message.contains("missing.png"), "{}", message),
    other => panic!("unexpected status: {:?}", other),
  }
  assert!(session.previews().is_none());
  assert!(session.colorization().is_none());

  session.open(&good).unwrap();
  assert_eq!(session.wait(WAIT), &Status::Complete(good.clone()));
}

#[test]
fn test_save_rules() {
  let dir = TempDir::new("session-save");
  let source = dir.join("gray.png");
  write_png(&source, &gray_gradient(40, 20));

  let mut session = Session::spawn(InvertModel).unwrap();
  assert!(matches!(session.save(dir.join("none.png")), Err(SessionError::NoResult)));

  session.open(&source).unwrap();
  session.wait(WAIT);

  let saved = session.save(dir.join("result")).unwrap();
  assert_eq!(saved, dir.join("result.png"));
  assert_eq!(image::open(&saved).unwrap().into_rgb8().dimensions(), (40, 20));

  let saved = session.save(dir.join("result.jpg")).unwrap();
  assert_eq!(
    image::ImageFormat::from_path(&saved).unwrap(),
    image::ImageFormat::Jpeg
  );
  assert!(image::open(&saved).is_ok());

  let outputs = dir.join("outputs");
  std::fs::create_dir_all(&outputs).unwrap();
  let saved = session.save(&outputs).unwrap();
  assert_eq!(saved.parent().unwrap(), outputs.as_path());
  assert!(saved.is_file());

  assert!(matches!(
    session.save(dir.join("result.bmp")),
    Err(SessionError::UnsupportedFormat(_))
  ));
}

#[test]
fn test_session_with_colorizer() {
  let dir = TempDir::new("session-colorizer");
  let source = dir.join("gray.png");
  write_png(&source, &gray_gradient(50, 30));

  let colorizer = colorizer_with(&dir, &spread_centers(), PeakedLogits { bin: 216 });
  let mut session = Session::spawn(colorizer).unwrap();
  session.open(&source).unwrap();
  assert_eq!(session.wait(WAIT), &Status::Complete(source.clone()));

  let colorized = &session.colorization().unwrap().colorized;
  assert_eq!((colorized.width(), colorized.height()), (50, 30));
}
