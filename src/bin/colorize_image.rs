// 该文件是 Danqing （丹青） 项目的一部分。
// src/bin/colorize_image.rs - 图片上色程序
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  io::BufRead,
  path::{Path, PathBuf},
  sync::mpsc::{self, RecvTimeoutError},
  thread,
  time::Duration,
};

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

use danqing::{
  FromUrl,
  config::ResourceRoot,
  input::InputWrapper,
  model::{Colorizer, ColorizerBuilder},
  output::OutputWrapper,
  session::{Previews, Session, Status},
  task::{OneShotTask, Task},
};

/// 黑白照片上色
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 eccv16:///opt/danqing；缺省时自动查找资源目录
  #[arg(long, value_name = "MODEL")]
  pub model: Option<Url>,
  /// 输入图片（路径或 image:// 地址）
  #[arg(long, value_name = "INPUT")]
  pub input: Option<String>,
  /// 输出图片；给出时处理完输入即退出，否则进入交互模式
  #[arg(long, value_name = "OUTPUT", requires = "input")]
  pub output: Option<String>,
  /// 交互模式下写出预览图的目录
  #[arg(long, value_name = "DIR")]
  pub preview_dir: Option<PathBuf>,
}

const ORIGINAL_PREVIEW: &str = "original_preview.png";
const COLORIZED_PREVIEW: &str = "colorized_preview.png";

fn load_colorizer(model: Option<&Url>) -> Result<Colorizer> {
  let builder = match model {
    Some(url) => ColorizerBuilder::from_url(url)?,
    None => ColorizerBuilder::from_resource_root(&ResourceRoot::resolve()),
  };
  info!("模型文件: {}", builder.bundle().network.display());
  Ok(builder.build()?)
}

fn print_help() {
  println!("命令:");
  println!("  open <图片路径>   上色一张图片");
  println!("  save <保存路径>   保存上色结果（png/jpg，目录则自动命名）");
  println!("  status            查看当前状态");
  println!("  help              显示本帮助");
  println!("  quit              退出");
}

/// 预览写到固定文件名；没有预览时删除旧文件，避免留下上一张图片的预览
fn write_previews(dir: &Path, previews: Option<&Previews>) -> Result<()> {
  let original = dir.join(ORIGINAL_PREVIEW);
  let colorized = dir.join(COLORIZED_PREVIEW);
  match previews {
    Some(previews) => {
      std::fs::create_dir_all(dir)?;
      previews.original.save(&original)?;
      previews.colorized.save(&colorized)?;
      println!("预览已写入: {}", dir.display());
    }
    None => {
      for path in [original, colorized] {
        match std::fs::remove_file(&path) {
          Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e.into()),
          _ => {}
        }
      }
    }
  }
  Ok(())
}

fn report_status(session: &Session, preview_dir: Option<&Path>) {
  match session.status() {
    Status::Idle => println!("空闲，使用 open <图片路径> 开始"),
    Status::Processing(path) => println!("正在处理: {}", path.display()),
    Status::Complete(path) => println!("上色完成: {}", path.display()),
    Status::Failed(message) => println!("处理失败: {}", message),
  }

  if let Some(dir) = preview_dir
    && !session.is_busy()
    && let Err(e) = write_previews(dir, session.previews())
  {
    warn!("写入预览失败: {}", e);
  }
}

/// 路径或 `image://` 地址
fn open_location(session: &mut Session, location: &str) -> Result<PathBuf> {
  let path = InputWrapper::image_path(location)?;
  session.open(&path)?;
  Ok(path)
}

/// 返回 false 表示退出
fn handle_command(session: &mut Session, line: &str) -> bool {
  let (command, argument) = match line.split_once(char::is_whitespace) {
    Some((command, argument)) => (command, argument.trim()),
    None => (line, ""),
  };

  match (command, argument) {
    ("", _) => {}
    ("open", "") | ("save", "") => println!("缺少路径参数"),
    ("open", location) => match open_location(session, location) {
      Ok(path) => println!("开始处理: {}", path.display()),
      Err(e) => println!("错误: {}", e),
    },
    ("save", path) => match session.save(path) {
      Ok(target) => println!("已保存: {}", target.display()),
      Err(e) => println!("错误: {}", e),
    },
    ("status", _) => {
      session.poll();
      report_status(session, None);
    }
    ("help", _) => print_help(),
    ("quit", _) | ("exit", _) => return false,
    (other, _) => println!("未知命令: {}，输入 help 查看帮助", other),
  }
  true
}

fn run_interactive(mut session: Session, preview_dir: Option<PathBuf>) -> Result<()> {
  let (tx, rx) = mpsc::channel();
  thread::spawn(move || {
    for line in std::io::stdin().lock().lines() {
      let Ok(line) = line else { break };
      if tx.send(line).is_err() {
        break;
      }
    }
  });

  print_help();
  let mut last_status = session.status().clone();
  loop {
    match rx.recv_timeout(Duration::from_millis(100)) {
      Ok(line) => {
        if !handle_command(&mut session, line.trim()) {
          break;
        }
      }
      Err(RecvTimeoutError::Timeout) => {}
      Err(RecvTimeoutError::Disconnected) => {
        // 标准输入关闭，等当前任务结束后退出
        session.wait(Duration::MAX);
        report_status(&session, preview_dir.as_deref());
        break;
      }
    }

    let status = session.poll().clone();
    if status != last_status {
      report_status(&session, preview_dir.as_deref());
      last_status = status;
    }
  }

  if session.is_busy() {
    println!("等待当前任务完成...");
  }
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  println!("正在加载模型...");
  let colorizer = load_colorizer(args.model.as_ref())?;
  println!("模型加载完成");

  if let (Some(input), Some(output)) = (&args.input, &args.output) {
    info!("输入: {}", input);
    info!("输出: {}", output);
    let input = InputWrapper::from_location(input)?;
    let output = OutputWrapper::for_still_image(output)?;
    OneShotTask.run_task(input, colorizer, output)?;
    return Ok(());
  }

  let mut session = Session::spawn(colorizer)?;
  if let Some(input) = &args.input {
    let path = open_location(&mut session, input)?;
    println!("开始处理: {}", path.display());
  }
  run_interactive(session, args.preview_dir)
}
