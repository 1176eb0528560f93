// 该文件是 Danqing （丹青） 项目的一部分。
// src/session.rs - 交互式上色会话
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

//! # 交互式会话
//!
//! 模型只加载一次并移交给唯一的后台线程，前台通过 `open` 提交图片、
//! 通过 `poll` / `wait` 取回结果，处理期间前台保持可响应。
//!
//! 同一时刻最多只有一个任务在执行，处理中再次 `open` 会被拒绝；
//! 已开始的任务不能取消。

use std::{
  path::{Path, PathBuf},
  sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use image::{ImageFormat, RgbImage, imageops::FilterType};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  config::PREVIEW_SIZE,
  error::FrameError,
  frame::RgbNhwcFrame,
  input::read_image_frame,
  model::{Colorization, Model},
  output::image_save_target,
};

#[derive(Error, Debug)]
pub enum SessionError {
  #[error("正在处理 {}，请等待完成", .0.display())]
  Busy(PathBuf),
  #[error("还没有可保存的上色结果")]
  NoResult,
  #[error("不支持的保存格式: {0}（仅支持 png、jpg、jpeg）")]
  UnsupportedFormat(String),
  #[error("后台线程已退出")]
  WorkerGone,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

/// 会话状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
  Idle,
  Processing(PathBuf),
  Complete(PathBuf),
  Failed(String),
}

/// 原图与上色图的固定尺寸预览
#[derive(Debug, Clone)]
pub struct Previews {
  pub original: RgbImage,
  pub colorized: RgbImage,
}

impl Previews {
  fn from_colorization(colorization: &Colorization) -> Self {
    Self {
      original: preview_of(&colorization.original),
      colorized: preview_of(&colorization.colorized),
    }
  }
}

fn preview_of(frame: &RgbNhwcFrame) -> RgbImage {
  image::imageops::resize(
    &frame.to_rgb_image(),
    PREVIEW_SIZE,
    PREVIEW_SIZE,
    FilterType::Triangle,
  )
}

struct Job {
  id: u64,
  path: PathBuf,
}

struct Finished {
  id: u64,
  path: PathBuf,
  result: Result<Colorization, FrameError>,
}

fn worker_loop<M>(mut model: M, jobs: Receiver<Job>, events: Sender<Finished>)
where
  M: Model<Input = RgbNhwcFrame, Output = RgbNhwcFrame, Error = FrameError>,
{
  for job in jobs {
    info!("开始上色: {}", job.path.display());
    let started = Instant::now();
    let result = read_image_frame(&job.path).and_then(|original| {
      let colorized = model.infer(&original)?;
      Ok(Colorization {
        original,
        colorized,
      })
    });
    match &result {
      Ok(_) => info!("上色完成，耗时: {:.2?}", started.elapsed()),
      Err(e) => error!("上色失败: {}", e),
    }

    let finished = Finished {
      id: job.id,
      path: job.path,
      result,
    };
    if events.send(finished).is_err() {
      break;
    }
  }
  debug!("后台线程退出");
}

pub struct Session {
  jobs: Option<Sender<Job>>,
  events: Receiver<Finished>,
  worker: Option<JoinHandle<()>>,
  next_id: u64,
  pending: Option<u64>,
  status: Status,
  result: Option<Colorization>,
  previews: Option<Previews>,
}

impl Session {
  /// 把已加载的模型移交给后台线程
  pub fn spawn<M>(model: M) -> Result<Self, SessionError>
  where
    M: Model<Input = RgbNhwcFrame, Output = RgbNhwcFrame, Error = FrameError> + Send + 'static,
  {
    let (job_tx, job_rx) = mpsc::channel();
    let (event_tx, event_rx) = mpsc::channel();
    let worker = thread::Builder::new()
      .name("danqing-worker".to_string())
      .spawn(move || worker_loop(model, job_rx, event_tx))?;

    Ok(Self {
      jobs: Some(job_tx),
      events: event_rx,
      worker: Some(worker),
      next_id: 0,
      pending: None,
      status: Status::Idle,
      result: None,
      previews: None,
    })
  }

  /// 提交一张图片，上一张图片的结果与预览立即清除
  pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), SessionError> {
    if let Status::Processing(current) = &self.status {
      return Err(SessionError::Busy(current.clone()));
    }

    let path = path.as_ref().to_path_buf();
    self.result = None;
    self.previews = None;

    self.next_id += 1;
    let job = Job {
      id: self.next_id,
      path: path.clone(),
    };
    self
      .jobs
      .as_ref()
      .ok_or(SessionError::WorkerGone)?
      .send(job)
      .map_err(|_| SessionError::WorkerGone)?;

    debug!("提交任务 #{}: {}", self.next_id, path.display());
    self.pending = Some(self.next_id);
    self.status = Status::Processing(path);
    Ok(())
  }

  fn apply(&mut self, finished: Finished) {
    if self.pending != Some(finished.id) {
      warn!("忽略过期的任务结果 #{}", finished.id);
      return;
    }
    self.pending = None;

    match finished.result {
      Ok(colorization) => {
        self.previews = Some(Previews::from_colorization(&colorization));
        self.result = Some(colorization);
        self.status = Status::Complete(finished.path);
      }
      Err(e) => {
        self.previews = None;
        self.result = None;
        self.status = Status::Failed(e.to_string());
      }
    }
  }

  fn worker_gone(&mut self) {
    if self.pending.take().is_some() {
      self.status = Status::Failed(SessionError::WorkerGone.to_string());
    }
  }

  /// 不阻塞地取回已完成的结果
  pub fn poll(&mut self) -> &Status {
    loop {
      match self.events.try_recv() {
        Ok(finished) => self.apply(finished),
        Err(TryRecvError::Empty) => break,
        Err(TryRecvError::Disconnected) => {
          self.worker_gone();
          break;
        }
      }
    }
    &self.status
  }

  /// 最多等待 `timeout`，直到当前任务结束
  pub fn wait(&mut self, timeout: Duration) -> &Status {
    let deadline = Instant::now().checked_add(timeout);
    while self.pending.is_some() {
      let remaining = deadline
        .map(|deadline| deadline.saturating_duration_since(Instant::now()))
        .unwrap_or(timeout);
      match self.events.recv_timeout(remaining) {
        Ok(finished) => self.apply(finished),
        Err(RecvTimeoutError::Timeout) => break,
        Err(RecvTimeoutError::Disconnected) => {
          self.worker_gone();
          break;
        }
      }
    }
    &self.status
  }

  pub fn status(&self) -> &Status {
    &self.status
  }

  pub fn is_busy(&self) -> bool {
    matches!(self.status, Status::Processing(_))
  }

  pub fn colorization(&self) -> Option<&Colorization> {
    self.result.as_ref()
  }

  pub fn previews(&self) -> Option<&Previews> {
    self.previews.as_ref()
  }

  /// 保存上色结果
  ///
  /// 没有扩展名时补上 `.png`；目标是目录时以时间戳命名。返回实际写入的路径。
  pub fn save(&self, path: impl AsRef<Path>) -> Result<PathBuf, SessionError> {
    let colorization = self.result.as_ref().ok_or(SessionError::NoResult)?;
    let target = image_save_target(path.as_ref());
    let format = save_format(&target)?;

    if let Some(parent) = target.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    colorization
      .colorized
      .to_rgb_image()
      .save_with_format(&target, format)?;

    info!("保存上色结果: {}", target.display());
    Ok(target)
  }
}

fn save_format(path: &Path) -> Result<ImageFormat, SessionError> {
  let extension = path
    .extension()
    .and_then(|ext| ext.to_str())
    .map(|ext| ext.to_ascii_lowercase())
    .unwrap_or_default();
  match extension.as_str() {
    "png" => Ok(ImageFormat::Png),
    "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
    _ => Err(SessionError::UnsupportedFormat(extension)),
  }
}

impl Drop for Session {
  fn drop(&mut self) {
    // 关闭任务通道后后台线程在当前任务结束时退出
    self.jobs.take();
    if let Some(worker) = self.worker.take()
      && worker.join().is_err()
    {
      warn!("后台线程异常退出");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_save_format() {
    assert_eq!(
      save_format(Path::new("a.JPEG")).unwrap(),
      ImageFormat::Jpeg
    );
    assert_eq!(save_format(Path::new("a.png")).unwrap(), ImageFormat::Png);
    assert!(matches!(
      save_format(Path::new("a.bmp")),
      Err(SessionError::UnsupportedFormat(_))
    ));
  }
}
