// 该文件是 Danqing （丹青） 项目的一部分。
// src/task.rs - 任务执行
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

use std::{sync::mpsc::Receiver, time::Instant};

use tracing::{error, info, warn};

use crate::{model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Output;
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 只处理第一帧
pub struct OneShotTask;

impl<
  F,
  D,
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Output = ();
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, mut output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧获取成功，开始推理...");
    let now = Instant::now();
    let result = model.infer(&frame)?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());
    output.render_result(&frame, &result)?;
    output.finish()?;
    info!("渲染完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 连续任务结束的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
  /// 输入正常结束
  Exhausted,
  /// 达到指定帧数
  FrameLimit,
  /// 收到停止信号
  Interrupted,
  /// 读取或解码某一帧失败
  DecodeFailed(String),
  /// 推理失败
  ProcessingFailed(String),
}

impl StopReason {
  pub fn is_failure(&self) -> bool {
    matches!(
      self,
      StopReason::DecodeFailed(_) | StopReason::ProcessingFailed(_)
    )
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskReport {
  /// 已写入输出的帧数
  pub frames: usize,
  pub stop: StopReason,
}

/// 逐帧顺序处理，直到输入结束、出错、达到帧数或收到停止信号
///
/// 无论以何种方式结束都会调用输出的 `finish`，第 k 帧失败时输出恰好包含前 k 帧。
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  stop_signal: Option<Receiver<()>>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_stop_signal(mut self, stop_signal: Receiver<()>) -> Self {
    self.stop_signal = Some(stop_signal);
    self
  }

  fn stop_requested(&self) -> bool {
    self
      .stop_signal
      .as_ref()
      .map(|rx| rx.try_recv().is_ok())
      .unwrap_or(false)
  }
}

impl<
  F,
  D,
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<F, IE>>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for ContinuousTask
{
  type Output = TaskReport;
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, mut output: O) -> Result<TaskReport, Self::Error> {
    info!("开始任务...");
    let started = Instant::now();
    let mut frames = 0usize;

    let stop = loop {
      if self.frame_number.map(|n| frames >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frames);
        break StopReason::FrameLimit;
      }
      if self.stop_requested() {
        warn!("中断信号接收，退出任务循环");
        break StopReason::Interrupted;
      }

      let frame = match input.next() {
        None => break StopReason::Exhausted,
        Some(Ok(frame)) => frame,
        Some(Err(e)) => {
          error!("第 {} 帧读取失败: {}", frames + 1, e);
          break StopReason::DecodeFailed(e.to_string());
        }
      };

      let now = Instant::now();
      let result = match model.infer(&frame) {
        Ok(result) => result,
        Err(e) => {
          error!("第 {} 帧推理失败: {}", frames + 1, e);
          break StopReason::ProcessingFailed(e.to_string());
        }
      };
      let elapsed_a = now.elapsed();

      if let Err(e) = output.render_result(&frame, &result) {
        error!("第 {} 帧写入失败: {}", frames + 1, e);
        if let Err(finish_error) = output.finish() {
          warn!("输出收尾失败: {}", finish_error);
        }
        return Err(e.into());
      }
      frames += 1;
      info!(
        "处理第 {} 帧，耗时: {:.2?} / {:.2?}",
        frames,
        elapsed_a,
        now.elapsed()
      );
    };

    output.finish()?;
    info!(
      "任务完成: {} 帧, 结束原因 {:?}, 总耗时 {:.2?}",
      frames,
      stop,
      started.elapsed()
    );
    Ok(TaskReport { frames, stop })
  }
}
