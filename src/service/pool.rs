//! 工作线程池模块
//!
//! 基于 rayon 线程池的有界任务执行器。每个提交的任务都会得到一个
//! [`TaskHandle`],调用者可以在上面阻塞等待任务完成,或者在任务开始前取消它。

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use tracing::*;

/// 线程池错误
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// 创建线程池失败
    Build(String),
    /// 线程池已关闭
    ShutDown,
    /// 排队的任务太多,包含当前上限
    Saturated(usize),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl std::error::Error for PoolError {}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// 已提交,尚未开始
    Queued,
    /// 正在执行
    Running,
    /// 执行完成
    Completed,
    /// 在开始之前被取消
    Cancelled,
    /// 执行过程中发生 panic
    Panicked,
}

impl TaskStatus {
    /// 任务是否已经结束
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Panicked
        )
    }
}

struct TaskState {
    status: Mutex<TaskStatus>,
    done: Condvar,
    cancelled: AtomicBool,
}

impl TaskState {
    fn set(&self, status: TaskStatus) {
        let mut guard = match self.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = status;
        if status.is_finished() {
            self.done.notify_all();
        }
    }
}

/// 任务完成句柄
///
/// 可以被克隆并在多个线程上同时等待。
#[derive(Clone)]
pub struct TaskHandle(Arc<TaskState>);

impl TaskHandle {
    fn new() -> Self {
        Self(Arc::new(TaskState {
            status: Mutex::new(TaskStatus::Queued),
            done: Condvar::new(),
            cancelled: AtomicBool::new(false),
        }))
    }

    /// 当前状态
    pub fn status(&self) -> TaskStatus {
        match self.0.status.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    /// 任务是否已经结束
    pub fn is_finished(&self) -> bool {
        self.status().is_finished()
    }

    /// 阻塞直到任务结束,返回最终状态
    pub fn wait(&self) -> TaskStatus {
        let mut guard = match self.0.status.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while !guard.is_finished() {
            guard = match self.0.done.wait(guard) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        *guard
    }

    /// 请求取消任务
    ///
    /// 只对还没开始执行的任务有效。已经开始的任务会继续执行到结束。
    /// 返回任务是否仍处于排队状态。
    pub fn cancel(&self) -> bool {
        self.0.cancelled.store(true, Ordering::Release);
        self.status() == TaskStatus::Queued
    }

    fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskHandle").field(&self.status()).finish()
    }
}

/// 有界工作线程池
pub struct WorkerPool {
    pool: rayon::ThreadPool,
    worker_count: usize,
    max_pending: usize,
    pending: Arc<AtomicUsize>,
    shut_down: AtomicBool,
}

impl WorkerPool {
    /// 创建线程池
    ///
    /// # 参数
    /// * `worker_count` - 工作线程数量
    /// * `max_pending` - 同时排队或执行的任务上限
    pub fn new(worker_count: usize, max_pending: usize) -> Result<Self, PoolError> {
        let worker_count = worker_count.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("blockraster-worker-{i}"))
            .build()
            .map_err(|e| PoolError::Build(format!("{e:?}")))?;
        debug!("创建工作线程池: {worker_count} 个线程, 最多 {max_pending} 个任务");
        Ok(Self {
            pool,
            worker_count,
            max_pending: max_pending.max(1),
            pending: Arc::new(AtomicUsize::new(0)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// 工作线程数量
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// 当前排队或执行中的任务数量
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// 提交一个任务
    ///
    /// # 错误
    /// 线程池已关闭时返回 `ShutDown`,排队任务达到上限时返回 `Saturated`
    pub fn submit<F>(&self, job: F) -> Result<TaskHandle, PoolError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shut_down.load(Ordering::Acquire) {
            return Err(PoolError::ShutDown);
        }
        let reserved = self
            .pending
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < self.max_pending).then_some(n + 1)
            });
        if reserved.is_err() {
            warn!("工作线程池已满: {} 个任务", self.max_pending);
            return Err(PoolError::Saturated(self.max_pending));
        }

        let handle = TaskHandle::new();
        let task = handle.clone();
        let pending = Arc::clone(&self.pending);
        self.pool.spawn(move || {
            if task.is_cancelled() {
                trace!("任务在开始前被取消");
                task.0.set(TaskStatus::Cancelled);
            } else {
                task.0.set(TaskStatus::Running);
                match catch_unwind(AssertUnwindSafe(job)) {
                    Ok(()) => task.0.set(TaskStatus::Completed),
                    Err(_) => {
                        error!("工作线程任务 panic");
                        task.0.set(TaskStatus::Panicked);
                    }
                }
            }
            pending.fetch_sub(1, Ordering::AcqRel);
        });
        Ok(handle)
    }

    /// 关闭线程池,之后的提交都会失败,已提交的任务继续执行
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            debug!("关闭工作线程池");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.worker_count)
            .field("max_pending", &self.max_pending)
            .field("pending", &self.pending())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_submit_and_wait() {
        let pool = WorkerPool::new(2, 8).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap()
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.wait(), TaskStatus::Completed);
        }
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_cancel_before_start() {
        let pool = WorkerPool::new(1, 8).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let blocker = pool
            .submit(move || {
                let _ = release_rx.recv();
            })
            .unwrap();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);
        let queued = pool
            .submit(move || flag.store(true, Ordering::SeqCst))
            .unwrap();
        assert!(queued.cancel());
        release_tx.send(()).unwrap();

        assert_eq!(blocker.wait(), TaskStatus::Completed);
        assert_eq!(queued.wait(), TaskStatus::Cancelled);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[test]
    fn test_saturated_and_shutdown() {
        let pool = WorkerPool::new(1, 1).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let blocker = pool
            .submit(move || {
                let _ = release_rx.recv();
            })
            .unwrap();
        assert_eq!(pool.submit(|| {}).unwrap_err(), PoolError::Saturated(1));
        release_tx.send(()).unwrap();
        blocker.wait();

        pool.shutdown();
        assert_eq!(pool.submit(|| {}).unwrap_err(), PoolError::ShutDown);
    }

    #[test]
    fn test_panic_is_reported() {
        let pool = WorkerPool::new(1, 4).unwrap();
        let handle = pool.submit(|| panic!("boom")).unwrap();
        assert_eq!(handle.wait(), TaskStatus::Panicked);
    }
}
