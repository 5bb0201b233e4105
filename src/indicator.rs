//! 块访问指示器模块
//!
//! 读写块失败时向监听者广播。指示器在应用启动时创建一次,
//! 以 `Arc` 注入到适配器和服务编辑器中,监听者(例如界面上的状态提示)可以随时注册和注销。

use crate::resolution::BlockError;
use std::sync::{Arc, RwLock};
use tracing::*;

/// 一次失败的块访问
#[derive(Debug)]
pub struct BlockAccessEvent<'a> {
    /// 分辨率层级
    pub resolution: u16,
    /// 块位置
    pub position: (u64, u64),
    /// 失败原因
    pub error: &'a BlockError,
}

/// 块访问失败的监听者
pub trait BlockAccessListener: Send + Sync {
    fn read_block_error(&self, _event: &BlockAccessEvent<'_>) {}

    fn write_block_error(&self, _event: &BlockAccessEvent<'_>) {}
}

/// 监听者注册表
#[derive(Default)]
pub struct BlockAccessIndicator {
    listeners: RwLock<Vec<Arc<dyn BlockAccessListener>>>,
}

impl BlockAccessIndicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener(&self, listener: Arc<dyn BlockAccessListener>) {
        match self.listeners.write() {
            Ok(mut listeners) => listeners.push(listener),
            Err(poisoned) => poisoned.into_inner().push(listener),
        }
    }

    /// 注销监听者,按指针比较
    pub fn remove_listener(&self, listener: &Arc<dyn BlockAccessListener>) {
        let target = Arc::as_ptr(listener) as *const ();
        let retain = |listeners: &mut Vec<Arc<dyn BlockAccessListener>>| {
            listeners.retain(|l| Arc::as_ptr(l) as *const () != target)
        };
        match self.listeners.write() {
            Ok(mut listeners) => retain(&mut listeners),
            Err(poisoned) => retain(&mut poisoned.into_inner()),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.snapshot().len()
    }

    fn snapshot(&self) -> Vec<Arc<dyn BlockAccessListener>> {
        match self.listeners.read() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn notify_read_error(&self, resolution: u16, position: (u64, u64), error: &BlockError) {
        debug!("读取块 {position:?} (层级 {resolution}) 失败: {error:?}");
        let event = BlockAccessEvent {
            resolution,
            position,
            error,
        };
        for listener in self.snapshot() {
            listener.read_block_error(&event);
        }
    }

    pub fn notify_write_error(&self, resolution: u16, position: (u64, u64), error: &BlockError) {
        debug!("写入块 {position:?} (层级 {resolution}) 失败: {error:?}");
        let event = BlockAccessEvent {
            resolution,
            position,
            error,
        };
        for listener in self.snapshot() {
            listener.write_block_error(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counter {
        reads: AtomicUsize,
        writes: AtomicUsize,
    }

    impl BlockAccessListener for Counter {
        fn read_block_error(&self, event: &BlockAccessEvent<'_>) {
            assert_eq!(event.position, (0, 4));
            self.reads.fetch_add(1, Ordering::SeqCst);
        }

        fn write_block_error(&self, _event: &BlockAccessEvent<'_>) {
            self.writes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_add_notify_remove() {
        let indicator = BlockAccessIndicator::new();
        let counter = Arc::new(Counter::default());
        let listener: Arc<dyn BlockAccessListener> = counter.clone();
        indicator.add_listener(Arc::clone(&listener));

        let error = BlockError::PendingWrite(3);
        indicator.notify_read_error(0, (0, 4), &error);
        indicator.notify_write_error(0, (0, 4), &error);
        assert_eq!(counter.reads.load(Ordering::SeqCst), 1);
        assert_eq!(counter.writes.load(Ordering::SeqCst), 1);

        indicator.remove_listener(&listener);
        assert_eq!(indicator.listener_count(), 0);
        indicator.notify_read_error(0, (0, 4), &error);
        assert_eq!(counter.reads.load(Ordering::SeqCst), 1);
    }
}
