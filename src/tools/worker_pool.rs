use log::{debug, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

/// 有上限的工作池
///
/// 平行模式使用專屬的 rayon 執行緒池；循序模式給無法可靠使用多執行緒的環境。
pub enum WorkerPool {
    Parallel(ThreadPool),
    Sequential,
}

impl WorkerPool {
    /// 建立工作池，建立失敗時退回循序模式
    #[must_use]
    pub fn new(max_workers: usize, parallel: bool) -> Self {
        if !parallel || max_workers <= 1 {
            debug!("使用循序模式");
            return Self::Sequential;
        }

        match ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .thread_name(|i| format!("preview-worker-{i}"))
            .build()
        {
            Ok(pool) => {
                debug!("建立工作池: {max_workers} 個工作執行緒");
                Self::Parallel(pool)
            }
            Err(e) => {
                warn!("無法建立工作池，改用循序模式: {e}");
                Self::Sequential
            }
        }
    }

    #[must_use]
    pub const fn is_parallel(&self) -> bool {
        matches!(self, Self::Parallel(_))
    }

    /// 對每個項目執行 `f`，結果順序與輸入相同
    ///
    /// 呼叫端會阻塞到整個階段完成為止。
    pub fn map<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&T) -> R + Sync + Send,
    {
        match self {
            Self::Parallel(pool) => pool.install(|| items.par_iter().map(&f).collect()),
            Self::Sequential => items.iter().map(f).collect(),
        }
    }
}
