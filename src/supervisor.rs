//! 任务监督
//!
//! 每个长期任务在独立的 tokio 任务中运行；任务退出或 panic 后，
//! 等待 `restart_delay` 再用工厂函数重新创建。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 受监督任务的集合
#[derive(Default)]
pub struct Supervisor {
    handles: Arc<Mutex<Vec<(String, JoinHandle<()>)>>>,
}

impl Supervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 启动一个受监督任务
    pub async fn spawn<F, Fut>(&self, name: impl Into<String>, restart_delay: Duration, factory: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let name = name.into();
        let handle = tokio::spawn(supervise(name.clone(), restart_delay, factory));
        self.handles.lock().await.push((name, handle));
    }

    /// 当前受监督的任务数
    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.handles.lock().await.is_empty()
    }

    /// 停止所有任务
    pub async fn shutdown(&self) {
        let handles: Vec<_> = self.handles.lock().await.drain(..).collect();
        for (name, handle) in handles {
            handle.abort();
            info!("Stopped task {}", name);
        }
    }
}

/// 监督循环：运行、等待结束、延迟后重启
pub async fn supervise<F, Fut>(name: String, restart_delay: Duration, factory: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut restarts: u64 = 0;
    loop {
        info!("Starting task {}", name);
        let mut task = AbortOnDrop(tokio::spawn(factory()));
        match (&mut task.0).await {
            Ok(()) => warn!("Task {} exited", name),
            Err(e) if e.is_panic() => error!("Task {} panicked: {}", name, e),
            Err(e) => {
                // 被取消，不再重启
                info!("Task {} cancelled: {}", name, e);
                return;
            }
        }

        restarts += 1;
        warn!("Restarting task {} in {:?} (restart #{})", name, restart_delay, restarts);
        tokio::time::sleep(restart_delay).await;
    }
}

/// 监督循环被取消时一并终止内层任务
struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}
