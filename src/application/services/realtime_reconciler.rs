use crate::application::ports::push_channel::{PushChannel, PushSignal, PushSubscription};
use crate::application::services::refresh_target::RefreshTarget;
use crate::shared::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilerMode {
    Connecting,
    Push,
    Polling,
    Stopped,
}

/// プッシュ通知で対象を差分更新し、接続できなければ定期ポーリングに切り替える
#[derive(Clone)]
pub struct RealtimeReconciler {
    push: Arc<dyn PushChannel>,
    connect_timeout: Duration,
    poll_interval: Duration,
}

/// 購読ハンドル。`unsubscribe` するか drop すると購読とタイマーを止める。
pub struct ReconcilerHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    mode: watch::Receiver<ReconcilerMode>,
}

impl ReconcilerHandle {
    pub fn mode(&self) -> ReconcilerMode {
        *self.mode.borrow()
    }

    pub fn mode_changes(&self) -> watch::Receiver<ReconcilerMode> {
        self.mode.clone()
    }

    pub async fn unsubscribe(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(err) = task.await
        {
            warn!(error = %err, "reconciler task ended abnormally");
        }
    }
}

impl Drop for ReconcilerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl RealtimeReconciler {
    pub fn new(push: Arc<dyn PushChannel>, connect_timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            push,
            connect_timeout,
            poll_interval,
        }
    }

    pub fn subscribe(&self, target: Arc<dyn RefreshTarget>) -> ReconcilerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (mode_tx, mode_rx) = watch::channel(ReconcilerMode::Connecting);
        let worker = ReconcilerWorker {
            push: Arc::clone(&self.push),
            target,
            connect_timeout: self.connect_timeout,
            poll_interval: self.poll_interval,
            mode: mode_tx,
        };
        let task = tokio::spawn(worker.run(shutdown_rx));

        ReconcilerHandle {
            shutdown: Some(shutdown_tx),
            task: Some(task),
            mode: mode_rx,
        }
    }
}

struct ReconcilerWorker {
    push: Arc<dyn PushChannel>,
    target: Arc<dyn RefreshTarget>,
    connect_timeout: Duration,
    poll_interval: Duration,
    mode: watch::Sender<ReconcilerMode>,
}

impl ReconcilerWorker {
    async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let kind = self.target.entity_kind().clone();
        let deadline = sleep(self.connect_timeout);
        tokio::pin!(deadline);

        let opened = tokio::select! {
            _ = &mut shutdown => {
                self.mode.send_replace(ReconcilerMode::Stopped);
                return;
            }
            _ = &mut deadline => Err(AppError::timeout(format!("open push channel for {kind}"))),
            opened = self.push.open(&kind) => opened,
        };

        let mut subscription = None;
        let mut poller = None;
        match opened {
            Ok(opened) => subscription = Some(opened),
            Err(err) => {
                warn!(kind = %kind, error = %err, "push channel unavailable; polling");
                poller = Some(self.start_polling());
            }
        }
        let mut connected = false;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = &mut deadline, if !connected && poller.is_none() => {
                    info!(kind = %kind, "push channel did not connect in time; polling");
                    subscription = None;
                    poller = Some(self.start_polling());
                }
                signal = next_signal(&mut subscription), if subscription.is_some() => match signal {
                    Some(PushSignal::Connected) => {
                        if poller.is_none() {
                            debug!(kind = %kind, "push channel connected");
                            connected = true;
                            self.mode.send_replace(ReconcilerMode::Push);
                        }
                    }
                    Some(PushSignal::Event(change)) => {
                        debug!(kind = %kind, entity_id = %change.entity_id, "change notification");
                        self.target.apply_change(&change).await;
                    }
                    Some(PushSignal::Disconnected(reason)) => {
                        warn!(kind = %kind, reason = %reason, "push channel disconnected; polling");
                        subscription = None;
                        if poller.is_none() {
                            poller = Some(self.start_polling());
                        }
                    }
                    None => {
                        warn!(kind = %kind, "push channel closed; polling");
                        subscription = None;
                        if poller.is_none() {
                            poller = Some(self.start_polling());
                        }
                    }
                },
                _ = next_tick(&mut poller), if poller.is_some() => {
                    self.target.refresh_all().await;
                }
            }
        }

        drop(subscription);
        self.mode.send_replace(ReconcilerMode::Stopped);
        debug!(kind = %kind, "reconciler stopped");
    }

    /// 最初のポーリングは 1 周期後
    fn start_polling(&self) -> Interval {
        self.mode.send_replace(ReconcilerMode::Polling);
        let mut interval = interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    }
}

async fn next_signal(subscription: &mut Option<PushSubscription>) -> Option<PushSignal> {
    match subscription {
        Some(subscription) => subscription.recv().await,
        None => std::future::pending().await,
    }
}

async fn next_tick(poller: &mut Option<Interval>) {
    match poller {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
