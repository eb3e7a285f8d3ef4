use async_trait::async_trait;
use community_sync::{AppError, EntityKind, PushChannel, PushSignal, PushSubscription};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;

/// 接続の有無をテストから操作できるプッシュチャネル
pub struct ScriptedPush {
    connect_on_open: bool,
    senders: Mutex<Vec<mpsc::Sender<PushSignal>>>,
    closed: Arc<AtomicUsize>,
}

impl ScriptedPush {
    /// `Connected` を送らないチャネル（接続タイムアウトを起こす）
    pub fn silent() -> Self {
        Self {
            connect_on_open: false,
            senders: Mutex::new(Vec::new()),
            closed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connected() -> Self {
        Self {
            connect_on_open: true,
            ..Self::silent()
        }
    }

    pub async fn send(&self, signal: PushSignal) {
        let sender = self.senders.lock().unwrap().last().cloned();
        if let Some(sender) = sender {
            let _ = sender.send(signal).await;
        }
    }

    pub fn open_count(&self) -> usize {
        self.senders.lock().unwrap().len()
    }

    pub fn closed_count(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushChannel for ScriptedPush {
    async fn open(&self, _kind: &EntityKind) -> Result<PushSubscription, AppError> {
        let (tx, rx) = mpsc::channel(16);
        if self.connect_on_open {
            let _ = tx.try_send(PushSignal::Connected);
        }
        self.senders.lock().unwrap().push(tx);
        let closed = Arc::clone(&self.closed);
        Ok(PushSubscription::new(rx).with_close_hook(move || {
            closed.fetch_add(1, Ordering::SeqCst);
        }))
    }
}
