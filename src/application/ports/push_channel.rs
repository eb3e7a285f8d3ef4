use crate::domain::value_objects::sync::EntityKind;
use crate::shared::error::AppError;
use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Inserted,
    Updated,
    Deleted,
}

/// ペイロードを持たない変更通知。内容は必ず再取得する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub entity_id: String,
    pub change_kind: ChangeKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushSignal {
    Connected,
    Event(ChangeEvent),
    Disconnected(String),
}

type CloseHook = Box<dyn FnOnce() + Send + 'static>;

/// 購読ハンドル。drop すると購読解除になる。
pub struct PushSubscription {
    signals: mpsc::Receiver<PushSignal>,
    on_close: Option<CloseHook>,
}

impl PushSubscription {
    pub fn new(signals: mpsc::Receiver<PushSignal>) -> Self {
        Self {
            signals,
            on_close: None,
        }
    }

    pub fn with_close_hook(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    pub async fn recv(&mut self) -> Option<PushSignal> {
        self.signals.recv().await
    }
}

impl Drop for PushSubscription {
    fn drop(&mut self) {
        self.signals.close();
        if let Some(hook) = self.on_close.take() {
            hook();
        }
    }
}

#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn open(&self, kind: &EntityKind) -> Result<PushSubscription, AppError>;
}
