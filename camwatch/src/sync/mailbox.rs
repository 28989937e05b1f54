use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// 单槽邮箱：新值覆盖旧值，永远不会积压
///
/// 生产者 `publish` 从不阻塞；每个接收者只会看到它订阅之后的最新值，
/// 慢的接收者直接跳过中间的值。
pub struct Mailbox<T> {
    tx: Arc<watch::Sender<Option<Arc<T>>>>,
}

impl<T> Clone for Mailbox<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            tx: Arc::new(watch::channel(None).0),
        }
    }

    pub fn publish(&self, value: T) {
        self.tx.send_replace(Some(Arc::new(value)));
    }

    /// 订阅；订阅前已经发布的值不会再投递
    pub fn subscribe(&self) -> MailboxReceiver<T> {
        MailboxReceiver {
            rx: self.tx.subscribe(),
        }
    }

    /// 最近一次发布的值
    pub fn latest(&self) -> Option<Arc<T>> {
        self.tx.borrow().clone()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Mailbox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("receivers", &self.receiver_count())
            .finish()
    }
}

pub struct MailboxReceiver<T> {
    rx: watch::Receiver<Option<Arc<T>>>,
}

impl<T> MailboxReceiver<T> {
    /// 等待一个本接收者还没见过的值；所有 Mailbox 都被丢弃后返回 None
    pub async fn recv(&mut self) -> Option<Arc<T>> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(value) = self.rx.borrow_and_update().clone() {
                return Some(value);
            }
        }
    }
}

impl<T> fmt::Debug for MailboxReceiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MailboxReceiver").finish_non_exhaustive()
    }
}
