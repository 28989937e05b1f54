use futures::future::select_all;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// 一次性的拆除信号，支持层级取消
///
/// 父信号触发时所有子信号都视为已触发，反之不成立。
/// `fire()` 通过原子 swap 保证只有一个调用者真正执行触发。
#[derive(Clone)]
pub struct Teardown {
    node: Arc<Node>,
    parent: Option<Box<Teardown>>,
}

struct Node {
    fired: AtomicBool,
    tx: watch::Sender<bool>,
}

impl Teardown {
    pub fn new() -> Self {
        Self {
            node: Arc::new(Node {
                fired: AtomicBool::new(false),
                tx: watch::channel(false).0,
            }),
            parent: None,
        }
    }

    /// 派生一个子信号
    pub fn child(&self) -> Self {
        Self {
            parent: Some(Box::new(self.clone())),
            ..Self::new()
        }
    }

    /// 触发本节点；返回 true 表示这次调用完成了触发
    pub fn fire(&self) -> bool {
        if self.node.fired.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.node.tx.send_replace(true);
        true
    }

    /// 本节点或任意祖先是否已触发
    pub fn is_fired(&self) -> bool {
        self.chain().any(|t| t.node.fired.load(Ordering::Acquire))
    }

    /// 等待本节点或任意祖先触发
    pub async fn fired(&self) {
        let waits = self.chain().map(|t| {
            let mut rx = t.node.tx.subscribe();
            Box::pin(async move {
                // 发送端由 Node 持有，和接收端同生命周期，不会关闭
                let _ = rx.wait_for(|fired| *fired).await;
            })
        });
        select_all(waits).await;
    }

    fn chain(&self) -> impl Iterator<Item = &Teardown> + '_ {
        std::iter::successors(Some(self), |t| t.parent.as_deref())
    }
}

impl Default for Teardown {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Teardown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Teardown")
            .field("fired", &self.is_fired())
            .field("depth", &(self.chain().count() - 1))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn fires_exactly_once() {
        let signal = Teardown::new();
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let s = signal.clone();
                tokio::spawn(async move { s.fire() })
            })
            .collect();

        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn parent_cancels_children_only_downwards() {
        let root = Teardown::new();
        let child = root.child();
        let grandchild = child.child();

        grandchild.fire();
        assert!(!child.is_fired());
        assert!(!root.is_fired());

        let sibling = child.child();
        let waiter = tokio::spawn(async move { sibling.fired().await });
        root.fire();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("child must observe its parent")
            .unwrap();
        assert!(child.is_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn fired_resolves_immediately_when_already_fired() {
        let signal = Teardown::new();
        signal.fire();
        tokio::time::timeout(Duration::from_millis(1), signal.fired())
            .await
            .unwrap();

        let idle = Teardown::new();
        assert!(tokio::time::timeout(Duration::from_secs(5), idle.fired())
            .await
            .is_err());
    }
}
