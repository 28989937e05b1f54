use super::registry::Registry;
use super::store::CameraRecord;
use crate::error::{Error, Result};
use crate::sync::Teardown;
use futures::future::BoxFuture;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

type Action = Box<dyn for<'a> FnOnce(&'a mut Registry) -> BoxFuture<'a, ()> + Send>;

/// 提交给 actor 的命令：一个闭包 + 结果通道
pub(crate) struct Command {
    run: Action,
}

impl Command {
    fn new<T, F>(action: F, reply: oneshot::Sender<Result<T>>) -> Self
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut Registry) -> BoxFuture<'a, Result<T>> + Send + 'static,
    {
        Self {
            run: boxed(move |registry| {
                Box::pin(async move {
                    let result = action(registry).await;
                    // 调用方已经放弃等待时丢弃结果
                    let _ = reply.send(result);
                })
            }),
        }
    }
}

// 借助泛型约束让闭包推断出高阶生命周期
fn boxed<F>(f: F) -> Action
where
    F: for<'a> FnOnce(&'a mut Registry) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

/// 入队并等待结果
///
/// actor 已经退出时，发送失败或结果通道被丢弃都会得到 `ManagerClosed`，不会挂起。
pub(crate) async fn submit<T, F>(commands: &mpsc::UnboundedSender<Command>, action: F) -> Result<T>
where
    T: Send + 'static,
    F: for<'a> FnOnce(&'a mut Registry) -> BoxFuture<'a, Result<T>> + Send + 'static,
{
    let (reply, result) = oneshot::channel();
    commands
        .send(Command::new(action, reply))
        .map_err(|_| Error::ManagerClosed)?;
    result.await.map_err(|_| Error::ManagerClosed)?
}

/// actor 主循环：一次只执行一个命令，按提交顺序
pub(crate) async fn run(
    mut registry: Registry,
    records: Vec<CameraRecord>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    shutdown: Teardown,
) {
    registry.restore(records).await;

    loop {
        let command = tokio::select! {
            biased;
            _ = shutdown.fired() => break,
            command = commands.recv() => match command {
                Some(command) => command,
                None => break,
            },
        };
        (command.run)(&mut registry).await;
    }

    // 队列中剩余的命令随 receiver 一起丢弃，调用方收到 ManagerClosed
    commands.close();
    registry.close_all().await;
    registry.flush_store().await;
    shutdown.fire();
    debug!("device manager stopped");
}
