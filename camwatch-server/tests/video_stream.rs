use camwatch::manager::{DeviceManager, ManagerConfig, MemoryStore};
use camwatch::sync::Teardown;
use camwatch_core::source::{CameraIdentity, CameraSource};
use camwatch_server::streaming::ViewerGauge;
use camwatch_server::{router, AppState, Config};
use camwatch_simulation::{SimDevice, SimDriver};
use futures::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct TestServer {
    addr: SocketAddr,
    manager: DeviceManager,
    shutdown: Teardown,
    viewers: ViewerGauge,
}

impl TestServer {
    async fn start(token: Option<&str>) -> Self {
        let driver = Arc::new(SimDriver::new().with_device(SimDevice::local(0).fps(30)));
        let manager = DeviceManager::spawn(driver, Arc::new(MemoryStore::new()), ManagerConfig::default())
            .unwrap();
        manager.check_system_cameras().await.unwrap();

        let mut config = Config::default();
        config.auth.token = token.map(String::from);
        let shutdown = Teardown::new();
        let state = AppState::new(manager.clone(), &config, shutdown.clone());
        let viewers = state.viewers.clone();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });

        Self {
            addr,
            manager,
            shutdown,
            viewers,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    async fn wait_for_viewers(&self, expected: usize) {
        for _ in 0..200 {
            if self.viewers.current() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {expected} viewers, found {}", self.viewers.current());
    }
}

async fn next_frame(client: &mut Client) -> Vec<u8> {
    loop {
        let message = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("frame should arrive in time")
            .expect("stream should stay open")
            .expect("valid websocket message");
        if let Message::Binary(data) = message {
            return data.to_vec();
        }
    }
}

async fn wait_closed(client: &mut Client) {
    loop {
        match timeout(Duration::from_secs(5), client.next())
            .await
            .expect("session should end")
        {
            None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return,
            Some(Ok(_)) => continue,
        }
    }
}

fn http_status(result: Result<(Client, tungstenite::handshake::client::Response), tungstenite::Error>) -> u16 {
    match result {
        Err(tungstenite::Error::Http(response)) => response.status().as_u16(),
        Err(e) => panic!("unexpected error: {e}"),
        Ok(_) => panic!("upgrade should have been refused"),
    }
}

#[tokio::test]
async fn unknown_camera_is_not_upgraded() {
    let server = TestServer::start(None).await;

    let status = http_status(connect_async(server.url("/video/missing")).await);
    assert_eq!(status, 404);
    assert_eq!(server.viewers.current(), 0);

    server.manager.close().await.unwrap();
}

#[tokio::test]
async fn viewers_are_independent() {
    let server = TestServer::start(None).await;

    let (mut first, _) = connect_async(server.url("/video/0")).await.unwrap();
    let (mut second, _) = connect_async(server.url("/video/0")).await.unwrap();

    let a = next_frame(&mut first).await;
    let b = next_frame(&mut second).await;
    assert_eq!(&a[..2], &[0xFF, 0xD8]);
    assert_eq!(&b[..2], &[0xFF, 0xD8]);
    server.wait_for_viewers(2).await;

    first.close(None).await.unwrap();
    drop(first);
    server.wait_for_viewers(1).await;

    let c = next_frame(&mut second).await;
    assert_eq!(&c[..2], &[0xFF, 0xD8]);

    server.manager.close().await.unwrap();
}

#[tokio::test]
async fn removing_camera_ends_sessions() {
    let server = TestServer::start(None).await;
    let (mut client, _) = connect_async(server.url("/video/0")).await.unwrap();
    next_frame(&mut client).await;

    let id = CameraIdentity::of(&CameraSource::Device(0));
    server.manager.remove_camera(&id).await.unwrap();

    wait_closed(&mut client).await;
    server.wait_for_viewers(0).await;

    let status = http_status(connect_async(server.url("/video/0")).await);
    assert_eq!(status, 404);

    server.manager.close().await.unwrap();
}

#[tokio::test]
async fn shutdown_ends_sessions() {
    let server = TestServer::start(None).await;
    let (mut client, _) = connect_async(server.url("/video/0")).await.unwrap();
    next_frame(&mut client).await;

    server.shutdown.fire();
    wait_closed(&mut client).await;
    server.wait_for_viewers(0).await;

    server.manager.close().await.unwrap();
}

#[tokio::test]
async fn token_is_required_when_configured() {
    let server = TestServer::start(Some("s3cret")).await;

    let status = http_status(connect_async(server.url("/video/0")).await);
    assert_eq!(status, 401);

    let status = http_status(connect_async(server.url("/video/0?token=wrong")).await);
    assert_eq!(status, 401);

    let (mut client, _) = connect_async(server.url("/video/0?token=s3cret")).await.unwrap();
    let frame = next_frame(&mut client).await;
    assert_eq!(&frame[..2], &[0xFF, 0xD8]);

    server.manager.close().await.unwrap();
}
