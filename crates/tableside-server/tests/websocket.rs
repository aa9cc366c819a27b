//! Real WebSocket clients against a served hub.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tableside_server::errors::OrderServiceError;
use tableside_server::order::{CreateOutcome, OrderCreateRequest, OrderRecord, OrderService};
use tableside_server::protocol::{DeliveryUpdate, Message};
use tableside_server::{
    Broadcaster, DeliveryFeed, HubConfig, HubServer, KeepaliveConfig, Registry, SessionConfig,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

struct AcceptAll;

#[async_trait]
impl OrderService for AcceptAll {
    async fn create_order(
        &self,
        _request: &OrderCreateRequest,
    ) -> Result<CreateOutcome, OrderServiceError> {
        Ok(CreateOutcome::Created(OrderRecord {
            id: 501,
            status: "pending".into(),
        }))
    }
}

struct Running {
    addr: SocketAddr,
    registry: Registry,
    broadcaster: Broadcaster,
    deliveries: DeliveryFeed,
    stop: Option<oneshot::Sender<()>>,
    task: JoinHandle<std::io::Result<()>>,
}

async fn start(config: HubConfig) -> Running {
    let server = HubServer::new(config, Arc::new(AcceptAll));
    let registry = server.registry().clone();
    let broadcaster = server.broadcaster().clone();
    let deliveries = server.deliveries().clone();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.serve(listener, async move {
        let _ = stopped.await;
    }));
    Running {
        addr,
        registry,
        broadcaster,
        deliveries,
        stop: Some(stop),
        task,
    }
}

async fn join(hub: &Running, path: &str, expected_live: usize) -> Client {
    let (client, _) = connect_async(format!("ws://{}{path}", hub.addr)).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while hub.registry.live_count().await.unwrap() < expected_live {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session never registered");
    client
}

async fn send(client: &mut Client, value: Value) {
    client.send(WsMessage::Text(value.to_string().into())).await.unwrap();
}

/// Next JSON message, skipping keepalive frames.
async fn recv(client: &mut Client) -> Value {
    let read = async {
        loop {
            match client.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => return serde_json::from_str::<Value>(text.as_str()).unwrap(),
                WsMessage::Ping(_) | WsMessage::Pong(_) => {}
                other => panic!("unexpected frame {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(2), read)
        .await
        .expect("no message within 2s")
}

async fn quiet(client: &mut Client) -> bool {
    tokio::time::timeout(Duration::from_millis(150), client.next())
        .await
        .is_err()
}

fn local_config() -> HubConfig {
    HubConfig {
        host: "127.0.0.1".into(),
        port: 0,
        ..HubConfig::default()
    }
}

#[tokio::test]
async fn direct_order_round_trip() {
    let hub = start(local_config()).await;
    let mut kitchen = join(&hub, "/ws/kitchen/k1", 1).await;
    let mut guest = join(&hub, "/ws/guest/42?roomId=table-5&tableToken=tt", 2).await;

    send(
        &mut guest,
        json!({
            "type": "direct",
            "action": "order",
            "payload": {
                "fromUserId": 42,
                "toUserId": "k1",
                "payload": {"isGuest": true, "guestId": 42, "dishItems": [{"dishId": 3, "quantity": 1}]}
            }
        }),
    )
    .await;

    let staff = recv(&mut kitchen).await;
    assert_eq!(staff["type"], "order");
    assert_eq!(staff["action"], "new_order");
    assert_eq!(staff["role"], "Employee");
    assert_eq!(staff["payload"]["guestId"], 42);

    let ack = recv(&mut guest).await;
    assert_eq!(ack["type"], "direct");
    assert_eq!(ack["action"], "order_created");
    assert_eq!(ack["payload"], json!({"orderId": 501, "recipients": 1}));
}

#[tokio::test]
async fn order_status_stays_in_its_room() {
    let hub = start(local_config()).await;
    let mut kitchen = join(&hub, "/ws/Kitchen/k1", 1).await;
    let mut table5 = join(&hub, "/ws/guest/g1?roomId=table-5", 2).await;
    let mut table6 = join(&hub, "/ws/guest/g2?roomId=table-6", 3).await;

    send(
        &mut kitchen,
        json!({"type": "notification", "action": "order_status", "roomId": "table-5", "payload": {"status": "ready"}}),
    )
    .await;

    let got = recv(&mut table5).await;
    assert_eq!(got["payload"]["status"], "ready");
    assert_eq!(got["roomId"], "table-5");
    assert!(quiet(&mut table6).await);
}

#[tokio::test]
async fn delivery_updates_reach_every_client() {
    let hub = start(local_config()).await;
    let mut employee = join(&hub, "/ws/employee/e1", 1).await;
    let mut guest = join(&hub, "/ws/guest/g1?roomId=table-5", 2).await;

    hub.deliveries
        .publish(DeliveryUpdate {
            action: "picked_up".into(),
            delivery_id: "d-7".into(),
            payload: json!({"eta": 12}),
        })
        .unwrap();

    for client in [&mut employee, &mut guest] {
        let got = recv(client).await;
        assert_eq!(got["type"], "delivery");
        assert_eq!(got["action"], "picked_up");
        assert_eq!(got["payload"]["deliveryId"], "d-7");
    }
}

#[tokio::test]
async fn server_side_room_broadcast() {
    let hub = start(local_config()).await;
    let mut inside = join(&hub, "/ws/guest/g1?roomId=table-5", 1).await;
    let mut outside = join(&hub, "/ws/guest/g2?roomId=table-6", 2).await;

    let delivery = hub
        .broadcaster
        .to_room("table-5", &Message::new("notification", "bill_ready", json!({"total": 420})))
        .await
        .unwrap();
    assert_eq!(delivery.delivered, 1);

    let got = recv(&mut inside).await;
    assert_eq!(got["action"], "bill_ready");
    assert!(quiet(&mut outside).await);
}

#[tokio::test]
async fn malformed_frames_do_not_drop_the_connection() {
    let hub = start(local_config()).await;
    let mut admin = join(&hub, "/ws/admin/a1", 1).await;

    admin.send(WsMessage::Text("{{{".into())).await.unwrap();
    send(&mut admin, json!({"type": "status_update", "action": "open"})).await;

    let got = recv(&mut admin).await;
    assert_eq!(got["type"], "status_update");
    assert_eq!(hub.registry.live_count().await.unwrap(), 1);
}

#[tokio::test]
async fn unknown_role_is_not_found() {
    let hub = start(local_config()).await;
    let err = connect_async(format!("ws://{}/ws/chef/1", hub.addr))
        .await
        .unwrap_err();
    match err {
        tokio_tungstenite::tungstenite::Error::Http(resp) => assert_eq!(resp.status(), 404),
        other => panic!("expected HTTP error, got {other:?}"),
    }
}

#[tokio::test]
async fn idle_clients_are_pinged() {
    let config = HubConfig {
        session: SessionConfig {
            keepalive: KeepaliveConfig {
                ping_interval: Duration::from_millis(100),
                read_timeout: Duration::from_secs(5),
                write_timeout: Duration::from_secs(1),
            },
            ..SessionConfig::default()
        },
        ..local_config()
    };
    let hub = start(config).await;
    let mut user = join(&hub, "/ws/user/u1", 1).await;

    let frame = tokio::time::timeout(Duration::from_secs(2), user.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(matches!(frame, WsMessage::Ping(_)));
}

#[tokio::test]
async fn disconnect_unregisters() {
    let hub = start(local_config()).await;
    let mut user = join(&hub, "/ws/user/u1", 1).await;

    user.close(None).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), async {
        while hub.registry.live_count().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session was not unregistered");
}

#[tokio::test]
async fn shutdown_closes_sessions_and_stops_serving() {
    let mut hub = start(local_config()).await;
    let mut user = join(&hub, "/ws/user/u1", 1).await;

    let _ = hub.stop.take().unwrap().send(());
    let closed = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match user.next().await {
                Some(Ok(WsMessage::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());

    let served = tokio::time::timeout(Duration::from_secs(5), hub.task).await;
    assert!(matches!(served, Ok(Ok(Ok(())))));
}
