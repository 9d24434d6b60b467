mod config;
mod transport;

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use dashmap::DashMap;
use futures_util::{stream::StreamExt, SinkExt};
use parking_lot::Mutex as P_Mutex;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use duel_arena_core::{
    ClientMessage, DuelConfig, DuelRegistry, PlayerProfile, ProfileBook, Retcode, RoomId, ServerMessage,
    StaticCatalog, Transport, UserId,
};

use crate::config::ServerConfig;
use crate::transport::ChannelTransport;

// 服务器全局状态
struct AppState {
    registry: DuelRegistry,
    // 等待玩家凑齐的房间，满员后创建对局并解散
    rooms: DashMap<RoomId, Arc<Room>>,
    transport: Arc<ChannelTransport>,
    profiles: Arc<ProfileBook>,
    max_seats: usize,
}

// 等待中的房间
struct Room {
    scenario_id: u32,
    seats: u8,
    members: P_Mutex<Vec<UserId>>,
}

// 当前连接的玩家信息
struct Session {
    user_id: UserId,
    // 仍在等待开局的房间
    room_id: Option<RoomId>,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    let duel_config = DuelConfig::default();
    let transport = Arc::new(ChannelTransport::new());
    let profiles = Arc::new(ProfileBook::new());
    let state = SharedState::new(AppState {
        max_seats: duel_config.seats,
        registry: DuelRegistry::new(
            Arc::new(StaticCatalog::builtin()),
            transport.clone(),
            profiles.clone(),
            duel_config,
        ),
        rooms: DashMap::new(),
        transport,
        profiles,
    });

    // 驱动所有对局的心跳
    let ticker = state.clone();
    let tick = config.tick;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        loop {
            interval.tick().await;
            ticker.registry.tick_all();
        }
    });

    let app = Router::new()
        .route("/ws", get(websocket_handler))
        .with_state(state);

    info!("服务器正在监听 {}", config.addr);
    let listener = match tokio::net::TcpListener::bind(config.addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定地址 {}: {}", config.addr, e);
            return;
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        error!("服务器异常退出: {}", e);
    }
}

/// 处理 WebSocket 连接请求
async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // 对局推送与请求回包共用同一个通道，保证顺序
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    // 启动一个新任务，专门负责将 MPSC 通道中的消息发送到 WebSocket
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("序列化消息失败: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 发送失败，说明客户端已断开，退出任务
                break;
            }
        }
    });

    // 加入房间后填充
    let mut session: Option<Session> = None;

    // 主循环，处理从客户端接收到的消息
    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(client_msg, &state, &tx, &mut session).await;
                }
                Err(e) => {
                    warn!("解析消息失败: {}", e);
                }
            }
        }
    }

    // 客户端断开连接，执行清理工作
    if let Some(session) = session {
        handle_disconnect(&state, session);
    }
    info!("客户端连接关闭");
}

/// 核心消息处理逻辑
async fn handle_client_message(
    msg: ClientMessage,
    state: &SharedState,
    tx: &mpsc::Sender<ServerMessage>,
    session: &mut Option<Session>,
) {
    match msg {
        ClientMessage::CreateRoom { nickname, scenario_id, seats } => {
            if session.is_some() {
                let _ = tx.send(ServerMessage::Error { message: "你已经在一个房间里了".to_string() }).await;
                return;
            }
            if seats == 0 || seats as usize > state.max_seats {
                let _ = tx.send(ServerMessage::Error {
                    message: format!("座位数需要在 1 到 {} 之间", state.max_seats),
                }).await;
                return;
            }

            let room_id = Uuid::new_v4();
            let user_id = enter_lobby(state, tx, nickname);
            let room = Arc::new(Room { scenario_id, seats, members: P_Mutex::new(vec![user_id]) });
            state.rooms.insert(room_id, room.clone());

            info!("玩家 {} 创建了新房间 {}，座位 {}", user_id, room_id, seats);
            *session = Some(Session { user_id, room_id: Some(room_id) });
            let _ = tx.send(ServerMessage::RoomJoined { your_id: user_id, room_id, seats, members: 1 }).await;
            try_start_duel(state, room_id, &room);
        }
        ClientMessage::JoinRoom { room_id, nickname } => {
            if session.is_some() {
                let _ = tx.send(ServerMessage::Error { message: "你已经在一个房间里了".to_string() }).await;
                return;
            }
            let Some(room) = state.rooms.get(&room_id).map(|r| r.clone()) else {
                let _ = tx.send(ServerMessage::Error { message: "房间不存在".to_string() }).await;
                return;
            };

            let joined = {  // r_members lock
                let mut r_members = room.members.lock();
                if r_members.len() >= room.seats as usize {
                    None
                } else {
                    let user_id = enter_lobby(state, tx, nickname.clone());
                    // 通知房间内其他玩家
                    let join_msg = ServerMessage::Info { message: format!("{} 加入了房间", nickname) };
                    for member in r_members.iter() {
                        state.transport.send(*member, join_msg.clone());
                    }
                    r_members.push(user_id);
                    Some((user_id, r_members.len()))
                }
            };
            let Some((user_id, members)) = joined else {
                let _ = tx.send(ServerMessage::Error { message: "房间已满".to_string() }).await;
                return;
            };

            info!("玩家 {} 加入了房间 {}", user_id, room_id);
            *session = Some(Session { user_id, room_id: Some(room_id) });
            let _ = tx.send(ServerMessage::RoomJoined { your_id: user_id, room_id, seats: room.seats, members }).await;
            try_start_duel(state, room_id, &room);
        }
        ClientMessage::AskDuel => {
            let Some(user_id) = current_user(session, tx).await else {
                return;
            };
            let rsp = match state.registry.ask_duel(user_id) {
                Ok(snapshot) => ServerMessage::AskDuelRsp { retcode: Retcode::Succ, duel: Some(Box::new(snapshot)) },
                Err(e) => {
                    debug!("玩家 {} 请求对局失败: {}", user_id, e);
                    ServerMessage::AskDuelRsp { retcode: e.retcode(), duel: None }
                }
            };
            let _ = tx.send(rsp).await;
        }
        ClientMessage::InitFinish => {
            let Some(user_id) = current_user(session, tx).await else {
                return;
            };
            let retcode = match state.registry.init_finish(user_id) {
                Ok(()) => Retcode::Succ,
                Err(e) => e.retcode(),
            };
            let _ = tx.send(ServerMessage::InitFinishRsp { retcode }).await;
        }
        ClientMessage::Operation { op_seq, op } => {
            let Some(user_id) = current_user(session, tx).await else {
                return;
            };
            let retcode = match state.registry.operate(user_id, op) {
                Ok(()) => Retcode::Succ,
                Err(e) => e.retcode(),
            };
            let _ = tx.send(ServerMessage::OperationRsp { op_seq, retcode }).await;
        }
    }
}

/// 为新玩家分配Id，登记连接与外观信息
fn enter_lobby(state: &SharedState, tx: &mpsc::Sender<ServerMessage>, nickname: String) -> UserId {
    let user_id = Uuid::new_v4();
    state.transport.register(user_id, tx.clone());
    state.profiles.insert(user_id, PlayerProfile { nickname, avatar_id: 0, costume_id: 0 });
    user_id
}

async fn current_user(session: &Option<Session>, tx: &mpsc::Sender<ServerMessage>) -> Option<UserId> {
    match session {
        Some(s) => Some(s.user_id),
        None => {
            let _ = tx.send(ServerMessage::Error { message: "请先加入或创建房间".to_string() }).await;
            None
        }
    }
}

/// 房间满员后创建对局，并向每位成员发送对局简要信息
fn try_start_duel(state: &SharedState, room_id: RoomId, room: &Room) {
    let members = {
        let r_members = room.members.lock();
        if r_members.len() < room.seats as usize {
            return;
        }
        r_members.clone()
    };
    // 房间只会被解散一次
    if state.rooms.remove(&room_id).is_none() {
        return;
    }

    let brief = state
        .registry
        .create_duel(room.scenario_id, &members)
        .and_then(|duel| {
            let duel_id = duel.lock().guid();
            state.registry.brief(duel_id)
        });
    match brief {
        Ok(brief) => {
            info!("房间 {} 已满员，开始对局 {}", room_id, brief.duel_id);
            for member in &members {
                state.transport.send(*member, ServerMessage::DuelBrief(brief.clone()));
            }
        }
        Err(e) => {
            error!("房间 {} 创建对局失败: {}", room_id, e);
            for member in &members {
                state.transport.send(*member, ServerMessage::Error { message: "创建对局失败".to_string() });
            }
        }
    }
}

/// 玩家断开连接后的处理
fn handle_disconnect(state: &SharedState, session: Session) {
    let Session { user_id, room_id } = session;
    info!("玩家 {} 断开连接", user_id);
    state.transport.unregister(&user_id);
    state.profiles.remove(&user_id);

    // 仍在等待开局的房间
    if let Some(room_id) = room_id {
        if let Some(room) = state.rooms.get(&room_id).map(|r| r.clone()) {
            let empty = {
                let mut r_members = room.members.lock();
                r_members.retain(|id| *id != user_id);
                r_members.is_empty()
            };
            if empty {
                state.rooms.remove(&room_id);
                info!("房间 {} 已空，已被移除", room_id);
            }
        }
    }

    // 对局中已没有在线的真人玩家时销毁对局
    let Ok(duel) = state.registry.duel_of(user_id) else {
        return;
    };
    let (duel_id, anyone_left) = {
        let duel = duel.lock();
        let anyone_left = duel.human_users().iter().any(|u| state.transport.is_connected(u));
        (duel.guid(), anyone_left)
    };
    if !anyone_left {
        if let Err(e) = state.registry.destroy_duel(duel_id) {
            warn!("销毁对局 {} 失败: {}", duel_id, e);
        }
    }
}
