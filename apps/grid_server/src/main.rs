use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use gridcore::host::{ApplicationFactory, ParallelHost, SingleLoopScheduler};
use gridcore::pubsub::PubSub;
use gridcore::room::{Application, RoomHandle};
use gridcore::room_manager::{FixedRoomManager, RoomManager};
use gridfield::{Field, FieldApp, Map};
use gridproto::room::RoomId;
use gridstate::{
    ConnectService, InteractionService, InteractionState, ParallelStore, SingleLoopStore,
    TracingMetrics,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{Level, info, warn};

mod config;
mod debug_ws;
mod ws;

use config::Mode;

/// The two room-hosting shapes behind one accept-path contract.
enum RoomHost {
    Parallel(ParallelHost),
    Single(Arc<SingleLoopScheduler>),
}

impl RoomHost {
    async fn ensure_room(&self, room_id: RoomId) -> RoomHandle {
        match self {
            RoomHost::Parallel(host) => host.ensure_room(room_id),
            RoomHost::Single(scheduler) => scheduler.ensure_room(room_id).await,
        }
    }

    fn shutdown(&self) {
        match self {
            RoomHost::Parallel(host) => host.shutdown(),
            RoomHost::Single(scheduler) => scheduler.shutdown(),
        }
    }
}

struct AppState {
    pubsub: Arc<PubSub>,
    room_manager: Arc<dyn RoomManager>,
    host: RoomHost,
    interactions: InteractionService,
    connect: ConnectService,
    debug_clients: debug_ws::Clients,
    idle_timeout: Duration,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,grid_server=info".into()),
        )
        .with_target(false)
        .with_max_level(Level::INFO)
        .init();

    let cfg = config::parse_args();

    let pubsub = Arc::new(PubSub::new());
    let room_manager = Arc::new(FixedRoomManager::new(cfg.room_id));

    let map_width = cfg.map_width;
    let map_height = cfg.map_height;
    let factory: ApplicationFactory = Arc::new(move |_room_id| {
        Box::new(FieldApp::new(Field::new(Map::new(map_width, map_height, 1.0))))
            as Box<dyn Application>
    });

    let metrics = Arc::new(TracingMetrics);
    let (host, store): (RoomHost, Arc<dyn InteractionState>) = match cfg.mode {
        Mode::Parallel => {
            let host = ParallelHost::new(pubsub.clone(), factory)
                .with_tick_interval(cfg.tick_interval());
            (
                RoomHost::Parallel(host),
                Arc::new(ParallelStore::new(metrics.clone())),
            )
        }
        Mode::Single => {
            let scheduler = Arc::new(
                SingleLoopScheduler::new(pubsub.clone(), factory)
                    .with_tick_interval(cfg.tick_interval()),
            );
            let runner = scheduler.clone();
            tokio::spawn(async move { runner.run().await });
            (
                RoomHost::Single(scheduler),
                Arc::new(SingleLoopStore::spawn()),
            )
        }
    };

    // The default room exists before the first client can race its join.
    host.ensure_room(cfg.room_id).await;

    let state: SharedState = Arc::new(AppState {
        pubsub,
        room_manager,
        host,
        interactions: InteractionService::new(store.clone(), metrics),
        connect: ConnectService::new(store, cfg.room_id.to_string()),
        debug_clients: debug_ws::Clients::default(),
        idle_timeout: cfg.idle_timeout,
    });

    let app = Router::new()
        .route("/ws", get(ws::accept))
        .route("/connect", post(connect))
        .route("/debug/ws", get(debug_ws::accept))
        .route("/healthz", get(healthz))
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(cfg.bind).await?;
    info!(bind = %cfg.bind, mode = cfg.mode.as_str(), room = %cfg.room_id, tick_hz = cfg.tick_hz, "grid server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.host.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[derive(Serialize)]
struct ConnectResponse {
    player_id: String,
    room_id: String,
}

async fn connect(State(state): State<SharedState>) -> Result<Json<ConnectResponse>, StatusCode> {
    match state.connect.connect().await {
        Ok((player_id, room_id)) => Ok(Json(ConnectResponse { player_id, room_id })),
        Err(err) => {
            warn!(err = %err, "connect failed");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
