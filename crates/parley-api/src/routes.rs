use axum::{
    Router,
    extract::{State, WebSocketUpgrade},
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};

use parley_gateway::connection;

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{bot, chat, friends, users};

/// Full application router: REST under `/api`, the health check at `/`
/// and the realtime gateway at `/gateway`.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/friendrequest/sent/{user_id}", get(friends::list_sent))
        .route("/friendrequest/received/{user_id}", get(friends::list_received))
        .route("/friends/{user_id}", get(friends::list_friends))
        .route("/chat/{user_id}/{friend_id}", get(chat::read_thread))
        .route("/ask", post(bot::ask));

    let protected_routes = Router::new()
        .route("/friendrequest/send", post(friends::send_request))
        .route("/friendrequest/accept", post(friends::accept_request))
        .route("/friendrequest/reject", post(friends::reject_request))
        .route("/chat/{user_id}/{friend_id}", post(chat::send_message))
        .route("/chat/{message_id}", delete(chat::delete_message))
        .route("/user/{id}", get(users::get_profile))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let api = Router::new().merge(public_routes).merge(protected_routes);

    Router::new()
        .route("/", get(health))
        .route("/gateway", get(ws_upgrade))
        .nest("/api", api)
        .with_state(state)
}

async fn health() -> &'static str {
    "Connected to backend"
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    let router = state.delivery.router().clone();
    let jwt_secret = state.jwt_secret.clone();
    ws.on_upgrade(move |socket| connection::handle_connection(socket, router, jwt_secret))
}
