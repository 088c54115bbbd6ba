use api_state::ApiState;
use axum::{
    extract::{DefaultBodyLimit, FromRef},
    routing::{get, post},
    Router,
};
use routes::{
    artifacts::{download, generate_notes, generate_practice_test},
    chat::{chat, chat_history},
    health::health,
    sessions::{create_session, delete_session, get_session, list_sessions, update_session},
    upload::upload_documents,
};

pub mod api_state;
pub mod error;
pub mod routes;

/// Full HTTP surface of the service.
pub fn api_routes<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    Router::new()
        .route("/health", get(health))
        .route("/sessions/create", post(create_session))
        .route("/sessions/{user_id}", get(list_sessions))
        .route(
            "/sessions/{user_id}/{session_id}",
            get(get_session).put(update_session).delete(delete_session),
        )
        .route(
            "/upload",
            post(upload_documents).layer(DefaultBodyLimit::max(
                app_state.config.upload_max_body_bytes,
            )),
        )
        .route("/chat", post(chat))
        .route("/chat-history/{user_id}/{session_id}", get(chat_history))
        .route("/generate-notes", post(generate_notes))
        .route("/generate-practice-test", post(generate_practice_test))
        .route("/download/{filename}", get(download))
}
