pub mod auth;
pub mod chats;
pub mod health;
pub mod images;
pub mod measurements;
pub mod notifications;
pub mod profiles;
pub mod projects;
pub mod quotations;
pub mod suggestions;
pub mod ws;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use std::sync::Arc;

use crate::app::AppState;

/// Full router: `/health` at the root, everything else under `/api`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_router())
}

/// Build the API router with all routes
fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/auth/password", put(auth::change_password))
        // Profiles
        .route(
            "/customers/me",
            get(profiles::get_customer_profile).put(profiles::update_customer_profile),
        )
        .route(
            "/sellers/me",
            get(profiles::get_seller_profile).put(profiles::update_seller_profile),
        )
        .route(
            "/designers/me",
            get(profiles::get_designer_profile).put(profiles::update_designer_profile),
        )
        .route("/sellers", get(profiles::list_sellers))
        .route("/sellers/:id", get(profiles::get_seller))
        .route("/designers", get(profiles::list_designers))
        .route("/designers/:id", get(profiles::get_designer))
        // Projects
        .route(
            "/projects",
            post(projects::create_project).get(projects::list_projects),
        )
        .route(
            "/projects/:id",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/projects/:id/submit", post(projects::submit_project))
        .route("/projects/:id/designer", post(projects::assign_designer))
        .route("/projects/:id/status", patch(projects::update_status))
        .route("/projects/:id/history", get(projects::status_history))
        // Measurements
        .route(
            "/projects/:id/measurements",
            post(measurements::create_measurement).get(measurements::list_measurements),
        )
        .route(
            "/measurements/:id",
            put(measurements::update_measurement).delete(measurements::delete_measurement),
        )
        // Images
        .route(
            "/projects/:id/images",
            post(images::upload_image).get(images::list_images),
        )
        .route("/images/:id", delete(images::delete_image))
        // Suggestions
        .route(
            "/projects/:id/suggestions",
            post(suggestions::create_suggestion).get(suggestions::list_suggestions),
        )
        .route(
            "/suggestions/:id",
            put(suggestions::update_suggestion).delete(suggestions::delete_suggestion),
        )
        .route(
            "/suggestions/:id/review",
            post(suggestions::review_suggestion),
        )
        // Quotations
        .route(
            "/projects/:id/quotations",
            post(quotations::create_quotation).get(quotations::list_project_quotations),
        )
        .route("/quotations/preview", post(quotations::preview_quotation))
        .route("/quotations/mine", get(quotations::my_quotations))
        .route(
            "/quotations/:id",
            get(quotations::get_quotation)
                .put(quotations::update_quotation)
                .delete(quotations::delete_quotation),
        )
        .route("/quotations/:id/send", post(quotations::send_quotation))
        .route("/quotations/:id/accept", post(quotations::accept_quotation))
        .route("/quotations/:id/reject", post(quotations::reject_quotation))
        // Chat
        .route("/chats", post(chats::start_chat).get(chats::list_chats))
        .route(
            "/chats/:id/messages",
            get(chats::list_messages).post(chats::send_message),
        )
        .route("/chats/:id/read", post(chats::mark_chat_read))
        .route("/ws", get(ws::ws_handler))
        // Notifications
        .route(
            "/notifications",
            get(notifications::list_notifications).delete(notifications::delete_read),
        )
        .route(
            "/notifications/unread-count",
            get(notifications::unread_count),
        )
        .route(
            "/notifications/read-all",
            put(notifications::mark_all_read),
        )
        .route(
            "/notifications/mark-read",
            post(notifications::mark_batch_read),
        )
        .route(
            "/notifications/:id",
            get(notifications::get_notification).delete(notifications::delete_notification),
        )
        .route("/notifications/:id/read", put(notifications::mark_read))
}
