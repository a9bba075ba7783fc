use actix_web::web;
use crate::web::handlers;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/chat", web::post().to(handlers::chat))
        .route("/reset", web::post().to(handlers::reset))
        .route("/health", web::get().to(handlers::health_check));
}
