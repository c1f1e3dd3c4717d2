use actix_web::error::InternalError;
use actix_web::http::header::ContentType;
use actix_web::HttpResponse;
use paperclip::actix::web;

use crate::handlers;

pub fn config_app(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(handlers::health)))
        .service(
            web::scope("/api")
                .service(
                    web::resource("/books")
                        .route(web::get().to(handlers::get_all_books))
                        .route(web::post().to(handlers::add_book)),
                )
                .service(
                    web::resource("/books/{book_id}")
                        .route(web::get().to(handlers::get_book))
                        .route(web::put().to(handlers::update_book))
                        .route(web::delete().to(handlers::delete_book)),
                ),
        );
}

/// Bodies are decoded regardless of content type, decoding failures are server errors
pub fn json_config() -> actix_web::web::JsonConfig {
    actix_web::web::JsonConfig::default()
        .content_type_required(false)
        .error_handler(|err, _req| {
            let response = HttpResponse::InternalServerError()
                .content_type(ContentType::plaintext())
                .body(format!("Invalid request body: {}", err));
            InternalError::from_response(err, response).into()
        })
}
