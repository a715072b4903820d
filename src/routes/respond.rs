//! The `{success, message, data}` envelope every endpoint answers with.

use actix_web::HttpResponse;
use serde::Serialize;
use serde_json::json;

pub fn ok(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "message": message }))
}

pub fn ok_with<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "message": message, "data": data }))
}

pub fn created<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Created().json(json!({ "success": true, "message": message, "data": data }))
}
