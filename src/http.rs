use std::sync::Arc;

use actix_web::{HttpResponse, Responder, get, post, web};
use serde::Deserialize;
use serde_json::json;
use tracing::error;
use uuid::Uuid;

use crate::models::{NewEntry, Status};
use crate::store::{RecordStore, StoreError};

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 500;

pub struct AppState {
    pub store: Arc<dyn RecordStore>,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health_check)
        .service(enqueue)
        .service(list_entries)
        .service(get_entry)
        .service(replay_entry);
}

#[get("/health")]
async fn health_check() -> impl Responder {
    // Just return a 200 OK response
    HttpResponse::Ok().body("OK")
}

#[post("/webhooks")]
async fn enqueue(state: web::Data<AppState>, body: web::Json<NewEntry>) -> impl Responder {
    let new = body.into_inner();
    if new.aggregate_id.is_empty() {
        return HttpResponse::BadRequest().json(json!({"error": "aggregate_id must not be empty"}));
    }
    if new.sequence < 0 {
        return HttpResponse::BadRequest().json(json!({"error": "sequence must be non-negative"}));
    }
    if new.endpoint.is_empty() {
        return HttpResponse::BadRequest().json(json!({"error": "endpoint must not be empty"}));
    }

    match state.store.enqueue(new).await {
        Ok(entry) => HttpResponse::Created().json(entry),
        Err(e @ StoreError::DuplicateSequence) => {
            HttpResponse::Conflict().json(json!({"error": e.to_string()}))
        }
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<Status>,
    limit: Option<i64>,
}

#[get("/webhooks")]
async fn list_entries(state: web::Data<AppState>, query: web::Query<ListQuery>) -> impl Responder {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    match state.store.list(query.status, limit).await {
        Ok(entries) => HttpResponse::Ok().json(entries),
        Err(e) => internal_error(e),
    }
}

#[get("/webhooks/{id}")]
async fn get_entry(state: web::Data<AppState>, id: web::Path<Uuid>) -> impl Responder {
    match state.store.find(id.into_inner()).await {
        Ok(Some(entry)) => HttpResponse::Ok().json(entry),
        Ok(None) => HttpResponse::NotFound().json(json!({"error": "entry not found"})),
        Err(e) => internal_error(e),
    }
}

#[post("/webhooks/{id}/replay")]
async fn replay_entry(state: web::Data<AppState>, id: web::Path<Uuid>) -> impl Responder {
    match state.store.replay(id.into_inner()).await {
        Ok(entry) => HttpResponse::Ok().json(entry),
        Err(e @ StoreError::NotDead(_)) => {
            HttpResponse::Conflict().json(json!({"error": e.to_string()}))
        }
        Err(e @ StoreError::NotFound) => {
            HttpResponse::NotFound().json(json!({"error": e.to_string()}))
        }
        Err(e) => internal_error(e),
    }
}

fn internal_error(e: StoreError) -> HttpResponse {
    error!("Store operation failed: {e}");
    HttpResponse::InternalServerError().json(json!({"error": "internal error"}))
}
