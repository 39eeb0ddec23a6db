//! Notes REST API — owner-scoped CRUD with conflict-aware updates.
//!
//! Every route requires a bearer token; verification happens before any
//! store access and short-circuits with 401 on failure. A stale update is
//! answered with 409 carrying the persisted note and the rejected changes.

use actix_web::{web, HttpRequest, HttpResponse, Responder};

use crate::db::BelievedMarker;
use crate::error::ServiceError;
use crate::models::{ConflictResponse, CreateNoteRequest, UpdateNoteRequest, UpdateOutcome};
use crate::AppState;

/// Validate the bearer token from a request and return the owner id
fn authenticate_request(
    state: &web::Data<AppState>,
    req: &HttpRequest,
) -> Result<i64, HttpResponse> {
    let token = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").to_string());

    let token = match token {
        Some(t) => t,
        None => {
            return Err(HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "No authorization token provided"
            })));
        }
    };

    state.authenticator.verify(&token).map_err(|_| {
        HttpResponse::Unauthorized().json(serde_json::json!({
            "error": "Invalid token"
        }))
    })
}

fn internal_error(context: &str, e: &ServiceError) -> HttpResponse {
    log::error!("{}: {}", context, e);
    HttpResponse::InternalServerError().json(serde_json::json!({
        "error": "Internal server error"
    }))
}

/// Pick the caller's believed concurrency marker out of an update request.
/// The revision counter is preferred; the observed updated_at value is the
/// fallback contract.
fn believed_marker(body: &UpdateNoteRequest) -> Result<BelievedMarker, ServiceError> {
    if let Some(revision) = body.revision {
        Ok(BelievedMarker::Revision(revision))
    } else if let Some(updated_at) = body.updated_at.clone() {
        Ok(BelievedMarker::UpdatedAt(updated_at))
    } else {
        Err(ServiceError::Validation(
            "Update requires the last observed revision or updated_at".to_string(),
        ))
    }
}

/// Create a note
async fn create_note(
    data: web::Data<AppState>,
    req: HttpRequest,
    body: web::Json<CreateNoteRequest>,
) -> impl Responder {
    let owner_id = match authenticate_request(&data, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if body.title.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Title must not be empty"
        }));
    }

    match data.db.insert_note(owner_id, &body.title, &body.content) {
        Ok(note) => HttpResponse::Ok().json(note),
        Err(e) => internal_error("Failed to create note", &e),
    }
}

/// List the caller's notes, most recently updated first
async fn list_notes(data: web::Data<AppState>, req: HttpRequest) -> impl Responder {
    let owner_id = match authenticate_request(&data, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match data.db.list_notes(owner_id) {
        Ok(notes) => HttpResponse::Ok().json(notes),
        Err(e) => internal_error("Failed to list notes", &e),
    }
}

/// Get a single note
async fn get_note(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let owner_id = match authenticate_request(&data, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let note_id = path.into_inner();

    match data.db.find_note(note_id, owner_id) {
        Ok(Some(note)) => HttpResponse::Ok().json(note),
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Note not found"
        })),
        Err(e) => internal_error("Failed to get note", &e),
    }
}

/// Conflict-aware update. The body must carry the concurrency marker the
/// caller last observed — `revision` or `updated_at`.
async fn update_note(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
    body: web::Json<UpdateNoteRequest>,
) -> impl Responder {
    let owner_id = match authenticate_request(&data, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let note_id = path.into_inner();

    if body.title.trim().is_empty() {
        return HttpResponse::BadRequest().json(serde_json::json!({
            "error": "Title must not be empty"
        }));
    }

    let believed = match believed_marker(&body) {
        Ok(marker) => marker,
        Err(e) => {
            return HttpResponse::BadRequest().json(serde_json::json!({
                "error": e.to_string()
            }));
        }
    };

    match data
        .db
        .compare_and_update(note_id, owner_id, &believed, &body.title, &body.content)
    {
        Ok(UpdateOutcome::Applied(note)) => HttpResponse::Ok().json(note),
        Ok(UpdateOutcome::Rejected { current, attempted }) => {
            HttpResponse::Conflict().json(ConflictResponse::new(current, attempted))
        }
        Err(ServiceError::NotFound) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Note not found"
        })),
        Err(e) => internal_error("Failed to update note", &e),
    }
}

/// Delete a note (no concurrency check — a delete always wins)
async fn delete_note(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<i64>,
) -> impl Responder {
    let owner_id = match authenticate_request(&data, &req) {
        Ok(id) => id,
        Err(resp) => return resp,
    };
    let note_id = path.into_inner();

    match data.db.delete_note(note_id, owner_id) {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "message": "Note deleted successfully"
        })),
        Err(ServiceError::NotFound) => HttpResponse::NotFound().json(serde_json::json!({
            "error": "Note not found"
        })),
        Err(e) => internal_error("Failed to delete note", &e),
    }
}

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/notes")
            .route("", web::post().to(create_note))
            .route("", web::get().to(list_notes))
            .route("/{id}", web::get().to(get_note))
            .route("/{id}", web::put().to(update_note))
            .route("/{id}", web::delete().to(delete_note)),
    );
}
