use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, IsNull, Output, ToSql};
use diesel::sql_types::Text;
use diesel::{AsExpression, FromSqlRow};
use log::error;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::resolver::Role;
use crate::auth::CurrentUser;
use crate::email::TicketCreatedEmail;
use crate::shared::schema::{sav_notes, sav_tickets};
use crate::shared::state::AppState;

/// Ticket lifecycle values. A flat set: any value may replace any other,
/// there is no transition guard.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Pending,
    InProgress,
    Resolved,
    Cancelled,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Pending => "pending",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "pending" => Ok(TicketStatus::Pending),
            "in_progress" => Ok(TicketStatus::InProgress),
            "resolved" => Ok(TicketStatus::Resolved),
            "cancelled" => Ok(TicketStatus::Cancelled),
            other => Err(format!("unrecognized ticket status: {other}")),
        }
    }
}

impl ToSql<Text, Pg> for TicketStatus {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for TicketStatus {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = std::str::from_utf8(bytes.as_bytes())?;
        TicketStatus::parse(value).map_err(Into::into)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsExpression, FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "kebab-case")]
pub enum ProductType {
    Smartphone,
    Tablet,
    Computer,
    Tv,
    AudioSystem,
}

impl ProductType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProductType::Smartphone => "smartphone",
            ProductType::Tablet => "tablet",
            ProductType::Computer => "computer",
            ProductType::Tv => "tv",
            ProductType::AudioSystem => "audio-system",
        }
    }

    pub fn parse(value: &str) -> Result<Self, String> {
        match value {
            "smartphone" => Ok(ProductType::Smartphone),
            "tablet" => Ok(ProductType::Tablet),
            "computer" => Ok(ProductType::Computer),
            "tv" => Ok(ProductType::Tv),
            "audio-system" => Ok(ProductType::AudioSystem),
            other => Err(format!("unrecognized product type: {other}")),
        }
    }
}

impl ToSql<Text, Pg> for ProductType {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        out.write_all(self.as_str().as_bytes())?;
        Ok(IsNull::No)
    }
}

impl FromSql<Text, Pg> for ProductType {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = std::str::from_utf8(bytes.as_bytes())?;
        ProductType::parse(value).map_err(Into::into)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = sav_tickets)]
pub struct SavTicket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub product_type: ProductType,
    pub serial_number: String,
    pub description: String,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Queryable, Insertable)]
#[diesel(table_name = sav_notes)]
pub struct SavNote {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTicketRequest {
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub product_type: ProductType,
    pub serial_number: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: TicketStatus,
}

#[derive(Debug, Deserialize)]
pub struct CreateNoteRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    pub confirm: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoardAction {
    UpdateStatus,
    AddNote,
    DeleteTicket,
}

/// Role gate for the board mutations. Evaluated before any store query is
/// built, so a rejected caller never produces a database call.
pub fn authorize(role: Option<Role>, action: BoardAction) -> Result<(), String> {
    match role {
        Some(role) if role.is_privileged() => Ok(()),
        _ => Err(match action {
            BoardAction::UpdateStatus => {
                "Vous n'avez pas les droits pour modifier le statut".to_string()
            }
            BoardAction::AddNote => {
                "Vous n'avez pas les droits pour ajouter des notes".to_string()
            }
            BoardAction::DeleteTicket => {
                "Vous n'avez pas les droits pour supprimer les tickets".to_string()
            }
        }),
    }
}

/// Intake validation: the six fields must be non-empty and the email must
/// look like a mailbox. Values are stored verbatim, never transformed.
pub fn validate_submission(req: &CreateTicketRequest) -> Result<(), String> {
    let required = [
        ("nom", &req.customer_name),
        ("email", &req.email),
        ("téléphone", &req.phone),
        ("numéro de série", &req.serial_number),
        ("description", &req.description),
    ];
    for (label, value) in required {
        if value.trim().is_empty() {
            return Err(format!("Le champ {label} est requis"));
        }
    }
    match req.email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err("Adresse email invalide".to_string()),
    }
}

pub fn validate_note(content: &str) -> Result<(), String> {
    if content.trim().is_empty() {
        return Err("La note est vide".to_string());
    }
    Ok(())
}

/// Intake: insert exactly one pending ticket owned by the caller, then
/// notify. A notification failure fails the request but the inserted row is
/// kept; there is no compensating delete.
pub async fn create_ticket(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateTicketRequest>,
) -> Result<Json<SavTicket>, (StatusCode, String)> {
    validate_submission(&req).map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e))?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let now = Utc::now();
    let ticket = SavTicket {
        id: Uuid::new_v4(),
        user_id: user.identity.id,
        customer_name: req.customer_name,
        email: req.email,
        phone: req.phone,
        product_type: req.product_type,
        serial_number: req.serial_number,
        description: req.description,
        status: TicketStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    diesel::insert_into(sav_tickets::table)
        .values(&ticket)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    let payload = TicketCreatedEmail {
        customer_name: ticket.customer_name.clone(),
        email: ticket.email.clone(),
        product_type: ticket.product_type.as_str().to_string(),
        description: ticket.description.clone(),
    };
    if let Err(e) = state.notifier.ticket_created(&payload) {
        error!("Ticket {} created but notification failed: {e}", ticket.id);
        return Err((
            StatusCode::BAD_GATEWAY,
            "Erreur lors de l'envoi de l'email".to_string(),
        ));
    }

    Ok(Json(ticket))
}

/// Board: every ticket the store lets the caller read, newest first. No
/// ownership filtering is applied here; row visibility is the store's job.
pub async fn list_tickets(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
) -> Result<Json<Vec<SavTicket>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let tickets: Vec<SavTicket> = sav_tickets::table
        .order(sav_tickets::created_at.desc())
        .load(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(tickets))
}

pub async fn list_notes(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(ticket_id): Path<Uuid>,
) -> Result<Json<Vec<SavNote>>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let notes = load_notes(&mut conn, ticket_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(notes))
}

/// Detail fetch backing ticket selection on the board.
pub async fn get_ticket(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SavTicket>, (StatusCode, String)> {
    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let ticket: SavTicket = sav_tickets::table
        .filter(sav_tickets::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Ticket introuvable".to_string()))?;

    Ok(Json(ticket))
}

fn load_notes(conn: &mut diesel::PgConnection, ticket_id: Uuid) -> QueryResult<Vec<SavNote>> {
    sav_notes::table
        .filter(sav_notes::ticket_id.eq(ticket_id))
        .order(sav_notes::created_at.asc())
        .load(conn)
}

/// Flat status assignment; only `status` and `updated_at` change.
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<SavTicket>, (StatusCode, String)> {
    authorize(user.role, BoardAction::UpdateStatus)
        .map_err(|e| (StatusCode::FORBIDDEN, e))?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let updated = diesel::update(sav_tickets::table.filter(sav_tickets::id.eq(id)))
        .set((
            sav_tickets::status.eq(req.status),
            sav_tickets::updated_at.eq(Utc::now()),
        ))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Update error: {e}")))?;

    if updated == 0 {
        return Err((StatusCode::NOT_FOUND, "Ticket introuvable".to_string()));
    }

    let ticket: SavTicket = sav_tickets::table
        .filter(sav_tickets::id.eq(id))
        .first(&mut conn)
        .map_err(|_| (StatusCode::NOT_FOUND, "Ticket introuvable".to_string()))?;

    Ok(Json(ticket))
}

/// Append-only note feed. Returns the refreshed ascending list so the caller
/// can redraw without a second round trip.
pub async fn add_note(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(ticket_id): Path<Uuid>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<Json<Vec<SavNote>>, (StatusCode, String)> {
    authorize(user.role, BoardAction::AddNote).map_err(|e| (StatusCode::FORBIDDEN, e))?;
    validate_note(&req.content).map_err(|e| (StatusCode::UNPROCESSABLE_ENTITY, e))?;

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let note = SavNote {
        id: Uuid::new_v4(),
        ticket_id,
        user_id: user.identity.id,
        content: req.content,
        created_at: Utc::now(),
    };

    diesel::insert_into(sav_notes::table)
        .values(&note)
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Insert error: {e}")))?;

    let notes = load_notes(&mut conn, ticket_id)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Query error: {e}")))?;

    Ok(Json(notes))
}

/// Deletion needs the explicit `confirm=true` flag, the service-side shape
/// of the blocking confirmation prompt. Without it the store is not touched.
pub async fn delete_ticket(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, (StatusCode, String)> {
    authorize(user.role, BoardAction::DeleteTicket).map_err(|e| (StatusCode::FORBIDDEN, e))?;

    if query.confirm != Some(true) {
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            "Suppression non confirmée".to_string(),
        ));
    }

    let mut conn = state
        .conn
        .get()
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let deleted = diesel::delete(sav_tickets::table.filter(sav_tickets::id.eq(id)))
        .execute(&mut conn)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Delete error: {e}")))?;

    if deleted == 0 {
        return Err((StatusCode::NOT_FOUND, "Ticket introuvable".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub fn configure_sav_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/:id", get(get_ticket).delete(delete_ticket))
        .route("/api/tickets/:id/status", put(update_status))
        .route("/api/tickets/:id/notes", get(list_notes).post(add_note))
}
