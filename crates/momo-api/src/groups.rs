//! Group management. A group's id doubles as its conversation id.

use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;

use momo_db::models::GroupRow;
use momo_types::api::{Claims, CreateGroupRequest, GroupIdRequest};
use momo_types::models::{Group, User};

use crate::{auth::AppState, with_db};

fn group_from_row(row: GroupRow) -> Group {
    Group {
        id: row.id,
        owner_id: row.owner_id,
        name: row.name,
    }
}

pub async fn create(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let name = req.name.trim().to_string();
    if name.is_empty() || name.chars().count() > 64 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let row = with_db(&state, move |db| db.create_group(claims.sub, &name)).await?;
    info!("User {} created group {}", claims.sub, row.id);

    Ok((StatusCode::CREATED, Json(group_from_row(row))))
}

pub async fn join(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GroupIdRequest>,
) -> Result<StatusCode, StatusCode> {
    let group_id = req.group_id;
    let joined = with_db(&state, move |db| {
        if db.get_group(group_id)?.is_none() {
            return Ok(None);
        }
        db.add_group_member(group_id, claims.sub).map(Some)
    })
    .await?
    .ok_or(StatusCode::NOT_FOUND)?;

    if joined {
        info!("User {} joined group {}", claims.sub, group_id);
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn members(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<GroupIdRequest>,
) -> Result<Json<Vec<User>>, StatusCode> {
    let group_id = req.group_id;
    let members = with_db(&state, move |db| {
        if db.get_group(group_id)?.is_none() {
            return Ok(Err(StatusCode::NOT_FOUND));
        }
        if !db.is_group_member(group_id, claims.sub)? {
            return Ok(Err(StatusCode::FORBIDDEN));
        }
        db.list_group_members(group_id).map(Ok)
    })
    .await??;

    Ok(Json(
        members
            .into_iter()
            .map(|(id, name)| User { id, name })
            .collect(),
    ))
}

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Group>>, StatusCode> {
    let rows = with_db(&state, move |db| db.groups_for_user(claims.sub)).await?;
    Ok(Json(rows.into_iter().map(group_from_row).collect()))
}
