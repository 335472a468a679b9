use axum::{Extension, Json, extract::State, http::StatusCode};

use momo_types::api::Claims;
use momo_types::models::User;

use crate::{auth::AppState, with_db};

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, StatusCode> {
    let user = with_db(&state, move |db| db.get_user_by_id(claims.sub))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(User {
        id: user.id,
        name: user.name,
    }))
}
