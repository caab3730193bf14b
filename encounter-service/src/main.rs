// Copyright (C) 2026 StarHuntingGames
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

mod config;
mod engine;
mod state;

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use encounter_common::{
    BossDamageResponse, BossView, DamageRequest, DifficultyResponse, PLAYER_ID_HEADER, PlayerId,
    PlayerHpResponse, PlayerView, StartEncounterRequest, StartEncounterResponse,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::state::{Damage, EncounterError, EncounterState};

#[derive(Clone)]
struct AppState {
    encounter: Arc<EncounterState>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "encounter_service=debug,tower_http=info".to_string()),
        )
        .init();

    let boss = config::load_boss_config();
    let player_max_hp = config::player_max_hp();
    info!(
        boss = %boss.name,
        boss_max_health = boss.max_health,
        player_max_hp,
        "encounter state initialized"
    );

    let state = AppState {
        encounter: Arc::new(EncounterState::new(boss, player_max_hp)),
    };

    let app = build_router(state);

    let bind_addr = parse_bind_addr("ENCOUNTER_SERVICE_BIND", "0.0.0.0:5000")?;
    info!(%bind_addr, "encounter-service listening");
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/encounters", post(start_encounter_handler))
        .route("/api/boss", get(get_boss_handler))
        .route("/api/boss/damage", post(damage_boss_handler))
        .route("/api/difficulty", get(get_difficulty_handler))
        .route("/api/player", get(get_player_handler))
        .route("/api/player/damage", post(strict_damage_player_handler))
        .route(
            "/api/player/hp",
            get(get_player_hp_handler).post(damage_player_handler),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn parse_bind_addr(var_name: &str, default: &str) -> anyhow::Result<SocketAddr> {
    let value = std::env::var(var_name)
        .ok()
        .unwrap_or_else(|| default.to_string());
    value.parse().context(format!("invalid {var_name}"))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "ok": true,
        "service": "encounter-service",
        "live_players": state.encounter.live_players(),
    }))
}

/// Identity of the caller as forwarded by the session layer.
fn caller_identity(headers: &HeaderMap) -> Result<PlayerId, ApiError> {
    headers
        .get(PLAYER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| EncounterError::MissingIdentity.into())
}

async fn start_encounter_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Option<Json<StartEncounterRequest>>,
) -> Result<Json<StartEncounterResponse>, ApiError> {
    let player_id = caller_identity(&headers)?;
    let difficulty = request
        .and_then(|Json(request)| request.difficulty)
        .unwrap_or_default();

    let (player, boss) = state
        .encounter
        .start_encounter(&player_id, difficulty)
        .await;

    Ok(Json(StartEncounterResponse {
        started: true,
        player_id,
        difficulty: player.difficulty,
        hp: player.hp,
        boss,
        started_at: player.started_at,
    }))
}

async fn get_boss_handler(State(state): State<AppState>) -> Json<BossView> {
    Json(state.encounter.boss_view().await)
}

async fn damage_boss_handler(
    State(state): State<AppState>,
    Json(request): Json<DamageRequest>,
) -> Result<Json<BossDamageResponse>, ApiError> {
    let damage = Damage::new(request.damage)?;
    Ok(Json(state.encounter.apply_boss_damage(damage).await))
}

async fn get_difficulty_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<DifficultyResponse>, ApiError> {
    let player_id = caller_identity(&headers)?;
    let difficulty = state.encounter.difficulty(&player_id)?;
    Ok(Json(DifficultyResponse { difficulty }))
}

async fn get_player_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PlayerView>, ApiError> {
    let player_id = caller_identity(&headers)?;
    Ok(Json(state.encounter.player_view(&player_id)?))
}

async fn get_player_hp_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<PlayerHpResponse>, ApiError> {
    let player_id = caller_identity(&headers)?;
    let player = state.encounter.player_view_or_start(&player_id);
    Ok(Json(PlayerHpResponse { hp: player.hp }))
}

async fn damage_player_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DamageRequest>,
) -> Result<Json<PlayerHpResponse>, ApiError> {
    let player_id = caller_identity(&headers)?;
    let damage = Damage::new(request.damage)?;
    let hp = state
        .encounter
        .apply_player_damage_or_start(&player_id, damage);
    Ok(Json(PlayerHpResponse { hp }))
}

/// Damage for callers that must not start an encounter implicitly; an
/// eliminated or never-started player is a 404 here.
async fn strict_damage_player_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DamageRequest>,
) -> Result<Json<PlayerHpResponse>, ApiError> {
    let player_id = caller_identity(&headers)?;
    let damage = Damage::new(request.damage)?;
    let hp = state.encounter.apply_player_damage(&player_id, damage)?;
    Ok(Json(PlayerHpResponse { hp }))
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<EncounterError> for ApiError {
    fn from(error: EncounterError) -> Self {
        let status = match error {
            EncounterError::NotFound { .. } => StatusCode::NOT_FOUND,
            EncounterError::NegativeDamage(_) => StatusCode::BAD_REQUEST,
            EncounterError::MissingIdentity => StatusCode::UNAUTHORIZED,
        };
        Self {
            status,
            message: error.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, message = %self.message, "request failed");
        (
            self.status,
            Json(serde_json::json!({"error": self.message})),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BossConfig;
    use axum::http::HeaderValue;
    use encounter_common::DifficultyTier;

    fn app_state() -> AppState {
        AppState {
            encounter: Arc::new(EncounterState::new(BossConfig::default(), 100)),
        }
    }

    fn headers_for(player_id: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(PLAYER_ID_HEADER, HeaderValue::from_str(player_id).unwrap());
        headers
    }

    async fn start(state: &AppState, player_id: &str, difficulty: DifficultyTier) {
        start_encounter_handler(
            State(state.clone()),
            headers_for(player_id),
            Some(Json(StartEncounterRequest {
                difficulty: Some(difficulty),
            })),
        )
        .await
        .unwrap();
    }

    #[test]
    fn caller_identity_requires_non_blank_header() {
        assert_eq!(
            caller_identity(&HeaderMap::new()).unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            caller_identity(&headers_for("   ")).unwrap_err().status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(caller_identity(&headers_for(" alice ")).unwrap(), "alice");
    }

    #[tokio::test]
    async fn start_then_get_difficulty_returns_selected_tier() {
        let state = app_state();
        start(&state, "alice", DifficultyTier::Hard).await;

        let response = get_difficulty_handler(State(state), headers_for("alice"))
            .await
            .unwrap()
            .0;
        assert_eq!(response.difficulty, DifficultyTier::Hard);
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            serde_json::json!({"difficulty": 5})
        );
    }

    #[tokio::test]
    async fn start_without_body_uses_default_difficulty_and_full_boss() {
        let state = app_state();
        state
            .encounter
            .apply_boss_damage(Damage::new(400).unwrap())
            .await;

        let response = start_encounter_handler(State(state.clone()), headers_for("bob"), None)
            .await
            .unwrap()
            .0;

        assert!(response.started);
        assert_eq!(response.difficulty, DifficultyTier::Easy);
        assert_eq!(response.hp, 100);
        assert_eq!(response.boss.health, 1000);
    }

    #[tokio::test]
    async fn get_difficulty_without_encounter_is_not_found() {
        let err = get_difficulty_handler(State(app_state()), headers_for("ghost"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_boss_reports_configured_boss() {
        let boss = get_boss_handler(State(app_state())).await.0;
        assert_eq!(boss.name, "The Overlord");
        assert_eq!(boss.key_word, "conquest");
        assert_eq!(boss.health, 1000);
        assert!(!boss.world_boss);
    }

    #[tokio::test]
    async fn damage_boss_reports_defeat_once_and_resets() {
        let state = app_state();
        let first = damage_boss_handler(State(state.clone()), Json(DamageRequest { damage: 999 }))
            .await
            .unwrap()
            .0;
        assert_eq!(first, BossDamageResponse { health: 1, defeated: false });

        let second = damage_boss_handler(State(state.clone()), Json(DamageRequest { damage: 5 }))
            .await
            .unwrap()
            .0;
        assert_eq!(second, BossDamageResponse { health: 1000, defeated: true });
    }

    #[tokio::test]
    async fn negative_damage_is_bad_request() {
        let state = app_state();
        let err = damage_boss_handler(State(state.clone()), Json(DamageRequest { damage: -10 }))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err = damage_player_handler(
            State(state.clone()),
            headers_for("alice"),
            Json(DamageRequest { damage: -1 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(state.encounter.boss_view().await.health, 1000);
    }

    #[tokio::test]
    async fn player_hp_read_auto_starts_default_record() {
        let state = app_state();
        let response = get_player_hp_handler(State(state.clone()), headers_for("carol"))
            .await
            .unwrap()
            .0;
        assert_eq!(response.hp, 100);
        assert_eq!(
            state.encounter.difficulty("carol").unwrap(),
            DifficultyTier::Easy
        );
    }

    #[tokio::test]
    async fn player_damage_eliminates_then_restarts_fresh() {
        let state = app_state();
        start(&state, "alice", DifficultyTier::Inferno).await;

        let hit = damage_player_handler(
            State(state.clone()),
            headers_for("alice"),
            Json(DamageRequest { damage: 70 }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(hit.hp, 30);

        let killed = damage_player_handler(
            State(state.clone()),
            headers_for("alice"),
            Json(DamageRequest { damage: 50 }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(killed.hp, 0);

        let err = get_difficulty_handler(State(state.clone()), headers_for("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let fresh = get_player_hp_handler(State(state.clone()), headers_for("alice"))
            .await
            .unwrap()
            .0;
        assert_eq!(fresh.hp, 100);
        assert_eq!(
            state.encounter.difficulty("alice").unwrap(),
            DifficultyTier::Easy
        );
    }

    #[tokio::test]
    async fn api_error_renders_json_body() {
        let response = ApiError::from(EncounterError::NotFound {
            player_id: "ghost".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_player_returns_live_record_or_not_found() {
        let state = app_state();
        let err = get_player_handler(State(state.clone()), headers_for("alice"))
            .await
            .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        start(&state, "alice", DifficultyTier::Medium).await;
        let view = get_player_handler(State(state), headers_for("alice"))
            .await
            .unwrap()
            .0;
        assert_eq!(view.player_id, "alice");
        assert_eq!(view.hp, 100);
        assert_eq!(view.difficulty, DifficultyTier::Medium);
    }

    #[tokio::test]
    async fn strict_player_damage_does_not_start_encounter() {
        let state = app_state();
        let err = strict_damage_player_handler(
            State(state.clone()),
            headers_for("dave"),
            Json(DamageRequest { damage: 10 }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(state.encounter.live_players(), 0);

        start(&state, "dave", DifficultyTier::Easy).await;
        let hit = strict_damage_player_handler(
            State(state),
            headers_for("dave"),
            Json(DamageRequest { damage: 10 }),
        )
        .await
        .unwrap()
        .0;
        assert_eq!(hit.hp, 90);
    }

    #[tokio::test]
    async fn health_reports_service_name() {
        let state = app_state();
        start(&state, "alice", DifficultyTier::Easy).await;

        let payload = health(State(state)).await.0;
        assert_eq!(payload["ok"], true);
        assert_eq!(payload["service"], "encounter-service");
        assert_eq!(payload["live_players"], 1);
    }
}
