use axum::{
    Json, Router,
    extract::{Query, State},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;
use uuid::Uuid;

use crate::auth;
use crate::config::Config;
use crate::error::{
    ApiError, E_INVALID_INIT_DATA, E_MISSING_ADMIN, E_MISSING_FIELDS, E_MISSING_UID,
    E_MISSING_USER_ID, E_PROFILE_NOT_FOUND, E_REQUEST_NOT_FOUND,
};
use crate::responses::ApiOk;
use crate::store::Store;
use crate::types::{AdCredit, Decision, Profile, User, WithdrawalRequest};
use crate::workflow;

/// The application state.
#[derive(Clone)]
pub struct AppState<S> {
    pub store: S,
    pub config: Config,
}

pub fn init_router<S: Store>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/auth/telegram", post(authenticate::<S>))
        .route("/profile", post(get_profile::<S>))
        .route("/ads/credit", post(credit_for_ad::<S>))
        .route("/withdrawals", post(create_withdraw::<S>))
        .route("/withdrawals/pending", get(list_pending_withdraws::<S>))
        .route("/withdrawals/decide", post(decide_withdraw::<S>))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
}

/// Telegram user block as the WebApp delivers it.
#[derive(Debug, Deserialize)]
pub struct TelegramUser {
    pub id: Option<i64>,
    pub first_name: Option<String>,
    pub username: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    #[serde(rename = "initData")]
    pub init_data: Option<String>,
    pub user: Option<TelegramUser>,
    /// Referrer id, forwarded from the start parameter on first launch.
    #[serde(rename = "ref")]
    pub referrer: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub uid: i64,
    pub token: String,
    pub is_admin: bool,
}

async fn authenticate<S: Store>(
    State(st): State<AppState<S>>,
    Json(req): Json<AuthRequest>,
) -> Result<ApiOk<AuthResponse>, ApiError> {
    let raw = req.init_data.unwrap_or_default();
    if !auth::verify_init_data(&st.config.bot_token, &raw) {
        return Err(ApiError::Forbidden(E_INVALID_INIT_DATA));
    }

    let tg_user = req.user.ok_or(ApiError::BadRequest(E_MISSING_USER_ID))?;
    let uid = tg_user.id.ok_or(ApiError::BadRequest(E_MISSING_USER_ID))?;
    let profile = Profile {
        display_name: tg_user.first_name.unwrap_or_default(),
        username: tg_user.username,
        photo_url: tg_user.photo_url,
    };

    let user = st
        .store
        .authenticate_user(uid, profile, req.referrer)
        .await?;
    let token = auth::issue_session_token(
        &st.config.session_secret,
        uid,
        user.is_admin,
        st.config.session_ttl_minutes,
    )
    .map_err(|e| ApiError::Internal(e.into()))?;

    Ok(ApiOk(AuthResponse {
        uid,
        token,
        is_admin: user.is_admin,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub uid: Option<i64>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileView {
    pub uid: i64,
    pub display_name: String,
    pub username: Option<String>,
    pub photo_url: Option<String>,
    pub referred_by: Option<i64>,
    pub today_stamp: String,
    pub today_ad_count: i32,
    pub lifetime_ad_count: i64,
    pub balance_subunits: i64,
    pub is_admin: bool,
}

impl From<User> for ProfileView {
    fn from(user: User) -> Self {
        Self {
            uid: user.id,
            display_name: user.display_name,
            username: user.username,
            photo_url: user.photo_url,
            referred_by: user.referred_by,
            today_stamp: user.today_stamp,
            today_ad_count: user.today_ad_count,
            lifetime_ad_count: user.lifetime_ad_count,
            balance_subunits: user.balance_subunits,
            is_admin: user.is_admin,
        }
    }
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub profile: ProfileView,
}

async fn get_profile<S: Store>(
    State(st): State<AppState<S>>,
    Json(req): Json<ProfileRequest>,
) -> Result<ApiOk<ProfileResponse>, ApiError> {
    let uid = req.uid.ok_or(ApiError::BadRequest(E_MISSING_UID))?;
    let user = st
        .store
        .user(uid)
        .await?
        .ok_or(ApiError::NotFound(E_PROFILE_NOT_FOUND))?;
    Ok(ApiOk(ProfileResponse {
        profile: user.into(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct AdCreditRequest {
    pub uid: Option<i64>,
}

async fn credit_for_ad<S: Store>(
    State(st): State<AppState<S>>,
    Json(req): Json<AdCreditRequest>,
) -> Result<ApiOk<AdCredit>, ApiError> {
    let uid = req.uid.ok_or(ApiError::BadRequest(E_MISSING_UID))?;
    let credit = st.store.credit_for_ad(uid).await?;
    Ok(ApiOk(credit))
}

#[derive(Debug, Deserialize)]
pub struct CreateWithdrawRequest {
    pub uid: Option<i64>,
    #[serde(rename = "amountTokens")]
    pub amount_tokens: Option<f64>,
    #[serde(rename = "binanceUID")]
    pub binance_uid: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateWithdrawResponse {
    pub request_id: Uuid,
}

async fn create_withdraw<S: Store>(
    State(st): State<AppState<S>>,
    Json(req): Json<CreateWithdrawRequest>,
) -> Result<ApiOk<CreateWithdrawResponse>, ApiError> {
    let uid = req.uid.ok_or(ApiError::BadRequest(E_MISSING_FIELDS))?;
    let amount_tokens = req
        .amount_tokens
        .ok_or(ApiError::BadRequest(E_MISSING_FIELDS))?;
    let binance_uid = req
        .binance_uid
        .filter(|b| !b.is_empty())
        .ok_or(ApiError::BadRequest(E_MISSING_FIELDS))?;

    let request = st
        .store
        .create_withdrawal(uid, amount_tokens, binance_uid)
        .await?;
    Ok(ApiOk(CreateWithdrawResponse {
        request_id: request.id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct PendingQuery {
    #[serde(rename = "adminUid")]
    pub admin_uid: Option<i64>,
}

#[derive(Serialize)]
pub struct PendingResponse {
    pub items: Vec<WithdrawalRequest>,
}

async fn list_pending_withdraws<S: Store>(
    State(st): State<AppState<S>>,
    Query(query): Query<PendingQuery>,
) -> Result<ApiOk<PendingResponse>, ApiError> {
    let admin_uid = query
        .admin_uid
        .ok_or(ApiError::Forbidden(E_MISSING_ADMIN))?;
    workflow::ensure_admin(&st.store, admin_uid).await?;

    let items = st.store.pending_withdrawals().await?;
    Ok(ApiOk(PendingResponse { items }))
}

#[derive(Debug, Deserialize)]
pub struct DecideRequest {
    #[serde(rename = "adminUid")]
    pub admin_uid: Option<i64>,
    #[serde(rename = "requestId")]
    pub request_id: Option<String>,
    pub decision: Option<String>,
}

#[derive(Serialize)]
pub struct DecideResponse {}

async fn decide_withdraw<S: Store>(
    State(st): State<AppState<S>>,
    Json(req): Json<DecideRequest>,
) -> Result<ApiOk<DecideResponse>, ApiError> {
    let admin_uid = req.admin_uid.ok_or(ApiError::BadRequest(E_MISSING_FIELDS))?;
    let request_id = req
        .request_id
        .ok_or(ApiError::BadRequest(E_MISSING_FIELDS))?;
    let decision = req
        .decision
        .as_deref()
        .and_then(Decision::parse)
        .ok_or(ApiError::BadRequest(E_MISSING_FIELDS))?;
    // An unparsable id cannot name any request; report it the same way.
    let request_id = request_id
        .parse::<Uuid>()
        .map_err(|_| ApiError::BadRequest(E_REQUEST_NOT_FOUND))?;

    workflow::ensure_admin(&st.store, admin_uid).await?;
    st.store
        .decide_withdrawal(request_id, decision, admin_uid)
        .await?;
    Ok(ApiOk(DecideResponse {}))
}
