use std::{net::SocketAddr, sync::Arc};

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post, put},
};
use chrono::NaiveDate;
use ksp_core::{
    Error, Loan, LoanStatus, Member, MemberStatus, Role, SavingsAccount, SavingsType, Session,
    Store, Transaction, TransactionStatus, round_rupiah,
};
use ksp_ledger::{
    DashboardSummary, LedgerBook, LedgerProjection, LoanEntry, MemberSavings, PeriodReport,
    TransactionEntry,
};
use ksp_loans::{
    DEFAULT_MONTHLY_RATE, InstallmentBreakdown, LoanApplication, LoanLifecycle, LoanTerms,
    STANDARD_TENORS, compute_terms, installment_breakdown, rate_from_percent,
};
use ksp_members::{MemberCodeAllocator, MemberLifecycle, MemberProfile};
use ksp_platform::{PgStore, ServiceConfig, connect_database, ensure_schema};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

const USER_ID_HEADER: &str = "x-ksp-user-id";
const EMAIL_HEADER: &str = "x-ksp-email";
const ROLE_HEADER: &str = "x-ksp-role";
const DEFAULT_PENDING_LIMIT: usize = 5;

type ApiResult<T> = Result<Json<T>, (StatusCode, String)>;

#[derive(Clone)]
struct AppState {
    store: Arc<dyn Store>,
    member_codes: MemberCodeAllocator,
}

impl AppState {
    fn loans(&self) -> LoanLifecycle<'_, dyn Store> {
        LoanLifecycle::new(self.store.as_ref())
    }

    fn members(&self) -> MemberLifecycle<'_, dyn Store> {
        MemberLifecycle::with_allocator(self.store.as_ref(), self.member_codes.clone())
    }

    fn book(&self) -> LedgerBook<'_, dyn Store> {
        LedgerBook::new(self.store.as_ref())
    }

    async fn projection(&self) -> Result<LedgerProjection, (StatusCode, String)> {
        LedgerProjection::load(self.store.as_ref())
            .await
            .map_err(core_error)
    }
}

#[derive(Debug, Deserialize)]
struct PendingLoansQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct LoanRegisterQuery {
    search: Option<String>,
    status: Option<LoanStatus>,
}

#[derive(Debug, Deserialize)]
struct MutasiQuery {
    member_id: Option<Uuid>,
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Debug, Deserialize)]
struct MemberDirectoryQuery {
    search: Option<String>,
    status: Option<MemberStatus>,
}

/// Rate as a fraction (`monthly_rate=0.015`) or as a percentage (`monthly_rate_percent=1.5`).
#[derive(Debug, Deserialize)]
struct SimulationQuery {
    amount: Decimal,
    term_months: u32,
    monthly_rate: Option<Decimal>,
    monthly_rate_percent: Option<Decimal>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationResponse {
    monthly_rate: Decimal,
    #[serde(flatten)]
    terms: LoanTerms,
    #[serde(flatten)]
    breakdown: InstallmentBreakdown,
    /// Whole-rupiah installment for display.
    monthly_payment_rounded: Decimal,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LoanOptions {
    default_monthly_rate: Decimal,
    tenors: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct SettleRequest {
    status: TransactionStatus,
}

#[derive(Debug, Deserialize)]
struct SavingsRequest {
    balance: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileRequest {
    full_name: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    address: String,
}

impl From<ProfileRequest> for MemberProfile {
    fn from(request: ProfileRequest) -> Self {
        MemberProfile {
            full_name: request.full_name,
            phone: request.phone,
            address: request.address,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReviseLoanRequest {
    amount: Decimal,
    term_months: u32,
    monthly_rate: Decimal,
    start_date: NaiveDate,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "ksp_gateway=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url).await?;
    ensure_schema(&pool).await?;

    let state = AppState {
        store: Arc::new(PgStore::new(pool)),
        member_codes: MemberCodeAllocator::new(config.member_code_prefix.clone()),
    };

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/board/summary", get(board_summary))
        .route("/board/loans", get(loan_register))
        .route("/board/loans/pending", get(pending_loans))
        .route("/board/mutasi", get(mutasi))
        .route("/board/reports/{year}/{month}", get(period_report))
        .route("/board/members", get(member_directory))
        .route("/loans/simulate", get(simulate_loan))
        .route("/loans/tenors", get(loan_options))
        .route("/loans", post(submit_loan))
        .route("/loans/{loan_id}", put(revise_loan).delete(delete_loan))
        .route("/loans/{loan_id}/approve", post(approve_loan))
        .route("/loans/{loan_id}/reject", post(reject_loan))
        .route("/loans/{loan_id}/paid", post(mark_loan_paid))
        .route("/members", post(register_member))
        .route(
            "/members/{member_id}",
            put(edit_member).delete(remove_member),
        )
        .route("/members/{member_id}/approve", post(approve_member))
        .route("/members/{member_id}/reject", post(reject_member))
        .route("/members/{member_id}/deactivate", post(deactivate_member))
        .route("/members/{member_id}/reactivate", post(reactivate_member))
        .route("/members/{member_id}/savings", get(member_savings))
        .route("/members/{member_id}/savings/{kind}", put(set_savings))
        .route("/transactions", post(record_transaction))
        .route("/transactions/{transaction_id}/settle", post(settle_transaction))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

async fn board_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<DashboardSummary> {
    admin_session(&headers, "viewing the dashboard")?;
    Ok(Json(state.projection().await?.summary()))
}

async fn pending_loans(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<PendingLoansQuery>,
) -> ApiResult<Vec<Loan>> {
    admin_session(&headers, "viewing pending loans")?;
    let limit = query.limit.unwrap_or(DEFAULT_PENDING_LIMIT);
    Ok(Json(state.projection().await?.pending_loans(Some(limit))))
}

async fn loan_register(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<LoanRegisterQuery>,
) -> ApiResult<Vec<LoanEntry>> {
    admin_session(&headers, "viewing the loan register")?;
    let projection = state.projection().await?;
    Ok(Json(
        projection.loan_register(query.search.as_deref(), query.status),
    ))
}

async fn member_directory(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MemberDirectoryQuery>,
) -> ApiResult<Vec<Member>> {
    admin_session(&headers, "viewing the member directory")?;
    let projection = state.projection().await?;
    Ok(Json(
        projection.member_directory(query.search.as_deref(), query.status),
    ))
}

/// Admins see any member or everyone. Members see only their own entries.
async fn mutasi(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<MutasiQuery>,
) -> ApiResult<Vec<Transaction>> {
    let session = session_from_headers(&headers)?;
    let member_id = if session.is_admin() {
        query.member_id
    } else {
        let member_id = query.member_id.unwrap_or(session.user_id);
        session
            .require_self_or_admin(member_id, "viewing transactions")
            .map_err(core_error)?;
        Some(member_id)
    };
    let projection = state.projection().await?;
    projection
        .transactions_in_period(member_id, query.start, query.end)
        .map(Json)
        .map_err(core_error)
}

async fn period_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((year, month)): Path<(i32, u32)>,
) -> ApiResult<PeriodReport> {
    admin_session(&headers, "viewing the period report")?;
    let projection = state.projection().await?;
    projection
        .period_report(year, month)
        .map(Json)
        .map_err(core_error)
}

async fn member_savings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(member_id): Path<Uuid>,
) -> ApiResult<MemberSavings> {
    let session = session_from_headers(&headers)?;
    session
        .require_self_or_admin(member_id, "viewing savings")
        .map_err(core_error)?;
    MemberSavings::load(state.store.as_ref(), member_id)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn simulate_loan(Query(query): Query<SimulationQuery>) -> ApiResult<SimulationResponse> {
    let rate = match (query.monthly_rate, query.monthly_rate_percent) {
        (Some(_), Some(_)) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "give either monthly_rate or monthly_rate_percent".to_string(),
            ));
        }
        (Some(rate), None) => rate,
        (None, Some(percent)) => rate_from_percent(percent),
        (None, None) => DEFAULT_MONTHLY_RATE,
    };
    let terms = compute_terms(query.amount, query.term_months, rate).map_err(core_error)?;
    let breakdown =
        installment_breakdown(query.amount, query.term_months, rate).map_err(core_error)?;
    Ok(Json(SimulationResponse {
        monthly_rate: rate,
        monthly_payment_rounded: round_rupiah(terms.monthly_payment),
        terms,
        breakdown,
    }))
}

async fn loan_options() -> Json<LoanOptions> {
    Json(LoanOptions {
        default_monthly_rate: DEFAULT_MONTHLY_RATE,
        tenors: STANDARD_TENORS.to_vec(),
    })
}

async fn submit_loan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<LoanApplication>,
) -> ApiResult<Loan> {
    let session = session_from_headers(&headers)?;
    state
        .loans()
        .submit(&session, payload)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn revise_loan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(loan_id): Path<Uuid>,
    Json(payload): Json<ReviseLoanRequest>,
) -> ApiResult<Loan> {
    let session = session_from_headers(&headers)?;
    state
        .loans()
        .revise(
            &session,
            loan_id,
            payload.amount,
            payload.term_months,
            payload.monthly_rate,
            payload.start_date,
        )
        .await
        .map(Json)
        .map_err(core_error)
}

async fn approve_loan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Loan> {
    let session = session_from_headers(&headers)?;
    state
        .loans()
        .approve(&session, loan_id)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn reject_loan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Loan> {
    let session = session_from_headers(&headers)?;
    state
        .loans()
        .reject(&session, loan_id)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn mark_loan_paid(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Loan> {
    let session = session_from_headers(&headers)?;
    state
        .loans()
        .mark_paid(&session, loan_id)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn delete_loan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Loan> {
    let session = session_from_headers(&headers)?;
    state
        .loans()
        .delete(&session, loan_id)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn register_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ProfileRequest>,
) -> ApiResult<Member> {
    let session = session_from_headers(&headers)?;
    state
        .members()
        .register(&session, payload.into())
        .await
        .map(Json)
        .map_err(core_error)
}

async fn edit_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(member_id): Path<Uuid>,
    Json(payload): Json<ProfileRequest>,
) -> ApiResult<Member> {
    let session = session_from_headers(&headers)?;
    state
        .members()
        .edit_profile(&session, member_id, payload.into())
        .await
        .map(Json)
        .map_err(core_error)
}

async fn approve_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(member_id): Path<Uuid>,
) -> ApiResult<Member> {
    let session = session_from_headers(&headers)?;
    state
        .members()
        .approve(&session, member_id)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn reject_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(member_id): Path<Uuid>,
) -> ApiResult<Member> {
    let session = session_from_headers(&headers)?;
    state
        .members()
        .reject(&session, member_id)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn deactivate_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(member_id): Path<Uuid>,
) -> ApiResult<Member> {
    let session = session_from_headers(&headers)?;
    state
        .members()
        .deactivate(&session, member_id)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn reactivate_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(member_id): Path<Uuid>,
) -> ApiResult<Member> {
    let session = session_from_headers(&headers)?;
    state
        .members()
        .reactivate(&session, member_id)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn remove_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(member_id): Path<Uuid>,
) -> ApiResult<Member> {
    let session = session_from_headers(&headers)?;
    state
        .members()
        .remove(&session, member_id)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn record_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<TransactionEntry>,
) -> ApiResult<Transaction> {
    let session = session_from_headers(&headers)?;
    state
        .book()
        .record(&session, payload)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn settle_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(transaction_id): Path<Uuid>,
    Json(payload): Json<SettleRequest>,
) -> ApiResult<Transaction> {
    let session = session_from_headers(&headers)?;
    state
        .book()
        .settle(&session, transaction_id, payload.status)
        .await
        .map(Json)
        .map_err(core_error)
}

async fn set_savings(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((member_id, kind)): Path<(Uuid, SavingsType)>,
    Json(payload): Json<SavingsRequest>,
) -> ApiResult<SavingsAccount> {
    let session = session_from_headers(&headers)?;
    state
        .book()
        .set_savings(&session, member_id, kind, payload.balance)
        .await
        .map(Json)
        .map_err(core_error)
}

/// Identity headers are set by the authentication proxy in front of the gateway and trusted
/// as-is.
fn session_from_headers(headers: &HeaderMap) -> Result<Session, (StatusCode, String)> {
    let header = |name: &str| header_value(headers, name);
    let unauthorized = |message: String| (StatusCode::UNAUTHORIZED, message);

    let user_id = header(USER_ID_HEADER)
        .ok_or_else(|| unauthorized(format!("{USER_ID_HEADER} header is required")))?
        .parse::<Uuid>()
        .map_err(|err| unauthorized(format!("{USER_ID_HEADER}: {err}")))?;
    let role = match header(ROLE_HEADER).unwrap_or("member") {
        "admin" => Role::Admin,
        "member" | "user" => Role::Member,
        other => return Err(unauthorized(format!("unknown role `{other}`"))),
    };

    Ok(Session {
        user_id,
        email: header(EMAIL_HEADER).unwrap_or_default().to_string(),
        role,
    })
}

fn admin_session(headers: &HeaderMap, action: &str) -> Result<Session, (StatusCode, String)> {
    let session = session_from_headers(headers)?;
    session.require_admin(action).map_err(core_error)?;
    Ok(session)
}

fn header_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn core_error(err: Error) -> (StatusCode, String) {
    let status = match &err {
        Error::InvalidInput(_) | Error::ValidationError(_) => StatusCode::BAD_REQUEST,
        Error::IllegalTransition { .. } => StatusCode::CONFLICT,
        Error::NotFound { .. } => StatusCode::NOT_FOUND,
        Error::Forbidden(_) => StatusCode::FORBIDDEN,
        Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status, err.to_string())
}
