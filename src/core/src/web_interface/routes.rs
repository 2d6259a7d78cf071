use std::convert::Infallible;

use log::{error, info, warn};
use rust_embed::RustEmbed;
use serde::de::DeserializeOwned;
use warp::http::StatusCode;
use warp::reply::{self, Response};
use warp::{Filter, Rejection, Reply};

use super::types::{
    AnalysisResponse, ApiError, AppState, CountResponse, ImportLogsRequest, InterfaceRequest,
    LogAnalysisRequest, LoginRequest, PasswordRequest, RecordsQuery, ResourcesRequest,
    SecurityReportRequest, SelectionRequest, TrafficAnalysisRequest, TrafficAnalysisResponse,
};
use crate::annotation::prompts::{log_file_prompt, security_report_prompt, traffic_batch_prompt};
use crate::auth::{NewUser, RoleProvider, UserUpdate};
use crate::error_handling::types::AuthError;
use crate::inspection::types::{FAILED_MESSAGE, RESTRICTED_MESSAGE};
use crate::monitor::store_export;
use crate::telemetry::{SortDirection, SortKey, ViewQuery};

const BODY_LIMIT: u64 = 1024 * 1024;

#[derive(RustEmbed)]
#[folder = "$CARGO_MANIFEST_DIR/assets/"]
struct Assets;

fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone {
    warp::body::content_length_limit(BODY_LIMIT).and(warp::body::json())
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    reply::with_status(reply::json(&ApiError::new(message)), status).into_response()
}

fn auth_error_response(err: &AuthError) -> Response {
    let (status, message) = match err {
        AuthError::InvalidCredentials => (StatusCode::UNAUTHORIZED, "Invalid email or password"),
        AuthError::NotAuthenticated => (StatusCode::UNAUTHORIZED, "Login required"),
        AuthError::Forbidden => (StatusCode::FORBIDDEN, "Administrator access required"),
        AuthError::UserNotFound(_) => (StatusCode::NOT_FOUND, "User not found"),
        AuthError::DuplicateEmail(_) => (StatusCode::CONFLICT, "Email already registered"),
        AuthError::CannotDeleteSelf => (StatusCode::BAD_REQUEST, "You cannot delete your own account"),
        AuthError::StorageError(e) => {
            error!("Auth storage failure: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Storage unavailable")
        }
    };
    error_response(status, message)
}

fn asset_response(path: &str) -> Response {
    match Assets::get(path) {
        Some(file) => {
            let mime = mime_guess::from_path(path).first_or_octet_stream();
            reply::with_header(file.data.into_owned(), "Content-Type", mime.to_string())
                .into_response()
        }
        None => error_response(StatusCode::NOT_FOUND, "Asset not found"),
    }
}

/// GET /
pub fn index_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path::end()
        .and(warp::get())
        .map(|| asset_response("index.html"))
}

/// GET /assets/<file>
pub fn assets_route() -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path("assets")
        .and(warp::path::tail())
        .and(warp::get())
        .map(|tail: warp::path::Tail| asset_response(tail.as_str()))
}

fn view_query(query: RecordsQuery) -> Result<ViewQuery, &'static str> {
    let sort_key = match query.sort.as_deref() {
        Some(key) => key.parse::<SortKey>().map_err(|_| "Unknown sort key")?,
        None => SortKey::default(),
    };
    let direction = match query.direction.as_deref() {
        Some(dir) => dir.parse::<SortDirection>().map_err(|_| "Unknown sort direction")?,
        None => SortDirection::default(),
    };
    Ok(ViewQuery::new(query.filter.unwrap_or_default(), sort_key, direction))
}

/// GET /api/records?filter=&sort=&direction=
pub fn records_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "records")
        .and(warp::get())
        .and(warp::query::<RecordsQuery>())
        .and(with_state(state))
        .map(|query: RecordsQuery, state: AppState| match view_query(query) {
            Ok(query) => {
                let rows = state.monitor().view(&query);
                reply::json(&rows).into_response()
            }
            Err(message) => error_response(StatusCode::BAD_REQUEST, message),
        })
}

/// GET /api/records/export
pub fn export_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "records" / "export")
        .and(warp::get())
        .and(with_state(state))
        .and_then(export_records)
}

async fn export_records(state: AppState) -> Result<Response, Rejection> {
    let exported = state.monitor().export_json();
    let json = match exported {
        Ok(json) => json,
        Err(e) => {
            error!("{}", e);
            return Ok(error_response(StatusCode::INTERNAL_SERVER_ERROR, "Export failed"));
        }
    };
    let key = match store_export(state.storage.as_ref(), &json).await {
        Ok(key) => key,
        Err(_) => return Ok(error_response(StatusCode::INTERNAL_SERVER_ERROR, "Export failed")),
    };
    if let Err(e) = state.auth.log_action("EXPORT_RECORDS", &format!("Exported records to {}", key)).await {
        warn!("Could not record export activity: {}", e);
    }

    let file_name = key.rsplit('/').next().unwrap_or("records.json").to_string();
    let res = reply::with_header(
        reply::with_header(json, "Content-Type", "application/json"),
        "Content-Disposition",
        format!("attachment; filename=\"{}\"", file_name),
    );
    Ok(res.into_response())
}

/// POST /api/selection `{ "sequence": n | null }`
pub fn selection_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "selection")
        .and(warp::post())
        .and(json_body::<SelectionRequest>())
        .and(with_state(state))
        .map(|body: SelectionRequest, state: AppState| {
            let record = match body.sequence {
                Some(sequence) => {
                    let found = state.monitor().find(sequence);
                    match found {
                        Ok(record) => Some(record),
                        Err(_) => return error_response(StatusCode::NOT_FOUND, "Record not found"),
                    }
                }
                None => None,
            };
            state.coordinator.select_and_spawn(record);
            reply::json(&state.coordinator.detail()).into_response()
        })
}

/// GET /api/detail
pub fn detail_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "detail")
        .and(warp::get())
        .and(with_state(state))
        .map(|state: AppState| reply::json(&state.coordinator.detail()))
}

/// GET /api/monitor
pub fn monitor_status_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "monitor")
        .and(warp::get())
        .and(with_state(state))
        .map(|state: AppState| {
            let status = state.monitor().status();
            reply::json(&status)
        })
}

/// POST /api/monitor/pause
pub fn pause_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "monitor" / "pause")
        .and(warp::post())
        .and(with_state(state))
        .map(|state: AppState| {
            let mut monitor = state.monitor();
            monitor.pause();
            reply::json(&monitor.status())
        })
}

/// POST /api/monitor/resume
pub fn resume_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "monitor" / "resume")
        .and(warp::post())
        .and(with_state(state))
        .map(|state: AppState| {
            let mut monitor = state.monitor();
            monitor.resume();
            reply::json(&monitor.status())
        })
}

/// POST /api/monitor/interface `{ "interface": "eth0" }`
pub fn interface_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "monitor" / "interface")
        .and(warp::post())
        .and(json_body::<InterfaceRequest>())
        .and(with_state(state))
        .map(|body: InterfaceRequest, state: AppState| {
            let mut monitor = state.monitor();
            match monitor.switch_interface(&body.interface) {
                Ok(_) => reply::json(&monitor.status()).into_response(),
                Err(_) => error_response(StatusCode::BAD_REQUEST, "Unknown capture interface"),
            }
        })
}

/// POST /api/resources `{ "entries": [...] }` feeds resource-timing entries
pub fn resources_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "resources")
        .and(warp::post())
        .and(json_body::<ResourcesRequest>())
        .and(with_state(state))
        .map(|body: ResourcesRequest, state: AppState| {
            let count = body.entries.len();
            state.resources.extend(body.entries);
            reply::json(&CountResponse { count })
        })
}

/// POST /api/login
pub fn login_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "login")
        .and(warp::post())
        .and(json_body::<LoginRequest>())
        .and(with_state(state))
        .and_then(|body: LoginRequest, state: AppState| async move {
            let res = match state.auth.login(&body.email, &body.password).await {
                Ok(user) => reply::json(&user).into_response(),
                Err(e) => auth_error_response(&e),
            };
            Ok::<_, Rejection>(res)
        })
}

/// POST /api/logout
pub fn logout_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "logout")
        .and(warp::post())
        .and(with_state(state))
        .and_then(|state: AppState| async move {
            let res = match state.auth.logout().await {
                Ok(()) => reply::with_status(reply::reply(), StatusCode::NO_CONTENT).into_response(),
                Err(e) => auth_error_response(&e),
            };
            Ok::<_, Rejection>(res)
        })
}

/// GET /api/session, the logged-in user or `null`
pub fn session_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "session")
        .and(warp::get())
        .and(with_state(state))
        .map(|state: AppState| reply::json(&state.auth.current_user()))
}

/// POST /api/password
pub fn password_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "password")
        .and(warp::post())
        .and(json_body::<PasswordRequest>())
        .and(with_state(state))
        .and_then(|body: PasswordRequest, state: AppState| async move {
            let res = match state
                .auth
                .update_password(&body.old_password, &body.new_password)
                .await
            {
                Ok(()) => reply::with_status(reply::reply(), StatusCode::NO_CONTENT).into_response(),
                Err(e) => auth_error_response(&e),
            };
            Ok::<_, Rejection>(res)
        })
}

/// GET /api/activity
pub fn activity_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "activity")
        .and(warp::get())
        .and(with_state(state))
        .map(|state: AppState| {
            if !state.auth.is_authenticated() {
                return auth_error_response(&AuthError::NotAuthenticated);
            }
            reply::json(&state.auth.activity_logs()).into_response()
        })
}

/// POST /api/activity/import `{ "logs": [...] }`
pub fn import_activity_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "activity" / "import")
        .and(warp::post())
        .and(json_body::<ImportLogsRequest>())
        .and(with_state(state))
        .and_then(|body: ImportLogsRequest, state: AppState| async move {
            if !state.auth.is_admin() {
                return Ok::<_, Rejection>(auth_error_response(&AuthError::Forbidden));
            }
            let res = match state.auth.import_logs(body.logs).await {
                Ok(count) => reply::json(&CountResponse { count }).into_response(),
                Err(e) => auth_error_response(&e),
            };
            Ok::<_, Rejection>(res)
        })
}

/// GET /api/users
pub fn list_users_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "users")
        .and(warp::get())
        .and(with_state(state))
        .map(|state: AppState| {
            if !state.auth.is_admin() {
                return auth_error_response(&AuthError::Forbidden);
            }
            reply::json(&state.auth.users()).into_response()
        })
}

/// POST /api/users
pub fn add_user_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "users")
        .and(warp::post())
        .and(json_body::<NewUser>())
        .and(with_state(state))
        .and_then(|body: NewUser, state: AppState| async move {
            let res = match state.auth.add_user(body).await {
                Ok(user) => reply::with_status(reply::json(&user), StatusCode::CREATED).into_response(),
                Err(e) => auth_error_response(&e),
            };
            Ok::<_, Rejection>(res)
        })
}

/// PUT /api/users/<id>
pub fn update_user_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "users" / String)
        .and(warp::put())
        .and(json_body::<UserUpdate>())
        .and(with_state(state))
        .and_then(|id: String, body: UserUpdate, state: AppState| async move {
            let res = match state.auth.update_user(&id, body).await {
                Ok(user) => reply::json(&user).into_response(),
                Err(e) => auth_error_response(&e),
            };
            Ok::<_, Rejection>(res)
        })
}

/// DELETE /api/users/<id>
pub fn delete_user_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "users" / String)
        .and(warp::delete())
        .and(with_state(state))
        .and_then(|id: String, state: AppState| async move {
            let res = match state.auth.delete_user(&id).await {
                Ok(()) => reply::with_status(reply::reply(), StatusCode::NO_CONTENT).into_response(),
                Err(e) => auth_error_response(&e),
            };
            Ok::<_, Rejection>(res)
        })
}

/// POST /api/analysis/traffic `{ "traffic": "..." }`
pub fn traffic_analysis_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "analysis" / "traffic")
        .and(warp::post())
        .and(json_body::<TrafficAnalysisRequest>())
        .and(with_state(state))
        .and_then(analyze_traffic)
}

/// Runs `prompt` through the annotator on behalf of an ANALYST or ADMIN.
/// The error side is the finished reply: 403 for viewers, 502 on failure.
async fn gated_generate(state: &AppState, prompt: String, kind: &str) -> Result<String, Response> {
    let role = state.auth.current_role();
    if !role.can_annotate() {
        info!("{} refused for {}", kind, role);
        return Err(error_response(StatusCode::FORBIDDEN, RESTRICTED_MESSAGE));
    }

    let annotator = state.annotator.clone();
    state
        .retry
        .run(|| annotator.generate(&prompt))
        .await
        .map_err(|e| {
            warn!("{} failed: {}", kind, e);
            error_response(StatusCode::BAD_GATEWAY, FAILED_MESSAGE)
        })
}

async fn record_action(state: &AppState, action: &str, details: &str) {
    if let Err(e) = state.auth.log_action(action, details).await {
        warn!("Could not record {} activity: {}", action, e);
    }
}

async fn analyze_traffic(body: TrafficAnalysisRequest, state: AppState) -> Result<Response, Rejection> {
    let prompt = traffic_batch_prompt(&body.traffic, state.language);
    let analysis = match gated_generate(&state, prompt, "Traffic analysis").await {
        Ok(text) => text,
        Err(res) => return Ok(res),
    };

    let dashboard = {
        let mut stats = state.dashboard();
        stats.update_from_response(&analysis);
        stats.clone()
    };
    let details = format!("Analyzed {} bytes of traffic", body.traffic.len());
    record_action(&state, "TRAFFIC_ANALYSIS", &details).await;
    Ok(reply::json(&TrafficAnalysisResponse { analysis, dashboard }).into_response())
}

/// POST /api/analysis/report `{ "infrastructure": "..." }` vulnerability report
pub fn security_report_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "analysis" / "report")
        .and(warp::post())
        .and(json_body::<SecurityReportRequest>())
        .and(with_state(state))
        .and_then(|body: SecurityReportRequest, state: AppState| async move {
            let prompt = security_report_prompt(&body.infrastructure, state.language);
            let analysis = match gated_generate(&state, prompt, "Security report").await {
                Ok(text) => text,
                Err(res) => return Ok::<_, Rejection>(res),
            };
            record_action(&state, "SECURITY_REPORT", &format!("Report for {}", body.infrastructure)).await;
            Ok(reply::json(&AnalysisResponse { analysis }).into_response())
        })
}

/// POST /api/analysis/log `{ "contents": "..." }` uploaded log file analysis
pub fn log_analysis_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "analysis" / "log")
        .and(warp::post())
        .and(json_body::<LogAnalysisRequest>())
        .and(with_state(state))
        .and_then(|body: LogAnalysisRequest, state: AppState| async move {
            let prompt = log_file_prompt(&body.contents, state.language);
            let analysis = match gated_generate(&state, prompt, "Log analysis").await {
                Ok(text) => text,
                Err(res) => return Ok::<_, Rejection>(res),
            };
            let details = format!("Analyzed {} bytes of log data", body.contents.len());
            record_action(&state, "LOG_ANALYSIS", &details).await;
            Ok(reply::json(&AnalysisResponse { analysis }).into_response())
        })
}

/// GET /api/dashboard
pub fn dashboard_route(state: AppState) -> impl Filter<Extract = impl Reply, Error = Rejection> + Clone {
    warp::path!("api" / "dashboard")
        .and(warp::get())
        .and(with_state(state))
        .map(|state: AppState| {
            let stats = state.dashboard().clone();
            reply::json(&stats)
        })
}

/// Turns rejections into JSON errors with static messages.
pub async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found")
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid request body")
    } else if err.find::<warp::reject::InvalidQuery>().is_some() {
        (StatusCode::BAD_REQUEST, "Invalid query string")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
    } else {
        error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
    };
    Ok(error_response(status, message))
}
