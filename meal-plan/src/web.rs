use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use actix_web::http::StatusCode;
use actix_web::{middleware, web, App, HttpResponse, HttpServer, ResponseError, Result};
use chrono::{Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use futures::stream::Stream;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

use crate::config::MenuConfig;
use crate::error::Error;
use crate::plan::{aggregate, week_slice, PlanMode, ScheduleEntry, ScheduleGenerator, ShoppingList};
use crate::share::{self, MasterIndexLists, Override, RecentPlan, RecentPlans, ShareLink};
use crate::sync::{
    MemoryRealtime, PlanSession, RealtimeStore, SessionEvent, ViewerId, ViewerIdentity,
    ViewerPresence,
};

/// Shared server state. Viewer sessions live here; the realtime store is
/// in-process, so every viewer of a seed shares one channel.
pub struct AppState {
    pub menu: Arc<MenuConfig>,
    pub lists: Arc<MasterIndexLists>,
    pub realtime: Arc<dyn RealtimeStore>,
    pub sessions: Mutex<HashMap<ViewerId, PlanSession>>,
    pub recent: Mutex<RecentPlans>,
    pub recent_path: Option<PathBuf>,
}

impl AppState {
    pub fn new(menu: MenuConfig, recent_path: Option<PathBuf>) -> crate::Result<Self> {
        let recent = match &recent_path {
            Some(path) => RecentPlans::load(path)?,
            None => RecentPlans::new(),
        };
        let lists = MasterIndexLists::from_menu(&menu);
        Ok(Self {
            menu: Arc::new(menu),
            lists: Arc::new(lists),
            realtime: Arc::new(MemoryRealtime::new()),
            sessions: Mutex::new(HashMap::new()),
            recent: Mutex::new(recent),
            recent_path,
        })
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<ViewerId, PlanSession>>> {
        self.sessions
            .lock()
            .map_err(|_| actix_web::error::ErrorInternalServerError("session registry poisoned"))
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(serde_json::json!({"success": false, "error": self.to_string()}))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PlanQuery {
    seed: Option<i64>,
    overrides: Option<String>,
    start: Option<NaiveDate>,
    mode: Option<PlanMode>,
    week: Option<usize>,
}

impl PlanQuery {
    fn link(&self) -> ShareLink {
        let mut link = ShareLink::new(self.seed.unwrap_or_else(default_seed));
        link.overrides = self.overrides.clone().filter(|o| !o.is_empty());
        link.start = Some(self.start.unwrap_or_else(today));
        link.mode = Some(self.mode.unwrap_or_default());
        link
    }
}

#[derive(Serialize)]
pub struct PlanResponse {
    seed: i64,
    share: String,
    schedule: Vec<ScheduleEntry>,
}

#[derive(Serialize)]
pub struct ShoppingResponse {
    seed: i64,
    week: usize,
    items: ShoppingList,
}

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    viewer_id: Option<String>,
    display_name: String,
    avatar_ref: Option<String>,
    seed: Option<i64>,
    overrides: Option<String>,
    start: Option<NaiveDate>,
    mode: Option<PlanMode>,
}

#[derive(Deserialize)]
pub struct SwitchSeedRequest {
    seed: Option<i64>,
    start: Option<NaiveDate>,
    mode: Option<PlanMode>,
}

#[derive(Deserialize)]
pub struct RecordRecentRequest {
    seed: i64,
    #[serde(default)]
    overrides: String,
}

#[derive(Serialize)]
pub struct SessionView {
    viewer: ViewerIdentity,
    seed: i64,
    share: String,
    schedule: Vec<ScheduleEntry>,
    viewers: Vec<ViewerPresence>,
}

impl SessionView {
    fn of(session: &PlanSession) -> crate::Result<Self> {
        Ok(Self {
            viewer: session.viewer().clone(),
            seed: session.seed(),
            share: session.share_link().to_query()?,
            schedule: session.schedule(),
            viewers: session.viewers(),
        })
    }
}

fn default_seed() -> i64 {
    Utc::now().timestamp_millis()
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn render_link(state: &AppState, link: &ShareLink) -> Vec<ScheduleEntry> {
    let baseline = ScheduleGenerator::new(&state.menu).generate(
        link.seed,
        link.start.unwrap_or_else(today),
        link.mode.unwrap_or_default(),
    );
    match &link.overrides {
        Some(encoded) => share::apply(&baseline, &share::decode(encoded, &state.lists)),
        None => baseline,
    }
}

fn not_found(viewer: &str) -> actix_web::Error {
    Error::NotFound(format!("no session for viewer '{}'", viewer)).into()
}

// Plan endpoint
async fn get_plan(query: web::Query<PlanQuery>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let link = query.link();
    let schedule = render_link(&state, &link);
    Ok(HttpResponse::Ok().json(PlanResponse {
        seed: link.seed,
        share: link.to_query()?,
        schedule,
    }))
}

// Shopping list for one week of a plan
async fn get_shopping(
    query: web::Query<PlanQuery>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let mut link = query.link();
    let week = query.week.unwrap_or(0);
    // Later weeks need the year window unless a mode was asked for
    if week > 0 && query.mode.is_none() {
        link.mode = Some(PlanMode::Year);
    }
    let schedule = render_link(&state, &link);
    let days = week_slice(&schedule, week);
    if days.is_empty() {
        return Err(Error::NotFound(format!("week {} is outside the plan", week)).into());
    }
    Ok(HttpResponse::Ok().json(ShoppingResponse {
        seed: link.seed,
        week,
        items: aggregate(days, state.menu.as_ref()),
    }))
}

async fn get_master_lists(state: web::Data<AppState>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(state.lists.as_ref()))
}

async fn create_session(
    req: web::Json<CreateSessionRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let req = req.into_inner();
    if req.display_name.trim().is_empty() {
        return Err(Error::InvalidInput("display_name is required".to_string()).into());
    }
    let viewer = ViewerIdentity {
        viewer_id: req
            .viewer_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("viewer-{:016x}", rand::random::<u64>())),
        display_name: req.display_name,
        avatar_ref: req.avatar_ref.unwrap_or_default(),
    };
    let mut link = ShareLink::new(req.seed.unwrap_or_else(default_seed));
    link.overrides = req.overrides.filter(|o| !o.is_empty());
    link.start = req.start;
    link.mode = req.mode;

    let mut sessions = state.sessions()?;
    // Replacing an existing session drops it first, which clears its presence.
    sessions.remove(&viewer.viewer_id);
    let session = PlanSession::from_link(
        Arc::clone(&state.menu),
        Arc::clone(&state.lists),
        Arc::clone(&state.realtime),
        viewer.clone(),
        &link,
        today(),
    );
    let view = SessionView::of(&session)?;
    sessions.insert(viewer.viewer_id.clone(), session);
    info!("Session opened for {} on seed {}", viewer.viewer_id, view.seed);
    Ok(HttpResponse::Created().json(view))
}

async fn get_session(
    viewer: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let sessions = state.sessions()?;
    let session = sessions.get(viewer.as_str()).ok_or_else(|| not_found(&viewer))?;
    Ok(HttpResponse::Ok().json(SessionView::of(session)?))
}

async fn put_day(
    path: web::Path<(String, usize)>,
    edit: web::Json<Override>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (viewer, day) = path.into_inner();
    let mut sessions = state.sessions()?;
    let session = sessions.get_mut(&viewer).ok_or_else(|| not_found(&viewer))?;
    if day >= session.baseline().len() {
        return Err(Error::InvalidInput(format!("day {} is outside the plan", day)).into());
    }
    session.edit_day(day, edit.into_inner());
    Ok(HttpResponse::Ok().json(SessionView::of(session)?))
}

async fn delete_day(
    path: web::Path<(String, usize)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (viewer, day) = path.into_inner();
    let mut sessions = state.sessions()?;
    let session = sessions.get_mut(&viewer).ok_or_else(|| not_found(&viewer))?;
    session.clear_day(day);
    Ok(HttpResponse::Ok().json(SessionView::of(session)?))
}

async fn put_seed(
    viewer: web::Path<String>,
    req: web::Json<SwitchSeedRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let mut sessions = state.sessions()?;
    let session = sessions.get_mut(viewer.as_str()).ok_or_else(|| not_found(&viewer))?;
    session.generate(
        req.seed.unwrap_or_else(default_seed),
        req.start.unwrap_or_else(today),
        req.mode.unwrap_or_default(),
    );
    Ok(HttpResponse::Ok().json(SessionView::of(session)?))
}

async fn delete_session(
    viewer: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let removed = state.sessions()?.remove(viewer.as_str());
    match removed {
        Some(_) => {
            info!("Session closed for {}", viewer);
            Ok(HttpResponse::Ok().json(serde_json::json!({"success": true})))
        }
        None => Err(not_found(&viewer)),
    }
}

fn event_name(event: &SessionEvent) -> &'static str {
    match event {
        SessionEvent::Rendered { .. } => "rendered",
        SessionEvent::Presence { .. } => "presence",
    }
}

/// Encodes session events as server-sent event frames, starting with `initial`
pub fn event_frames(
    mut events: broadcast::Receiver<SessionEvent>,
    initial: SessionEvent,
    viewer: String,
) -> impl Stream<Item = std::result::Result<web::Bytes, Infallible>> {
    async_stream::stream! {
        let mut next = Some(initial);
        loop {
            let event = match next.take() {
                Some(event) => event,
                None => match events.recv().await {
                    Ok(event) => event,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event stream for {} skipped {} events", viewer, skipped);
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                },
            };
            match serde_json::to_string(&event) {
                Ok(data) => {
                    let frame = format!("event: {}\ndata: {}\n\n", event_name(&event), data);
                    yield Ok::<_, Infallible>(web::Bytes::from(frame));
                }
                Err(e) => warn!("Failed to encode event for {}: {}", viewer, e),
            }
        }
        info!("Event stream closed for {}", viewer);
    }
}

// Re-render and presence notifications for one viewer
async fn session_events(
    viewer: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (events, initial) = {
        let sessions = state.sessions()?;
        let session = sessions.get(viewer.as_str()).ok_or_else(|| not_found(&viewer))?;
        let initial = SessionEvent::Rendered {
            seed: session.seed(),
            overrides: session.serialized_overrides(),
        };
        (session.events(), initial)
    };
    let viewer = viewer.into_inner();
    info!("Event stream opened for {}", viewer);

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .streaming(event_frames(events, initial, viewer)))
}

async fn get_recent(state: web::Data<AppState>) -> Result<HttpResponse> {
    let recent = state
        .recent
        .lock()
        .map_err(|_| actix_web::error::ErrorInternalServerError("recent plans poisoned"))?;
    let plans: Vec<RecentPlan> = recent.plans().to_vec();
    Ok(HttpResponse::Ok().json(plans))
}

async fn record_recent(
    req: web::Json<RecordRecentRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let mut recent = state
        .recent
        .lock()
        .map_err(|_| actix_web::error::ErrorInternalServerError("recent plans poisoned"))?;
    recent.record(req.seed, &req.overrides, Utc::now());
    if let Some(path) = &state.recent_path {
        if let Err(e) = recent.save(path) {
            warn!("Failed to persist recent plans: {}", e);
        }
    }
    Ok(HttpResponse::Ok().json(recent.plans()))
}

/// Registers every route; shared by the server and tests
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/plan", web::get().to(get_plan))
        .route("/api/plan/shopping", web::get().to(get_shopping))
        .route("/api/master-lists", web::get().to(get_master_lists))
        .route("/api/sessions", web::post().to(create_session))
        .route("/api/sessions/{viewer}", web::get().to(get_session))
        .route("/api/sessions/{viewer}", web::delete().to(delete_session))
        .route("/api/sessions/{viewer}/seed", web::put().to(put_seed))
        .route("/api/sessions/{viewer}/events", web::get().to(session_events))
        .route("/api/sessions/{viewer}/days/{day}", web::put().to(put_day))
        .route("/api/sessions/{viewer}/days/{day}", web::delete().to(delete_day))
        .route("/api/recent", web::get().to(get_recent))
        .route("/api/recent", web::post().to(record_recent));
}

pub async fn start_server(port: u16, app_state: AppState) -> std::io::Result<()> {
    let app_state = web::Data::new(app_state);
    info!("Listening on 0.0.0.0:{}", port);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .wrap(middleware::Logger::default())
            .configure(configure)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn frames_start_with_the_current_render() {
        let (tx, rx) = broadcast::channel(4);
        let initial = SessionEvent::Rendered {
            seed: 8,
            overrides: "1,0,0,0,-1".into(),
        };
        let mut frames = Box::pin(event_frames(rx, initial, "a".into()));

        let first = frames.next().await.unwrap().unwrap();
        assert_eq!(
            first,
            web::Bytes::from(
                "event: rendered\ndata: {\"event\":\"rendered\",\"seed\":8,\"overrides\":\"1,0,0,0,-1\"}\n\n"
            )
        );

        tx.send(SessionEvent::Presence { viewers: vec![] }).unwrap();
        let second = frames.next().await.unwrap().unwrap();
        assert!(second.starts_with(b"event: presence\n"));

        drop(tx);
        assert!(frames.next().await.is_none());
    }
}
