use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tokio::sync::Mutex;
use tracing::{error, info};

use crate::briefing;
use crate::due::{parse_date, DATE_FORMAT};
use crate::facts;
use crate::llm::TextGenerator;
use crate::store::{normalize_username, Profile, ProfileStore, Store};
use crate::tasks::{self, TaskView};

pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub fn local_clock() -> Clock {
    Arc::new(|| chrono::Local::now().naive_local())
}

/// Shared by every handler. The store lock is held for a whole request,
/// including any generator call, so interactions never interleave.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<Store>>,
    pub files: Arc<ProfileStore>,
    pub llm: Arc<dyn TextGenerator>,
    pub clock: Clock,
}

impl AppState {
    pub fn new(files: ProfileStore, llm: Arc<dyn TextGenerator>, clock: Clock) -> Self {
        let store = files.load();
        info!(
            "loaded {} profile(s) from {}",
            store.profiles.len(),
            files.path().display()
        );
        Self {
            store: Arc::new(Mutex::new(store)),
            files: Arc::new(files),
            llm,
            clock,
        }
    }

    fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }

    fn persist(&self, store: &Store) -> Result<(), Response> {
        self.files.save(store).map_err(|err| {
            error!("save {} failed: {err:#}", self.files.path().display());
            err_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error")
        })
    }
}

#[derive(Serialize)]
pub struct OkResponse<T: Serialize> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

#[derive(Serialize)]
struct ErrResponse {
    ok: bool,
    error: &'static str,
}

fn ok<T: Serialize>(data: T) -> Response {
    Json(OkResponse {
        ok: true,
        data: Some(data),
    })
    .into_response()
}

fn err_response(status: StatusCode, error: &'static str) -> Response {
    (status, Json(ErrResponse { ok: false, error })).into_response()
}

fn user_from_path(raw: &str) -> Result<String, Response> {
    normalize_username(raw).ok_or_else(|| err_response(StatusCode::BAD_REQUEST, "empty_username"))
}

/// Absent or blank dates mean "no due date"; anything else must be YYYY-MM-DD.
fn parse_due(raw: Option<String>) -> Result<Option<String>, Response> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => parse_date(s)
            .map(|d| Some(d.format(DATE_FORMAT).to_string()))
            .ok_or_else(|| err_response(StatusCode::BAD_REQUEST, "invalid_due_date")),
    }
}

#[derive(Serialize)]
pub struct HealthInfo {
    service: &'static str,
    version: &'static str,
}

pub async fn health() -> impl IntoResponse {
    Json(OkResponse {
        ok: true,
        data: Some(HealthInfo {
            service: "orbit_core",
            version: env!("CARGO_PKG_VERSION"),
        }),
    })
}

#[derive(Serialize)]
pub struct HomeView {
    user: String,
    display_name: String,
    interests: Vec<String>,
    interests_raw: String,
    briefing: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    last_briefing_date: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    onboarding_time: Option<String>,
}

fn home_view(username: &str, profile: &Profile) -> HomeView {
    HomeView {
        user: username.to_string(),
        display_name: briefing::display_name(username),
        interests: profile.interest_list(),
        interests_raw: profile.interests.clone(),
        briefing: briefing::home_briefing(profile, username),
        last_briefing_date: profile.last_briefing_date.clone(),
        onboarding_time: profile.onboarding_time.clone(),
    }
}

#[derive(Deserialize)]
pub struct LoginRequest {
    username: String,
}

/// Creates the profile on first sight, then runs the briefing check.
pub async fn post_login(State(state): State<AppState>, Json(req): Json<LoginRequest>) -> Response {
    let Some(username) = normalize_username(&req.username) else {
        return err_response(StatusCode::BAD_REQUEST, "empty_username");
    };
    let now = state.now();
    let mut store = state.store.lock().await;

    let (profile, created) = store.ensure_profile(&username);
    let outcome = briefing::check_and_run(profile, &username, state.llm.as_ref(), now).await;
    if created || outcome.changed() {
        if let Err(resp) = state.persist(&store) {
            return resp;
        }
    }
    info!("login: {username}");

    match store.profile(&username) {
        Some(profile) => ok(home_view(&username, profile)),
        None => err_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
    }
}

/// Deep-link entry: shows the home view, seeding a profile for unseen names.
pub async fn get_home(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    let username = match user_from_path(&user) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let mut store = state.store.lock().await;
    let (_, created) = store.ensure_profile(&username);
    if created {
        if let Err(resp) = state.persist(&store) {
            return resp;
        }
    }
    match store.profile(&username) {
        Some(profile) => ok(home_view(&username, profile)),
        None => err_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
    }
}

#[derive(Deserialize)]
pub struct InterestsUpdate {
    interests: String,
}

pub async fn post_interests(
    State(state): State<AppState>,
    Path(user): Path<String>,
    Json(req): Json<InterestsUpdate>,
) -> Response {
    let username = match user_from_path(&user) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let mut store = state.store.lock().await;
    let Some(profile) = store.profile_mut(&username) else {
        return err_response(StatusCode::NOT_FOUND, "unknown_user");
    };
    // Tasks under categories that disappear from the list are kept.
    profile.interests = req.interests;
    if let Err(resp) = state.persist(&store) {
        return resp;
    }
    match store.profile(&username) {
        Some(profile) => ok(home_view(&username, profile)),
        None => err_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
    }
}

pub async fn post_briefing_check(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    let username = match user_from_path(&user) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let now = state.now();
    let mut store = state.store.lock().await;
    let Some(profile) = store.profile_mut(&username) else {
        return err_response(StatusCode::NOT_FOUND, "unknown_user");
    };
    let outcome = briefing::check_and_run(profile, &username, state.llm.as_ref(), now).await;
    if outcome.changed() {
        if let Err(resp) = state.persist(&store) {
            return resp;
        }
    }
    match store.profile(&username) {
        Some(profile) => ok(home_view(&username, profile)),
        None => err_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error"),
    }
}

#[derive(Serialize)]
pub struct FactView {
    fact: String,
}

pub async fn post_fact(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    let username = match user_from_path(&user) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let store = state.store.lock().await;
    let Some(profile) = store.profile(&username) else {
        return err_response(StatusCode::NOT_FOUND, "unknown_user");
    };
    let interests = profile.interest_list();
    let fact = facts::random_fact(&interests, state.llm.as_ref()).await;
    ok(FactView { fact })
}

#[derive(Serialize)]
pub struct CategoryTasks {
    category: String,
    tasks: Vec<TaskView>,
}

/// Every category with tasks, including ones no longer listed as interests.
pub async fn get_all_tasks(State(state): State<AppState>, Path(user): Path<String>) -> Response {
    let username = match user_from_path(&user) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let today = state.now().date();
    let store = state.store.lock().await;
    let Some(profile) = store.profile(&username) else {
        return err_response(StatusCode::NOT_FOUND, "unknown_user");
    };
    let all: BTreeMap<String, Vec<TaskView>> = profile
        .tasks
        .keys()
        .map(|category| (category.clone(), tasks::task_views(profile, category, today)))
        .collect();
    ok(all)
}

pub async fn get_category_tasks(
    State(state): State<AppState>,
    Path((user, category)): Path<(String, String)>,
) -> Response {
    let username = match user_from_path(&user) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let today = state.now().date();
    let store = state.store.lock().await;
    let Some(profile) = store.profile(&username) else {
        return err_response(StatusCode::NOT_FOUND, "unknown_user");
    };
    ok(CategoryTasks {
        tasks: tasks::task_views(profile, &category, today),
        category,
    })
}

#[derive(Deserialize)]
pub struct TaskInput {
    #[serde(default)]
    title: String,
    #[serde(default)]
    due_date: Option<String>,
}

#[derive(Serialize)]
pub struct TaskMutation {
    changed: bool,
    category: String,
    tasks: Vec<TaskView>,
}

/// Applies `op` to the user's profile if it exists, persists on change and
/// answers with the category's refreshed list. A missing profile is a no-op.
async fn mutate_tasks<F>(state: &AppState, username: &str, category: String, op: F) -> Response
where
    F: FnOnce(&mut Profile, NaiveDateTime) -> bool,
{
    let now = state.now();
    let mut store = state.store.lock().await;
    let changed = match store.profile_mut(username) {
        Some(profile) => op(profile, now),
        None => false,
    };
    if changed {
        if let Err(resp) = state.persist(&store) {
            return resp;
        }
    }
    let tasks = store
        .profile(username)
        .map(|p| tasks::task_views(p, &category, now.date()))
        .unwrap_or_default();
    ok(TaskMutation {
        changed,
        category,
        tasks,
    })
}

pub async fn post_add_task(
    State(state): State<AppState>,
    Path((user, category)): Path<(String, String)>,
    Json(req): Json<TaskInput>,
) -> Response {
    let username = match user_from_path(&user) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let due_date = match parse_due(req.due_date) {
        Ok(d) => d,
        Err(resp) => return resp,
    };

    let now = state.now();
    let mut store = state.store.lock().await;
    let Some(profile) = store.profile_mut(&username) else {
        return ok(TaskMutation {
            changed: false,
            category,
            tasks: Vec::new(),
        });
    };
    let changed = tasks::add_task(profile, &category, &req.title, due_date, now);
    if changed {
        if let Err(resp) = state.persist(&store) {
            return resp;
        }
        let Some(profile) = store.profile_mut(&username) else {
            return err_response(StatusCode::INTERNAL_SERVER_ERROR, "store_error");
        };
        let outcome = briefing::check_and_run(profile, &username, state.llm.as_ref(), now).await;
        if outcome.changed() {
            if let Err(resp) = state.persist(&store) {
                return resp;
            }
        }
    }
    let tasks = store
        .profile(&username)
        .map(|p| tasks::task_views(p, &category, now.date()))
        .unwrap_or_default();
    ok(TaskMutation {
        changed,
        category,
        tasks,
    })
}

pub async fn post_edit_task(
    State(state): State<AppState>,
    Path((user, category, index)): Path<(String, String, usize)>,
    Json(req): Json<TaskInput>,
) -> Response {
    let username = match user_from_path(&user) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let due_date = match parse_due(req.due_date) {
        Ok(d) => d,
        Err(resp) => return resp,
    };
    let cat = category.clone();
    mutate_tasks(&state, &username, category, move |p, _| {
        tasks::edit_task(p, &cat, index, &req.title, due_date)
    })
    .await
}

pub async fn post_toggle_task(
    State(state): State<AppState>,
    Path((user, category, index)): Path<(String, String, usize)>,
) -> Response {
    let username = match user_from_path(&user) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let cat = category.clone();
    mutate_tasks(&state, &username, category, move |p, _| {
        tasks::toggle_done(p, &cat, index)
    })
    .await
}

pub async fn delete_task(
    State(state): State<AppState>,
    Path((user, category, index)): Path<(String, String, usize)>,
) -> Response {
    let username = match user_from_path(&user) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let cat = category.clone();
    mutate_tasks(&state, &username, category, move |p, _| {
        tasks::delete_task(p, &cat, index)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::fake::ScriptedGenerator;
    use axum::body::to_bytes;
    use chrono::{Duration, NaiveDate};
    use serde_json::{json, Value};

    struct Harness {
        state: AppState,
        llm: Arc<ScriptedGenerator>,
        now: Arc<std::sync::Mutex<NaiveDateTime>>,
        _dir: tempfile::TempDir,
    }

    impl Harness {
        fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let llm = Arc::new(ScriptedGenerator::default());
            let now = Arc::new(std::sync::Mutex::new(
                NaiveDate::from_ymd_opt(2026, 10, 18)
                    .unwrap()
                    .and_hms_opt(8, 0, 0)
                    .unwrap(),
            ));
            let clock_now = now.clone();
            let clock: Clock = Arc::new(move || *clock_now.lock().unwrap());
            let state = AppState::new(
                ProfileStore::new(dir.path().join("tasks.json")),
                llm.clone(),
                clock,
            );
            Self {
                state,
                llm,
                now,
                _dir: dir,
            }
        }

        fn advance(&self, d: Duration) {
            *self.now.lock().unwrap() += d;
        }

        fn on_disk(&self) -> Store {
            self.state.files.load()
        }
    }

    async fn body(resp: Response) -> (StatusCode, Value) {
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn input(title: &str, due: Option<&str>) -> Json<TaskInput> {
        Json(TaskInput {
            title: title.to_string(),
            due_date: due.map(str::to_string),
        })
    }

    async fn login(h: &Harness, name: &str) -> Value {
        let (status, v) = body(
            post_login(
                State(h.state.clone()),
                Json(LoginRequest {
                    username: name.to_string(),
                }),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        v
    }

    #[tokio::test]
    async fn first_task_then_delayed_briefing() {
        let h = Harness::new();
        let v = login(&h, "  Alice ").await;
        assert_eq!(v["data"]["user"], "alice");
        assert_eq!(v["data"]["interests"], json!(["Coding", "Fitness"]));
        assert!(v["data"]["briefing"].as_str().unwrap().contains("Welcome, Alice!"));
        assert!(h.on_disk().profiles.contains_key("alice"));

        let (_, v) = body(
            post_add_task(
                State(h.state.clone()),
                Path(("alice".into(), "Coding".into())),
                input("Buy milk", Some("2026-10-18")),
            )
            .await,
        )
        .await;
        assert_eq!(v["data"]["changed"], true);
        assert_eq!(v["data"]["tasks"][0]["title"], "Buy milk");

        let stored = h.on_disk().profiles["alice"].clone();
        assert!(stored.onboarding_time.is_some());
        assert_eq!(stored.daily_briefing, "");
        assert_eq!(h.llm.calls(), 0);

        h.advance(Duration::minutes(5));
        let (_, v) = body(post_briefing_check(State(h.state.clone()), Path("alice".into())).await).await;
        assert_eq!(h.llm.calls(), 1);
        let prompt = &h.llm.prompts()[0];
        assert!(prompt.contains("Buy milk"));
        assert!(prompt.contains("2026-10-18"));
        assert_eq!(v["data"]["briefing"], "ok");
        assert_eq!(h.on_disk().profiles["alice"].last_briefing_date, "2026-10-18");

        // same day: login does not regenerate
        login(&h, "alice").await;
        assert_eq!(h.llm.calls(), 1);
    }

    #[tokio::test]
    async fn task_crud_round_trip() {
        let h = Harness::new();
        login(&h, "bob").await;
        let path = || Path(("bob".to_string(), "Fitness".to_string()));
        post_add_task(State(h.state.clone()), path(), input("Run", None)).await;
        post_add_task(State(h.state.clone()), path(), input("Swim", Some("2026-10-19"))).await;

        let idx = |i: usize| Path(("bob".to_string(), "Fitness".to_string(), i));
        post_toggle_task(State(h.state.clone()), idx(0)).await;
        let (_, v) = body(post_edit_task(State(h.state.clone()), idx(0), input("Run 5k", None)).await).await;
        assert_eq!(v["data"]["tasks"][0]["title"], "Run 5k");
        assert_eq!(v["data"]["tasks"][0]["done"], true);
        assert_eq!(v["data"]["tasks"][1]["due_label"], "🕒 Due Tomorrow");

        let (_, v) = body(delete_task(State(h.state.clone()), idx(0)).await).await;
        assert_eq!(v["data"]["tasks"].as_array().unwrap().len(), 1);
        assert_eq!(v["data"]["tasks"][0]["title"], "Swim");
        assert_eq!(h.on_disk().profiles["bob"].tasks["Fitness"].len(), 1);
    }

    #[tokio::test]
    async fn stale_coordinates_and_unknown_users_are_noops() {
        let h = Harness::new();
        login(&h, "carol").await;
        let (status, v) = body(
            post_toggle_task(State(h.state.clone()), Path(("carol".into(), "Coding".into(), 3))).await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["data"]["changed"], false);

        let (status, v) = body(
            delete_task(State(h.state.clone()), Path(("nobody".into(), "Coding".into(), 0))).await,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["data"]["changed"], false);
        assert!(!h.on_disk().profiles.contains_key("nobody"));

        let (_, v) = body(
            post_add_task(State(h.state.clone()), Path(("carol".into(), "Coding".into())), input("", None)).await,
        )
        .await;
        assert_eq!(v["data"]["changed"], false);
        assert_eq!(h.llm.calls(), 0);
    }

    #[tokio::test]
    async fn bad_input_is_rejected() {
        let h = Harness::new();
        let (status, v) = body(
            post_login(State(h.state.clone()), Json(LoginRequest { username: "   ".into() })).await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "empty_username");

        login(&h, "dave").await;
        let (status, v) = body(
            post_add_task(
                State(h.state.clone()),
                Path(("dave".into(), "Coding".into())),
                input("x", Some("18/10/2026")),
            )
            .await,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(v["error"], "invalid_due_date");

        let (status, _) = body(post_fact(State(h.state.clone()), Path("ghost".into())).await).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn interests_update_keeps_orphaned_tasks() {
        let h = Harness::new();
        login(&h, "erin").await;
        post_add_task(State(h.state.clone()), Path(("erin".into(), "Fitness".into())), input("Lift", None)).await;

        let (_, v) = body(
            post_interests(
                State(h.state.clone()),
                Path("erin".into()),
                Json(InterestsUpdate {
                    interests: "Chess, , Baking".into(),
                }),
            )
            .await,
        )
        .await;
        assert_eq!(v["data"]["interests"], json!(["Chess", "Baking"]));

        let (_, v) = body(get_all_tasks(State(h.state.clone()), Path("erin".into())).await).await;
        assert_eq!(v["data"]["Fitness"][0]["title"], "Lift");

        let (_, v) = body(get_home(State(h.state.clone()), Path("Erin".into())).await).await;
        assert_eq!(v["data"]["interests_raw"], "Chess, , Baking");
        assert!(v["data"]["briefing"].as_str().unwrap().contains("Analyzing"));
    }

    #[tokio::test]
    async fn fact_reads_interests() {
        let h = Harness::new();
        login(&h, "frank").await;
        post_interests(
            State(h.state.clone()),
            Path("frank".into()),
            Json(InterestsUpdate {
                interests: "Volcanoes".into(),
            }),
        )
        .await;
        let (_, v) = body(post_fact(State(h.state.clone()), Path("frank".into())).await).await;
        assert_eq!(v["data"]["fact"], "ok");
        assert!(h.llm.prompts()[0].contains("about Volcanoes"));
    }
}
