use reqwest::{Client, RequestBuilder, Url};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct HomeView {
    pub user: String,
    pub display_name: String,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub interests_raw: String,
    #[serde(default)]
    pub briefing: String,
    #[serde(default)]
    pub last_briefing_date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskView {
    pub index: usize,
    pub title: String,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub due_label: Option<String>,
    #[serde(default)]
    pub done: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryTasks {
    pub category: String,
    pub tasks: Vec<TaskView>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskMutation {
    pub changed: bool,
    pub category: String,
    pub tasks: Vec<TaskView>,
}

#[derive(Deserialize)]
struct FactView {
    fact: String,
}

#[derive(Serialize)]
struct TaskInput<'a> {
    title: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    due_date: Option<&'a str>,
}

/// Thin JSON client for orbit_core.
pub struct CoreClient {
    http: Client,
    base: Url,
}

impl CoreClient {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| anyhow::anyhow!("invalid --core-url '{base_url}': {e}"))?;
        if base.cannot_be_a_base() {
            anyhow::bail!("invalid --core-url '{base_url}'");
        }
        Ok(Self {
            http: Client::new(),
            base,
        })
    }

    /// Appends path segments, percent-encoding each one (categories may contain spaces).
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    pub async fn health(&self) -> anyhow::Result<()> {
        let _: serde_json::Value = send_ok(self.http.get(self.url(&["health"]))).await?;
        Ok(())
    }

    pub async fn login(&self, username: &str) -> anyhow::Result<HomeView> {
        let body = serde_json::json!({ "username": username });
        send_ok(self.http.post(self.url(&["login"])).json(&body)).await
    }

    pub async fn home(&self, user: &str) -> anyhow::Result<HomeView> {
        send_ok(self.http.get(self.url(&["users", user, "home"]))).await
    }

    pub async fn set_interests(&self, user: &str, interests: &str) -> anyhow::Result<HomeView> {
        let body = serde_json::json!({ "interests": interests });
        send_ok(
            self.http
                .post(self.url(&["users", user, "interests"]))
                .json(&body),
        )
        .await
    }

    pub async fn check_briefing(&self, user: &str) -> anyhow::Result<HomeView> {
        send_ok(self.http.post(self.url(&["users", user, "briefing", "check"]))).await
    }

    pub async fn fact(&self, user: &str) -> anyhow::Result<String> {
        let v: FactView = send_ok(self.http.post(self.url(&["users", user, "fact"]))).await?;
        Ok(v.fact)
    }

    pub async fn all_tasks(&self, user: &str) -> anyhow::Result<BTreeMap<String, Vec<TaskView>>> {
        send_ok(self.http.get(self.url(&["users", user, "tasks"]))).await
    }

    pub async fn tasks(&self, user: &str, category: &str) -> anyhow::Result<CategoryTasks> {
        send_ok(self.http.get(self.url(&["users", user, "tasks", category]))).await
    }

    pub async fn add_task(
        &self,
        user: &str,
        category: &str,
        title: &str,
        due_date: Option<&str>,
    ) -> anyhow::Result<TaskMutation> {
        send_ok(
            self.http
                .post(self.url(&["users", user, "tasks", category]))
                .json(&TaskInput { title, due_date }),
        )
        .await
    }

    pub async fn edit_task(
        &self,
        user: &str,
        category: &str,
        index: usize,
        title: &str,
        due_date: Option<&str>,
    ) -> anyhow::Result<TaskMutation> {
        let idx = index.to_string();
        send_ok(
            self.http
                .post(self.url(&["users", user, "tasks", category, &idx]))
                .json(&TaskInput { title, due_date }),
        )
        .await
    }

    pub async fn toggle_task(&self, user: &str, category: &str, index: usize) -> anyhow::Result<TaskMutation> {
        let idx = index.to_string();
        send_ok(
            self.http
                .post(self.url(&["users", user, "tasks", category, &idx, "toggle"])),
        )
        .await
    }

    pub async fn delete_task(&self, user: &str, category: &str, index: usize) -> anyhow::Result<TaskMutation> {
        let idx = index.to_string();
        send_ok(
            self.http
                .delete(self.url(&["users", user, "tasks", category, &idx])),
        )
        .await
    }
}

async fn send_ok<T: DeserializeOwned>(req: RequestBuilder) -> anyhow::Result<T> {
    #[derive(Deserialize)]
    struct Envelope<T> {
        ok: bool,
        data: Option<T>,
        #[serde(default)]
        error: Option<String>,
    }

    let res = req.send().await?;
    let status = res.status();
    let raw = res.text().await?;
    if !status.is_success() {
        let code = serde_json::from_str::<Envelope<serde_json::Value>>(&raw)
            .ok()
            .and_then(|e| e.error);
        match code {
            Some(code) => anyhow::bail!("{code} (http_{})", status.as_u16()),
            None => anyhow::bail!("http_{}", status.as_u16()),
        }
    }
    let body: Envelope<T> = serde_json::from_str(&raw)?;
    if !body.ok {
        anyhow::bail!("{}", body.error.unwrap_or_else(|| "not_ok".to_string()));
    }
    body.data.ok_or_else(|| anyhow::anyhow!("missing_data"))
}
