use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{info, warn};

pub const DEFAULT_INTERESTS: &str = "Coding, Fitness";

/// Everything the service persists: one profile per lowercase username.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct Store {
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Store {
    pub fn profile(&self, username: &str) -> Option<&Profile> {
        self.profiles.get(username)
    }

    pub fn profile_mut(&mut self, username: &str) -> Option<&mut Profile> {
        self.profiles.get_mut(username)
    }

    /// Returns the profile for `username`, seeding a default one if it is new.
    /// The flag is true when the profile was just created.
    pub fn ensure_profile(&mut self, username: &str) -> (&mut Profile, bool) {
        let created = !self.profiles.contains_key(username);
        if created {
            info!("new profile: {username}");
        }
        let profile = self.profiles.entry(username.to_string()).or_default();
        (profile, created)
    }
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Profile {
    /// Raw comma-separated interests, exactly as the user typed them.
    #[serde(rename = "interests_str", default = "default_interests")]
    pub interests: String,
    #[serde(default)]
    pub tasks: BTreeMap<String, Vec<Task>>,
    /// "" or YYYY-MM-DD.
    #[serde(default)]
    pub last_briefing_date: String,
    #[serde(default)]
    pub daily_briefing: String,
    /// Local time of the first task ever added, "%Y-%m-%d %H:%M:%S%.6f".
    #[serde(default)]
    pub onboarding_time: Option<String>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            interests: default_interests(),
            tasks: BTreeMap::new(),
            last_briefing_date: String::new(),
            daily_briefing: String::new(),
            onboarding_time: None,
        }
    }
}

impl Profile {
    pub fn interest_list(&self) -> Vec<String> {
        split_interests(&self.interests)
    }
}

fn default_interests() -> String {
    DEFAULT_INTERESTS.to_string()
}

pub fn split_interests(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Trims and lower-cases a login name. Empty input yields `None`.
pub fn normalize_username(raw: &str) -> Option<String> {
    let name = raw.trim().to_lowercase();
    if name.is_empty() {
        None
    } else {
        Some(name)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(from = "TaskRecord")]
pub struct Task {
    pub title: String,
    pub due_date: Option<String>,
    pub done: bool,
}

impl Task {
    pub fn new(title: &str, due_date: Option<String>) -> Self {
        Self {
            title: title.to_string(),
            due_date,
            done: false,
        }
    }
}

// Older files stored a task as a bare title string.
#[derive(Deserialize)]
#[serde(untagged)]
enum TaskRecord {
    Legacy(String),
    Full {
        title: String,
        #[serde(default)]
        due_date: Option<String>,
        #[serde(default)]
        done: bool,
    },
}

impl From<TaskRecord> for Task {
    fn from(r: TaskRecord) -> Self {
        match r {
            TaskRecord::Legacy(title) => Task::new(&title, None),
            TaskRecord::Full {
                title,
                due_date,
                done,
            } => Task {
                title,
                due_date,
                done,
            },
        }
    }
}

/// Flat-file persistence: the whole store is read and rewritten as one JSON document.
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing or unreadable data is treated as an empty store.
    pub fn load(&self) -> Store {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(err) if err.kind() == ErrorKind::NotFound => return Store::default(),
            Err(err) => {
                warn!("read {} failed: {err}", self.path.display());
                return Store::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(store) => store,
            Err(err) => {
                warn!("parse {} failed, starting empty: {err}", self.path.display());
                Store::default()
            }
        }
    }

    /// Overwrites the file in place. Not atomic.
    pub fn save(&self, store: &Store) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string(store)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}
