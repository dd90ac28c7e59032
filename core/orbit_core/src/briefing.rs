//! Daily briefing: decides when a profile is owed a new letter and produces it.
//!
//! There is no background scheduler. The check runs lazily on login, after a
//! task is added and on explicit request. A briefing is generated at most once
//! per calendar day, and a brand-new user waits [`ONBOARDING_DELAY_MINUTES`]
//! after their first task before the first one.

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use crate::due::DATE_FORMAT;
use crate::llm::TextGenerator;
use crate::store::Profile;

pub const ONBOARDING_DELAY_MINUTES: f64 = 5.0;

const ONBOARDING_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
// `%.f` also accepts stamps without a fractional part.
const ONBOARDING_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

pub fn onboarding_stamp(now: NaiveDateTime) -> String {
    now.format(ONBOARDING_FORMAT).to_string()
}

pub fn parse_onboarding(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), ONBOARDING_PARSE_FORMAT).ok()
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BriefingState {
    /// Never briefed and no task added yet.
    Uninitialized,
    /// Never briefed, waiting out the onboarding delay. `None` when the
    /// stored onboarding stamp cannot be read.
    Onboarding { elapsed_minutes: Option<f64> },
    /// Last briefing is from an earlier day.
    Stale,
    /// Already briefed today.
    Fresh,
}

impl BriefingState {
    pub fn is_due(self) -> bool {
        match self {
            BriefingState::Onboarding {
                elapsed_minutes: Some(m),
            } => m >= ONBOARDING_DELAY_MINUTES,
            BriefingState::Stale => true,
            _ => false,
        }
    }
}

pub fn classify(profile: &Profile, now: NaiveDateTime) -> BriefingState {
    if profile.last_briefing_date.is_empty() {
        return match profile.onboarding_time.as_deref() {
            None => BriefingState::Uninitialized,
            Some(raw) => BriefingState::Onboarding {
                elapsed_minutes: parse_onboarding(raw)
                    .map(|start| (now - start).num_milliseconds() as f64 / 60_000.0),
            },
        };
    }
    if profile.last_briefing_date == today_str(now.date()) {
        BriefingState::Fresh
    } else {
        BriefingState::Stale
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BriefingOutcome {
    NotDue,
    /// Nothing pending; the welcome text was stored without calling the generator.
    Welcome,
    Generated,
    /// The generator failed; its error is stored as the briefing text.
    Failed,
}

impl BriefingOutcome {
    pub fn changed(self) -> bool {
        self != BriefingOutcome::NotDue
    }
}

/// Runs the generator if the profile is due. Generator errors never escape;
/// they end up as the stored briefing text.
pub async fn check_and_run(
    profile: &mut Profile,
    username: &str,
    llm: &dyn TextGenerator,
    now: NaiveDateTime,
) -> BriefingOutcome {
    if !classify(profile, now).is_due() {
        return BriefingOutcome::NotDue;
    }
    generate(profile, username, llm, now.date()).await
}

async fn generate(
    profile: &mut Profile,
    username: &str,
    llm: &dyn TextGenerator,
    today: NaiveDate,
) -> BriefingOutcome {
    let name = display_name(username);
    let (pending, count) = pending_tasks_block(profile);

    // last_briefing_date stays untouched so the check keeps firing until a task exists.
    if count == 0 {
        profile.daily_briefing = welcome_message(&name);
        return BriefingOutcome::Welcome;
    }

    let today = today_str(today);
    let prompt = briefing_prompt(&name, &today, &pending);
    match llm.generate(&prompt).await {
        Ok(text) => {
            info!("briefing generated for {username} ({count} pending tasks)");
            profile.daily_briefing = text;
            profile.last_briefing_date = today;
            BriefingOutcome::Generated
        }
        Err(err) => {
            warn!("briefing generation failed for {username}: {err:#}");
            profile.daily_briefing = format!("❌ **Connection Error:** {err}");
            BriefingOutcome::Failed
        }
    }
}

/// One line per unfinished task across every category, plus the count.
pub fn pending_tasks_block(profile: &Profile) -> (String, usize) {
    let mut out = String::new();
    let mut count = 0;
    for task in profile.tasks.values().flatten().filter(|t| !t.done) {
        let due = task.due_date.as_deref().unwrap_or("None");
        out.push_str(&format!("- {} (Due: {})\n", task.title, due));
        count += 1;
    }
    (out, count)
}

pub fn briefing_prompt(name: &str, today: &str, pending: &str) -> String {
    let mut prompt = String::with_capacity(1024 + pending.len());
    prompt.push_str(&format!(
        "You are a personal assistant. The date is {today}. The user is {name}.\n\n"
    ));
    prompt.push_str("User's Pending Tasks:\n");
    prompt.push_str(pending);
    prompt.push_str("\nINSTRUCTIONS:\n");
    prompt.push_str(&format!("1. Check if any tasks are due TODAY ({today}).\n"));
    prompt.push_str("2. Pick ONE \"Priority Task\" (most urgent or important).\n");
    prompt.push_str("3. Write a short letter following this TONE/STRUCTURE:\n\n");
    prompt.push_str(&format!("\"Hello {name}, how are you feeling today?\n\n"));
    prompt.push_str("[If tasks are due today, list them: \"Today you have to...\"].\n");
    prompt.push_str("[If NO tasks are due today, say: \"You have no urgent deadlines today.\"]\n\n");
    prompt.push_str("I would recommend you get to [Priority Task Name] because [Reason].\n\n");
    prompt.push_str("Do have a lovely day\"\n");
    prompt
}

pub fn welcome_message(name: &str) -> String {
    format!(
        "👋 **Welcome, {name}!**\n\nYour dashboard is currently empty. \
         Add your first task to start the 5-minute analysis timer!"
    )
}

/// Text for the home view, falling back to a status notice before the first briefing.
pub fn home_briefing(profile: &Profile, username: &str) -> String {
    if !profile.daily_briefing.is_empty() {
        return profile.daily_briefing.clone();
    }
    if profile.onboarding_time.is_some() {
        "⏳ **Analyzing...**\n\nOrbit is reviewing your initial tasks. \
         Your first briefing will arrive in a few minutes."
            .to_string()
    } else {
        format!(
            "👋 **Welcome, {}!**\n\nYour dashboard is currently empty. Add your first task to start.",
            display_name(username)
        )
    }
}

/// Title-cases a username: each run of letters starts upper-case, the rest lower-case.
pub fn display_name(username: &str) -> String {
    let mut out = String::with_capacity(username.len());
    let mut in_word = false;
    for c in username.chars() {
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

fn today_str(today: NaiveDate) -> String {
    today.format(DATE_FORMAT).to_string()
}
