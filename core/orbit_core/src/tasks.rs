//! Per-category task lists, addressed by `(category, index)`.
//!
//! Every operation is a silent no-op when the category or index does not
//! exist; the return value says whether anything changed so callers know
//! whether to persist.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

use crate::briefing::onboarding_stamp;
use crate::due::format_due_date;
use crate::store::{Profile, Task};

pub fn add_task(
    profile: &mut Profile,
    category: &str,
    title: &str,
    due_date: Option<String>,
    now: NaiveDateTime,
) -> bool {
    let title = title.trim();
    if title.is_empty() {
        return false;
    }
    profile
        .tasks
        .entry(category.to_string())
        .or_default()
        .push(Task::new(title, due_date));

    if profile.onboarding_time.is_none() {
        profile.onboarding_time = Some(onboarding_stamp(now));
    }
    true
}

/// Replaces title and due date; `done` is left alone. Empty titles are ignored.
pub fn edit_task(
    profile: &mut Profile,
    category: &str,
    index: usize,
    new_title: &str,
    new_due_date: Option<String>,
) -> bool {
    let new_title = new_title.trim();
    if new_title.is_empty() {
        return false;
    }
    let Some(task) = task_mut(profile, category, index) else {
        return false;
    };
    task.title = new_title.to_string();
    task.due_date = new_due_date;
    true
}

pub fn toggle_done(profile: &mut Profile, category: &str, index: usize) -> bool {
    match task_mut(profile, category, index) {
        Some(task) => {
            task.done = !task.done;
            true
        }
        None => false,
    }
}

/// Removes the task; later tasks in the category shift down by one.
pub fn delete_task(profile: &mut Profile, category: &str, index: usize) -> bool {
    match profile.tasks.get_mut(category) {
        Some(list) if index < list.len() => {
            list.remove(index);
            true
        }
        _ => false,
    }
}

fn task_mut<'a>(profile: &'a mut Profile, category: &str, index: usize) -> Option<&'a mut Task> {
    profile.tasks.get_mut(category)?.get_mut(index)
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TaskView {
    pub index: usize,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_label: Option<String>,
    pub done: bool,
}

pub fn task_views(profile: &Profile, category: &str, today: NaiveDate) -> Vec<TaskView> {
    profile
        .tasks
        .get(category)
        .map(|list| {
            list.iter()
                .enumerate()
                .map(|(index, t)| TaskView {
                    index,
                    title: t.title.clone(),
                    due_date: t.due_date.clone(),
                    due_label: format_due_date(t.due_date.as_deref(), today),
                    done: t.done,
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 18)
            .unwrap()
            .and_hms_micro_opt(9, 30, 0, 125)
            .unwrap()
    }

    fn profile_with(titles: &[&str]) -> Profile {
        let mut p = Profile::default();
        for t in titles {
            assert!(add_task(&mut p, "Coding", t, None, now()));
        }
        p
    }

    #[test]
    fn add_sets_onboarding_once() {
        let mut p = Profile::default();
        assert!(!add_task(&mut p, "Coding", "   ", None, now()));
        assert!(p.onboarding_time.is_none());
        assert!(p.tasks.is_empty());

        assert!(add_task(&mut p, "Coding", "Write tests", Some("2026-10-20".into()), now()));
        let first = p.onboarding_time.clone();
        assert_eq!(first.as_deref(), Some("2026-10-18 09:30:00.000125"));

        let later = now() + chrono::Duration::hours(2);
        assert!(add_task(&mut p, "Fitness", "Run", None, later));
        assert_eq!(p.onboarding_time, first);
        assert_eq!(p.tasks["Coding"][0].due_date.as_deref(), Some("2026-10-20"));
        assert!(!p.tasks["Coding"][0].done);
    }

    #[test]
    fn add_then_delete_restores_list() {
        let mut p = profile_with(&["a", "b"]);
        let before = p.tasks["Coding"].clone();
        assert!(add_task(&mut p, "Coding", "c", None, now()));
        assert!(delete_task(&mut p, "Coding", 2));
        assert_eq!(p.tasks["Coding"], before);
    }

    #[test]
    fn delete_shifts_later_indices() {
        let mut p = profile_with(&["a", "b", "c"]);
        assert!(delete_task(&mut p, "Coding", 0));
        let titles: Vec<_> = p.tasks["Coding"].iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["b", "c"]);
    }

    #[test]
    fn edit_preserves_done() {
        let mut p = profile_with(&["a"]);
        assert!(toggle_done(&mut p, "Coding", 0));
        assert!(edit_task(&mut p, "Coding", 0, "a, renamed", Some("2026-11-01".into())));
        let t = &p.tasks["Coding"][0];
        assert!(t.done);
        assert_eq!(t.title, "a, renamed");
        assert_eq!(t.due_date.as_deref(), Some("2026-11-01"));

        assert!(!edit_task(&mut p, "Coding", 0, "", None));
        assert_eq!(p.tasks["Coding"][0].title, "a, renamed");
    }

    #[test]
    fn invalid_coordinates_are_noops() {
        let mut p = profile_with(&["a"]);
        let before = p.clone();
        assert!(!toggle_done(&mut p, "Coding", 5));
        assert!(!toggle_done(&mut p, "Gardening", 0));
        assert!(!edit_task(&mut p, "Coding", 1, "x", None));
        assert!(!delete_task(&mut p, "Coding", 1));
        assert!(!delete_task(&mut p, "Gardening", 0));
        assert_eq!(p, before);
    }

    #[test]
    fn views_carry_index_and_due_label() {
        let mut p = Profile::default();
        add_task(&mut p, "Coding", "a", Some("2026-10-19".into()), now());
        add_task(&mut p, "Coding", "b", None, now());
        let views = task_views(&p, "Coding", now().date());
        assert_eq!(views.len(), 2);
        assert_eq!(views[1].index, 1);
        assert_eq!(views[0].due_label.as_deref(), Some("🕒 Due Tomorrow"));
        assert_eq!(views[1].due_label, None);
        assert!(task_views(&p, "Missing", now().date()).is_empty());
    }
}
