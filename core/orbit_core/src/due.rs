use chrono::NaiveDate;

pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), DATE_FORMAT).ok()
}

/// Human label for a due date relative to `today`.
///
/// Missing dates yield `None`; a value that does not parse is echoed back unchanged.
pub fn format_due_date(raw: Option<&str>, today: NaiveDate) -> Option<String> {
    let raw = raw?;
    if raw.is_empty() || raw == "None" {
        return None;
    }
    let Some(due) = parse_date(raw) else {
        return Some(raw.to_string());
    };

    let delta = (due - today).num_days();
    let label = match delta {
        d if d < 0 => format!("⚠️ Overdue by {} days", -d),
        0 => "🔥 Due Today!".to_string(),
        1 => "🕒 Due Tomorrow".to_string(),
        2..=7 => format!("⏳ {delta} days left"),
        _ => format!("📅 {}", due.format("%b %d")),
    };
    Some(label)
}
