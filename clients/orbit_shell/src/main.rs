use chrono::NaiveDate;
use clap::Parser;
use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tracing::{error, info};

mod client;
mod commands;
mod session;
mod timer;

use client::{CoreClient, HomeView, TaskView};
use commands::{parse_line, Cmd};
use session::{PinnedTask, Session};

#[derive(Parser, Debug)]
#[command(name = "orbit_shell", version)]
struct Args {
    /// Core base URL, e.g. http://127.0.0.1:17700
    #[arg(long, default_value = "http://127.0.0.1:17700")]
    core_url: String,

    /// Start logged in as this user (same as typing `login <name>` without
    /// running the briefing check).
    #[arg(long)]
    user: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orbit_shell=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let core = CoreClient::new(&args.core_url)?;
    if let Err(e) = core.health().await {
        error!("core not reachable at {}: {e:#}", args.core_url);
    }

    let mut session = Session::default();
    if let Some(user) = args.user.as_deref() {
        match core.home(user).await {
            Ok(home) => {
                session.login(&home.user);
                print_home(&home, &session);
            }
            Err(e) => error!("deep link for '{user}' failed: {e:#}"),
        }
    } else {
        println!("Orbit - your tasks revolve around you. Type `login <name>` or `help`.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        prompt(&session);
        let ctrl_c = async {
            let _ = tokio::signal::ctrl_c().await;
        };
        let Some(line) = read_line(&mut lines, ctrl_c).await? else {
            println!();
            break;
        };
        let cmd = match parse_line(&line) {
            Ok(Some(l)) => l.cmd,
            Ok(None) => continue,
            Err(e) => {
                println!("{e}");
                continue;
            }
        };
        if cmd == Cmd::Quit {
            break;
        }
        if let Err(e) = run(&core, &mut session, cmd).await {
            println!("error: {e:#}");
        }
    }
    info!("bye");
    Ok(())
}

/// Next prompt line, or None on end of input or when `interrupt` fires first.
/// The focus timer installs a Ctrl-C handler, so SIGINT no longer ends the
/// process on its own; the prompt has to watch for it.
async fn read_line<R: AsyncBufRead + Unpin>(
    lines: &mut Lines<R>,
    interrupt: impl Future<Output = ()>,
) -> anyhow::Result<Option<String>> {
    tokio::select! {
        line = lines.next_line() => Ok(line?),
        _ = interrupt => Ok(None),
    }
}

fn prompt(session: &Session) {
    match session.user.as_deref() {
        Some(user) => print!("orbit:{user}> "),
        None => print!("orbit> "),
    }
    let _ = std::io::stdout().flush();
}

async fn run(core: &CoreClient, session: &mut Session, cmd: Cmd) -> anyhow::Result<()> {
    match cmd {
        Cmd::Login { name } => {
            let home = core.login(&name).await?;
            session.login(&home.user);
            print_home(&home, session);
        }
        Cmd::Logout => {
            session.logout();
            println!("Logged out.");
        }
        Cmd::Home => {
            let home = core.home(session.user()?).await?;
            print_home(&home, session);
        }
        Cmd::Check => {
            let home = core.check_briefing(session.user()?).await?;
            print_home(&home, session);
        }
        Cmd::Interests { list } => {
            let home = core.set_interests(session.user()?, &list.join(" ")).await?;
            println!("Interests: {}", home.interests_raw);
            print_categories(&home.interests);
        }
        Cmd::Fact => {
            let fact = core.fact(session.user()?).await?;
            session.random_fact = fact;
            println!("🎲 {}", session.random_fact.trim());
        }
        Cmd::Tasks { category: Some(category) } => {
            let list = core.tasks(session.user()?, &category).await?;
            print_tasks(&list.category, &list.tasks, session);
        }
        Cmd::Tasks { category: None } => {
            let user = session.user()?;
            let home = core.home(user).await?;
            let all = core.all_tasks(user).await?;
            for category in &home.interests {
                print_tasks(category, all.get(category).map(Vec::as_slice).unwrap_or(&[]), session);
            }
            // Categories dropped from interests keep their tasks.
            for (category, tasks) in all.iter().filter(|(c, _)| !home.interests.contains(*c)) {
                print_tasks(&format!("{category} (not in interests)"), tasks, session);
            }
        }
        Cmd::Add {
            category,
            title,
            due,
        } => {
            let res = core
                .add_task(session.user()?, &category, &title.join(" "), due.as_deref())
                .await?;
            if !res.changed {
                println!("Nothing added.");
            }
            print_tasks(&res.category, &res.tasks, session);
        }
        Cmd::Edit { category, index } => {
            let list = core.tasks(session.user()?, &category).await?;
            let Some(task) = list.tasks.get(index) else {
                anyhow::bail!("no task {index} in {category}");
            };
            println!("Editing: {} (due {})", task.title, task.due_date.as_deref().unwrap_or("none"));
            println!("Use `save <title> [--due YYYY-MM-DD]` or `cancel`.");
            session.edit_target = Some(PinnedTask::new(&category, index, &task.title));
        }
        Cmd::Save { title, due } => {
            let user = session.user()?.to_string();
            let Some(target) = session.edit_target.clone() else {
                anyhow::bail!("nothing to save; pick a task with `edit <category> <index>`");
            };
            let list = core.tasks(&user, &target.task.category).await?;
            if !target.still_in(&list.tasks) {
                session.edit_target = None;
                anyhow::bail!("task being edited moved or was deleted; pick it again");
            }
            let res = core
                .edit_task(
                    &user,
                    &target.task.category,
                    target.task.index,
                    &title.join(" "),
                    due.as_deref(),
                )
                .await?;
            session.edit_target = None;
            if !res.changed {
                println!("Task no longer exists; nothing saved.");
            }
            print_tasks(&res.category, &res.tasks, session);
        }
        Cmd::Cancel => {
            session.edit_target = None;
        }
        Cmd::Done { category, index } => {
            let res = core.toggle_task(session.user()?, &category, index).await?;
            print_tasks(&res.category, &res.tasks, session);
        }
        Cmd::Rm { category, index } => {
            let res = core.delete_task(session.user()?, &category, index).await?;
            if res.changed {
                session.after_delete(&category, index);
            }
            print_tasks(&res.category, &res.tasks, session);
        }
        Cmd::Focus { category, index } => {
            let list = core.tasks(session.user()?, &category).await?;
            let Some(task) = list.tasks.get(index) else {
                anyhow::bail!("no task {index} in {category}");
            };
            session.timer = Some(PinnedTask::new(&category, index, &task.title));
            println!("Focus: {}. Type `start [minutes]` (default {}).", task.title, timer::DEFAULT_MINUTES);
        }
        Cmd::Start { minutes } => {
            let Some(target) = session.timer.clone() else {
                anyhow::bail!("no focus task; pick one with `focus <category> <index>`");
            };
            // The list may have changed since `focus`; check the slot still holds the task.
            let list = core.tasks(session.user()?, &target.task.category).await?;
            if !target.still_in(&list.tasks) {
                session.timer = None;
                anyhow::bail!("focus task moved or was deleted; pick it again");
            }
            if timer::run_countdown(&target.title, minutes).await {
                session.timer = None;
            }
        }
        Cmd::Quit => {}
    }
    Ok(())
}

fn print_home(home: &HomeView, session: &Session) {
    let today = chrono::Local::now().date_naive();
    println!("## {}", home.display_name);
    println!();
    println!("📋 Daily Briefing · {}", today.format("%A, %B %-d"));
    println!("{}", home.briefing.trim());
    if let Some(date) = home.last_briefing_date.as_deref() {
        println!("({})", briefed_note(date, today));
    }
    println!();
    print_categories(&home.interests);
    if !session.random_fact.is_empty() {
        println!("🎲 {}", session.random_fact.trim());
    }
}

/// "briefed today" / "briefed yesterday", else the stored date as is.
fn briefed_note(last: &str, today: NaiveDate) -> String {
    match NaiveDate::parse_from_str(last, "%Y-%m-%d") {
        Ok(d) if d == today => "briefed today".to_string(),
        Ok(d) if today.pred_opt() == Some(d) => "briefed yesterday".to_string(),
        _ => format!("briefed {last}"),
    }
}

fn print_categories(interests: &[String]) {
    if interests.is_empty() {
        println!("No interests set. Use `interests Coding, Fitness`.");
    } else {
        println!("Categories: {}", interests.join(" | "));
    }
}

fn print_tasks(category: &str, tasks: &[TaskView], session: &Session) {
    println!("### {category}");
    if tasks.is_empty() {
        println!("  No tasks pending.");
        return;
    }
    for t in tasks {
        let mark = if t.done { "x" } else { " " };
        let title = if t.done {
            format!("~~{}~~", t.title)
        } else {
            t.title.clone()
        };
        let editing = session
            .edit_target
            .as_ref()
            .is_some_and(|e| e.task.category == category && e.task.index == t.index);
        let due = t.due_label.as_deref().map(|l| format!("  {l}")).unwrap_or_default();
        let flag = if editing { "  [editing]" } else { "" };
        println!("  [{mark}] {}. {title}{due}{flag}", t.index);
    }
}
