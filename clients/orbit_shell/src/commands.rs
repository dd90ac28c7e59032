use clap::{Parser, Subcommand};

use crate::timer::{DEFAULT_MINUTES, MAX_MINUTES};

/// One line typed at the `orbit>` prompt.
#[derive(Parser, Debug)]
#[command(no_binary_name = true, name = "orbit", disable_version_flag = true)]
pub struct Line {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Cmd {
    /// Log in (names are case-insensitive; new names get a fresh profile).
    Login { name: String },
    /// Forget the current user, timer and fact.
    Logout,
    /// Show the daily briefing and interests.
    Home,
    /// Replace interests with a comma-separated list.
    Interests {
        #[arg(required = true, num_args = 1..)]
        list: Vec<String>,
    },
    /// Ask for a random fact about one of your interests.
    Fact,
    /// Run the daily briefing check now.
    Check,
    /// List tasks in a category, or every category.
    Tasks { category: Option<String> },
    /// Add a task: add <category> <title...> [--due YYYY-MM-DD]
    Add {
        category: String,
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
        #[arg(long)]
        due: Option<String>,
    },
    /// Pick a task to edit, then use `save`.
    Edit { category: String, index: usize },
    /// Save the task picked with `edit`: save <title...> [--due YYYY-MM-DD]
    Save {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
        #[arg(long)]
        due: Option<String>,
    },
    /// Drop the pending edit.
    Cancel,
    /// Toggle a task's done flag.
    Done { category: String, index: usize },
    /// Delete a task (later tasks move up one position).
    Rm { category: String, index: usize },
    /// Pick a task for the focus timer.
    Focus { category: String, index: usize },
    /// Start the focus countdown (Ctrl-C stops it).
    Start {
        #[arg(
            default_value_t = DEFAULT_MINUTES,
            value_parser = clap::value_parser!(u64).range(1..=MAX_MINUTES)
        )]
        minutes: u64,
    },
    /// Leave the shell (Ctrl-C or end of input at the prompt does too).
    #[command(alias = "exit")]
    Quit,
}

/// Splits a prompt line into words; single or double quotes group words.
pub fn split_words(line: &str) -> anyhow::Result<Vec<String>> {
    let mut words = Vec::new();
    let mut cur = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => cur.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut cur));
                    in_word = false;
                }
            }
            None => {
                cur.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        anyhow::bail!("unterminated quote");
    }
    if in_word {
        words.push(cur);
    }
    Ok(words)
}

pub fn parse_line(line: &str) -> anyhow::Result<Option<Line>> {
    let words = split_words(line)?;
    if words.is_empty() {
        return Ok(None);
    }
    Line::try_parse_from(words)
        .map(Some)
        .map_err(|e| anyhow::anyhow!("{}", e.render()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(line: &str) -> Cmd {
        parse_line(line).unwrap().unwrap().cmd
    }

    #[test]
    fn quotes_group_words() {
        assert_eq!(
            split_words(r#"add "Machine Learning" read 'the paper'"#).unwrap(),
            vec!["add", "Machine Learning", "read", "the paper"]
        );
        assert_eq!(split_words(r#"interests """#).unwrap(), vec!["interests", ""]);
        assert!(split_words("add \"oops").is_err());
        assert!(split_words("   ").unwrap().is_empty());
    }

    #[test]
    fn add_collects_title_and_due() {
        assert_eq!(
            cmd("add Coding Buy milk --due 2026-10-18"),
            Cmd::Add {
                category: "Coding".into(),
                title: vec!["Buy".into(), "milk".into()],
                due: Some("2026-10-18".into()),
            }
        );
    }

    #[test]
    fn start_minutes_are_bounded() {
        assert_eq!(cmd("start"), Cmd::Start { minutes: 25 });
        assert_eq!(cmd("start 120"), Cmd::Start { minutes: 120 });
        assert!(parse_line("start 0").is_err());
        assert!(parse_line("start 121").is_err());
    }

    #[test]
    fn misc_commands() {
        assert_eq!(cmd("exit"), Cmd::Quit);
        assert_eq!(cmd("tasks"), Cmd::Tasks { category: None });
        assert_eq!(
            cmd("rm Fitness 2"),
            Cmd::Rm {
                category: "Fitness".into(),
                index: 2
            }
        );
        assert!(parse_line("rm Fitness two").is_err());
        assert!(parse_line("").unwrap().is_none());
    }
}
