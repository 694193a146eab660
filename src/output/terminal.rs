// Colored terminal output for feeds, hook tasks and push results.
//
// `describe` turns a stored action into a display structure without any
// terminal concerns; the display_* functions print it with colors.

use colored::Colorize;

use crate::activity::action::{Action, ActionType};
use crate::db::models::HookTask;
use crate::pipeline::PushReport;

/// Characters of a commit message shown per line.
const MESSAGE_WIDTH: usize = 72;

/// One rendered feed entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedLine {
    /// e.g. "pushed to main at"
    pub headline: String,
    /// Repository path or issue locator the headline points at.
    pub target: String,
    /// Extra lines such as pushed commits.
    pub details: Vec<String>,
}

/// Interpret an action's content according to its type.
pub fn describe(action: &Action) -> FeedLine {
    let repo = action.repo_path();
    let issue_target = || match action.issue_infos() {
        Some((index, _)) => format!("{}#{index}", action.repo_path()),
        None => action.repo_path(),
    };
    let issue_title = || {
        action
            .issue_infos()
            .map(|(_, title)| vec![super::summary_line(title, MESSAGE_WIDTH)])
            .unwrap_or_default()
    };

    match action.op_type {
        ActionType::CreateRepo => line("created repository", repo, vec![]),
        ActionType::RenameRepo => line(
            &format!("renamed repository from {} to", action.content),
            repo,
            vec![],
        ),
        ActionType::StarRepo => line("starred", repo, vec![]),
        ActionType::FollowRepo => line("is watching", repo, vec![]),
        ActionType::CommitRepo => {
            let mut details = Vec::new();
            if let Ok(batch) = action.push_commits() {
                for c in &batch.commits {
                    let short = c.sha1.get(..10).unwrap_or(&c.sha1);
                    details.push(format!("{short} {}", super::summary_line(&c.message, MESSAGE_WIDTH)));
                }
                if batch.len > batch.commits.len() {
                    details.push(format!("{} more commits", batch.len - batch.commits.len()));
                }
            }
            line(&format!("pushed to {} at", action.ref_name), repo, details)
        }
        ActionType::PushTag => line(&format!("pushed tag {} to", action.ref_name), repo, vec![]),
        ActionType::CreateIssue => line("opened issue", issue_target(), issue_title()),
        ActionType::CreatePullRequest => line("created pull request", issue_target(), issue_title()),
        ActionType::CommentIssue => line("commented on issue", issue_target(), issue_title()),
        ActionType::MergePullRequest => line("merged pull request", issue_target(), issue_title()),
        ActionType::TransferRepo => line(
            &format!("transferred repository {} to", action.content),
            repo,
            vec![],
        ),
    }
}

fn line(headline: &str, target: String, details: Vec<String>) -> FeedLine {
    FeedLine {
        headline: headline.to_string(),
        target,
        details,
    }
}

/// Display one page of a user's feed.
pub fn display_feed(actions: &[Action]) {
    if actions.is_empty() {
        println!("No activity yet. Push something with `pushfeed push`.");
        return;
    }

    println!("\n{}", format!("=== Feed ({} entries) ===", actions.len()).bold());
    println!();

    for action in actions {
        let entry = describe(action);
        let lock = if action.is_private { " [private]".yellow().to_string() } else { String::new() };
        println!(
            "  {} {} {} {}{}",
            action.created.dimmed(),
            action.act_user_name.cyan().bold(),
            entry.headline,
            entry.target.bold(),
            lock,
        );
        for detail in &entry.details {
            println!("      {}", detail.dimmed());
        }
    }
    println!();
}

/// Display queued webhook tasks.
pub fn display_hook_tasks(tasks: &[HookTask]) {
    if tasks.is_empty() {
        println!("No webhook tasks queued.");
        return;
    }

    println!("\n{}", format!("=== Hook tasks ({}) ===", tasks.len()).bold());
    println!();
    println!(
        "  {:>5}  {:>6}  {:<8}  {}",
        "Id".dimmed(),
        "Repo".dimmed(),
        "Event".dimmed(),
        "Queued".dimmed(),
    );
    println!("  {}", "-".repeat(48).dimmed());
    for task in tasks {
        println!(
            "  {:>5}  {:>6}  {:<8}  {}",
            task.id,
            task.repo_id,
            colorize_event(&task.event),
            task.created,
        );
    }
    println!();
}

/// Display what one push did.
pub fn display_push_report(report: &PushReport) {
    println!(
        "{} {} {} ({} feed rows)",
        "Recorded".green().bold(),
        report.op_type,
        report.ref_name.bold(),
        report.recipients,
    );

    let issues = &report.issues;
    if !issues.is_empty() {
        println!(
            "  Issues: {} referenced, {} closed, {} reopened",
            issues.referenced.len(),
            issues.closed.len(),
            issues.reopened.len(),
        );
    }
    if let Some(err) = &report.issue_error {
        println!("  {} issue linking stopped: {}", "!".yellow(), err);
    }

    let hooks: Vec<&str> = report.hooks_submitted.iter().map(|h| h.as_str()).collect();
    if !hooks.is_empty() {
        println!("  Webhooks queued: {}", hooks.join(", "));
    }
    for err in &report.hook_errors {
        println!("  {} webhook failed: {}", "!".red(), err);
    }
}

fn colorize_event(event: &str) -> colored::ColoredString {
    match event {
        "push" => event.green(),
        "create" => event.blue(),
        _ => event.dimmed(),
    }
}
