//! Telegram MarkdownV2 rendering for alerts, reports and command replies.

use chrono::{DateTime, Duration, Utc};
use monitor_core::{ClassificationResult, Post, ReportMode, RunState};
use state_store::ReportData;

pub const MAX_TITLE_CHARS: usize = 150;
const MAX_KEYWORDS: usize = 5;
const MAX_COMPETITORS: usize = 3;
const RULE: &str = "\\=\\=\\=\\=\\=\\=\\=\\=\\=\\=\\=\\=\\=\\=\\=\\=\\=\\=\\=\\=";

const RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!', '\\',
];

pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 8);
    for c in text.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Inside `(...)` of an inline link only `)` and `\` need escaping.
fn escape_link_target(url: &str) -> String {
    url.replace('\\', "\\\\").replace(')', "\\)")
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

/// "just now", "5m ago", "3h ago", "2d ago".
pub fn relative_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let age = now - created_at;
    if age < Duration::minutes(1) {
        "just now".to_string()
    } else if age < Duration::hours(1) {
        format!("{}m ago", age.num_minutes())
    } else if age < Duration::days(1) {
        format!("{}h ago", age.num_hours())
    } else {
        format!("{}d ago", age.num_days())
    }
}

pub fn format_uptime(uptime: Duration) -> String {
    let minutes = uptime.num_minutes().max(0);
    let (days, hours, minutes) = (minutes / 1440, (minutes / 60) % 24, minutes % 60);
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

fn escaped_list(items: &[&str], max: usize) -> String {
    let shown: Vec<String> = items.iter().take(max).map(|i| escape_markdown_v2(i)).collect();
    let mut line = shown.join(", ");
    if items.len() > max {
        line.push_str(&format!(" \\(\\+{} more\\)", items.len() - max));
    }
    line
}

pub fn format_alert(post: &Post, result: &ClassificationResult, now: DateTime<Utc>) -> String {
    let mut header = String::from("🚨 *New Opportunity*");
    if !result.matched_primary.is_empty() {
        header.push_str(" ⭐ *PRIMARY*");
    }
    if result.is_india_relevant {
        header.push_str(" 🇮🇳");
    }

    let mut message = format!(
        "{}\n\n*{}*\n\n📍 r/{} • u/{}\n",
        header,
        escape_markdown_v2(&truncate_chars(&post.title, MAX_TITLE_CHARS)),
        escape_markdown_v2(&post.subreddit),
        escape_markdown_v2(&post.author),
    );

    let keywords = result.matched_keywords();
    if !keywords.is_empty() {
        message.push_str(&format!("🎯 *Keywords:* {}\n", escaped_list(&keywords, MAX_KEYWORDS)));
    }

    let competitors: Vec<&str> = result.matched_competitors.iter().map(String::as_str).collect();
    if !competitors.is_empty() {
        message.push_str(&format!(
            "👁 *Competitors:* {}\n",
            escaped_list(&competitors, MAX_COMPETITORS)
        ));
    }

    message.push_str(&format!(
        "📈 {} points • {} comments • {}\n\n[Open post]({})",
        escape_markdown_v2(&post.score.to_string()),
        post.num_comments,
        escape_markdown_v2(&relative_age(post.created_at, now)),
        escape_link_target(&post.url),
    ));
    message
}

pub fn format_report(report: &ReportData, generated_at: DateTime<chrono::Local>) -> String {
    let title = match report.mode {
        ReportMode::India => "India Report",
        ReportMode::Global => "Global Report",
    };
    let mut message = format!(
        "📊 *Daily {} {}*\n{}\n\n",
        title,
        escape_markdown_v2(&report.date.format("%Y-%m-%d").to_string()),
        RULE
    );

    message.push_str(&format!("*Total Opportunities:* {}\n", report.total_matches));
    message.push_str(&format!("• High\\-Priority: {}\n", report.primary_matches));
    if report.mode == ReportMode::Global {
        message.push_str(&format!("• India\\-Related: {}\n", report.india_matches));
        message.push_str(&format!("• Global: {}\n", report.global_matches));
    }
    message.push_str(&format!(
        "• Filtered: {} spam, {} competitor communities\n\n",
        report.filtered_spam, report.filtered_competitor_community
    ));

    let sections = [
        ("🎯 Top Keywords", &report.top_keywords),
        ("👁 Competitor Mentions", &report.top_competitors),
    ];
    for (heading, entries) in sections {
        if entries.is_empty() {
            continue;
        }
        message.push_str(&format!("*{}:*\n", heading));
        for (name, count) in entries {
            message.push_str(&format!(" • {}: {}\n", escape_markdown_v2(name), count));
        }
        message.push('\n');
    }

    message.push_str(RULE);
    message.push_str(&format!(
        "\n_Report generated at {}_",
        escape_markdown_v2(&generated_at.format("%H:%M").to_string())
    ));
    message
}

/// Snapshot of everything `/status` shows.
#[derive(Debug, Clone)]
pub struct StatusView {
    pub run_state: RunState,
    pub mode: ReportMode,
    pub uptime: Duration,
    pub last_command: Option<String>,
    pub matches_today: u64,
    pub seen_posts: usize,
    pub primary_keywords: usize,
    pub secondary_keywords: usize,
    pub windows: usize,
}

pub fn format_status(view: &StatusView) -> String {
    let state = match view.run_state {
        RunState::Running => "🟢 Running",
        RunState::Paused => "🔴 Stopped",
    };
    let mut message = format!(
        "📊 *Monitor Status*\n\n*Status:* {}\n*Report mode:* {}\n*Uptime:* {}\n",
        state,
        view.mode,
        format_uptime(view.uptime)
    );
    if let Some(command) = &view.last_command {
        message.push_str(&format!("*Last Command:* /{}\n", escape_markdown_v2(command)));
    }
    message.push_str(&format!(
        "*Matches today:* {}\n*Posts seen:* {}\n*Keywords:* {} primary, {} secondary in {} windows\n\n",
        view.matches_today,
        view.seen_posts,
        view.primary_keywords,
        view.secondary_keywords,
        view.windows
    ));
    match view.run_state {
        RunState::Running => message.push_str("Send /stop to pause"),
        RunState::Paused => message.push_str("Send /start to resume"),
    }
    message
}

pub fn format_help() -> String {
    [
        "🤖 *Opportunity Monitor Commands*",
        "",
        "/start \\- Resume monitoring and send today's report",
        "/stop \\- Pause monitoring",
        "/status \\- Show current status",
        "/india \\- Switch to India reports and show one",
        "/global \\- Switch to global reports and show one",
        "/help \\- Show this message",
    ]
    .join("\n")
}

pub fn format_usage_hint(text: &str) -> String {
    format!(
        "❓ Unknown command: {}\nSend /help for the list of commands\\.",
        escape_markdown_v2(&truncate_chars(text, 64))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};
    use std::collections::BTreeSet;

    fn post(title: &str) -> Post {
        Post {
            id: "reddit_abc".to_string(),
            title: title.to_string(),
            body: String::new(),
            subreddit: "Crypto_India".to_string(),
            author: "some.user".to_string(),
            url: "https://www.reddit.com/r/x/comments/abc/t_(1)/".to_string(),
            score: -2,
            num_comments: 7,
            created_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_escape_markdown_v2() {
        assert_eq!(escape_markdown_v2("a.b-c!"), "a\\.b\\-c\\!");
        assert_eq!(escape_markdown_v2("[x](y)"), "\\[x\\]\\(y\\)");
        assert_eq!(escape_markdown_v2("plain"), "plain");
    }

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 8), "abcde...");
        assert_eq!(truncate_chars("ééééé", 4).chars().count(), 4);
    }

    #[test]
    fn test_relative_age() {
        let now = Utc.with_ymd_and_hms(2025, 3, 2, 12, 0, 0).unwrap();
        assert_eq!(relative_age(now - Duration::seconds(20), now), "just now");
        assert_eq!(relative_age(now - Duration::minutes(5), now), "5m ago");
        assert_eq!(relative_age(now - Duration::hours(3), now), "3h ago");
        assert_eq!(relative_age(now - Duration::days(2), now), "2d ago");
    }

    #[test]
    fn test_alert_lists_are_capped() {
        let result = ClassificationResult {
            matched_primary: set(&["bitcoin"]),
            matched_secondary: set(&["a", "b", "c", "d", "e", "f"]),
            matched_competitors: set(&["Binance", "Crypto.com", "Kraken", "OKX"]),
            is_india_relevant: true,
            ..Default::default()
        };
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let alert = format_alert(&post(&"x".repeat(200)), &result, now);

        assert!(alert.contains("*PRIMARY*"));
        assert!(alert.contains("🇮🇳"));
        assert!(alert.contains("bitcoin, a, b, c, d \\(\\+2 more\\)"));
        assert!(alert.contains("Binance, Crypto\\.com, Kraken \\(\\+1 more\\)"));
        assert!(alert.contains(&format!("*{}\\.\\.\\.*", "x".repeat(147))));
        assert!(alert.contains("r/Crypto\\_India"));
        assert!(alert.contains("\\-2 points • 7 comments • 2h ago"));
        assert!(alert.ends_with("(https://www.reddit.com/r/x/comments/abc/t_(1\\)/)"));
    }

    #[test]
    fn test_report_rendering() {
        let report = ReportData {
            date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            mode: ReportMode::Global,
            total_matches: 4,
            primary_matches: 2,
            india_matches: 1,
            global_matches: 3,
            top_keywords: vec![("bitcoin".to_string(), 3)],
            top_competitors: Vec::new(),
            filtered_spam: 5,
            filtered_competitor_community: 1,
        };
        let at = chrono::Local.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let text = format_report(&report, at);

        assert!(text.contains("Daily Global Report 2025\\-03\\-01"));
        assert!(text.contains("*Total Opportunities:* 4"));
        assert!(text.contains(" • bitcoin: 3"));
        assert!(!text.contains("Competitor Mentions"));
        assert!(text.contains("Filtered: 5 spam, 1 competitor communities"));
        assert!(text.ends_with("_Report generated at 09:30_"));
    }

    #[test]
    fn test_uptime_formatting() {
        assert_eq!(format_uptime(Duration::minutes(5)), "5m");
        assert_eq!(format_uptime(Duration::minutes(125)), "2h 5m");
        assert_eq!(format_uptime(Duration::minutes(1500)), "1d 1h 0m");
    }
}
