//! Rendering reports for the chat and the spreadsheet

use crate::report::Report;

fn entity(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        '"' => Some("&quot;"),
        _ => None,
    }
}

/// Escape text for Telegram's HTML parse mode
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match entity(c) {
            Some(e) => escaped.push_str(e),
            None => escaped.push(c),
        }
    }
    escaped
}

/// Escape text, cutting the plain text so the result is at most `max_chars`
///
/// The cut never splits an entity. A shortened result ends with an ellipsis.
pub fn escape_html_truncated(text: &str, max_chars: usize) -> String {
    let escaped = escape_html(text);
    if escaped.chars().count() <= max_chars {
        return escaped;
    }
    if max_chars == 0 {
        return String::new();
    }

    let budget = max_chars - 1;
    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let piece = entity(c);
        let width = piece.map_or(1, str::len);
        if used + width > budget {
            break;
        }
        match piece {
            Some(e) => out.push_str(e),
            None => out.push(c),
        }
        used += width;
    }
    out.push('…');
    out
}

fn reporter(report: &Report) -> String {
    let name = if report.user_name.is_empty() {
        format!("id {}", report.user_id)
    } else {
        report.user_name.clone()
    };
    match &report.username {
        Some(username) => format!("{name} (@{username})"),
        None => name,
    }
}

/// HTML announcement for a new report, at most `max_chars` long
///
/// Only the description is shortened; the header and the id footer are kept.
pub fn report_message(report: &Report, max_chars: usize) -> String {
    let mut head = vec![
        "<b>New incident report</b>".to_string(),
        format!("<b>Category:</b> {}", escape_html(&report.category)),
    ];
    if !report.location.is_empty() {
        head.push(format!("<b>Location:</b> {}", escape_html(&report.location)));
    }
    head.push(format!("<b>Reported by:</b> {}", escape_html(&reporter(report))));
    head.push(format!(
        "<b>Time:</b> {}",
        report.created_at.format("%Y-%m-%d %H:%M UTC")
    ));
    head.push(String::new());

    let mut tail = Vec::new();
    if !report.photos.is_empty() {
        tail.push(String::new());
        tail.push(format!("Photos: {}", report.photos.len()));
    }
    tail.push(format!("<i>ID: {}</i>", report.id));

    let head = head.join("\n");
    let tail = tail.join("\n");
    // Two newlines join the description to head and tail
    let fixed = head.chars().count() + tail.chars().count() + 2;
    let description = escape_html_truncated(&report.description, max_chars.saturating_sub(fixed));
    format!("{head}\n{description}\n{tail}")
}

/// Spreadsheet row for a report; column A is always the id
pub fn sheet_row(report: &Report) -> Vec<String> {
    vec![
        report.id.clone(),
        report.created_at.to_rfc3339(),
        report.user_id.to_string(),
        report.user_name.clone(),
        report.username.clone().unwrap_or_default(),
        report.category.clone(),
        report.location.clone(),
        report.description.clone(),
        report.status.to_string(),
        report.photos.join("\n"),
    ]
}
