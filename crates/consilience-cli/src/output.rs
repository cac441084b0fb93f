use consilience_core::types::{QueuedResponse, ResponseOrigin};
use serde::Serialize;

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  ").trim_end());

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

/// First line of `text`, cut to `max` characters.
pub fn one_line(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    match line.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &line[..cut]),
        None => line.to_string(),
    }
}

fn origin_label(origin: ResponseOrigin) -> &'static str {
    match origin {
        ResponseOrigin::Trigger => "trigger",
        ResponseOrigin::Clarification => "clarification",
        ResponseOrigin::FactualError => "factual_error",
        ResponseOrigin::StuckSignal => "stuck_signal",
    }
}

/// The lane table shared by `run`, `lanes` and `drain`.
pub fn print_responses<'a>(responses: impl IntoIterator<Item = &'a QueuedResponse>) {
    let rows: Vec<Vec<String>> = responses
        .into_iter()
        .map(|r| {
            vec![
                r.priority.to_string(),
                r.enqueued_at.format("%H:%M:%S").to_string(),
                origin_label(r.origin).to_string(),
                r.domains.join(", "),
                one_line(&r.text, 72),
            ]
        })
        .collect();
    if rows.is_empty() {
        println!("No queued responses.");
        return;
    }
    print_table(&["LANE", "QUEUED", "ORIGIN", "DOMAINS", "TEXT"], rows);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_line_keeps_first_line_and_cuts() {
        assert_eq!(one_line("first\nsecond", 72), "first");
        assert_eq!(one_line("abcdef", 3), "abc…");
        assert_eq!(one_line("", 3), "");
    }
}
