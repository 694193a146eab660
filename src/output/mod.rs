// Output formatting — terminal rendering of feeds, hook queues and push
// results. Nothing in here is used by the pipeline itself.

pub mod terminal;

/// First line of `text`, cut to `max_chars` characters with "..." appended
/// when anything was dropped.
pub fn summary_line(text: &str, max_chars: usize) -> String {
    let mut lines = text.lines();
    let first = lines.next().unwrap_or("").trim_end();
    let more_lines = lines.next().is_some();

    if first.chars().count() <= max_chars {
        if more_lines {
            format!("{first}...")
        } else {
            first.to_string()
        }
    } else {
        let truncated: String = first.chars().take(max_chars).collect();
        format!("{truncated}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_line_keeps_short_text() {
        assert_eq!(summary_line("fix #1", 20), "fix #1");
    }

    #[test]
    fn test_summary_line_marks_dropped_lines() {
        assert_eq!(summary_line("subject\n\nbody", 20), "subject...");
    }

    #[test]
    fn test_summary_line_respects_char_boundaries() {
        assert_eq!(summary_line("héllo wörld", 4), "héll...");
    }
}
