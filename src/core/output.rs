//! Bounded terminal rendering for gate summaries.
//!
//! Problem strings can embed whole pytest transcripts; the verbose summary
//! line must stay short and newline-free.

/// Flatten a problem onto one line and truncate it to `max_chars`.
pub fn one_line(problem: &str, max_chars: usize) -> String {
    let mut flat = String::new();
    for word in problem.split_whitespace() {
        if !flat.is_empty() {
            flat.push(' ');
        }
        flat.push_str(word);
    }
    match flat.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

/// Preview the first `max_items` problems on a single bounded line.
pub fn preview_problems(problems: &[String], max_items: usize, max_chars: usize) -> String {
    let shown: Vec<String> = problems
        .iter()
        .take(max_items)
        .map(|p| one_line(p, max_chars))
        .collect();
    let mut line = shown.join("; ");
    if problems.len() > max_items {
        line.push_str(&format!(" (and {} more)", problems.len() - max_items));
    }
    line
}
