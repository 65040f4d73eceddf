//! Advisory prompt-quality heuristics. Findings are logged by callers and
//! never block a request: they flag content quality, not protocol
//! violations.

const LONG_PROMPT_CHARS: usize = 1500;

const CONFLICTING_TAG_PAIRS: [(&str, &str); 4] = [
    ("from above", "from below"),
    ("from behind", "from side"),
    ("close-up", "wide shot"),
    ("day", "night"),
];

/// Scans a prompt and returns zero or more human-readable warnings.
pub fn review(prompt: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    let lowered = prompt.to_lowercase();

    if prompt.chars().count() > LONG_PROMPT_CHARS {
        warnings.push(format!(
            "prompt is over {LONG_PROMPT_CHARS} characters; trailing tags may carry little weight"
        ));
    }

    if count_char(prompt, '{') != count_char(prompt, '}') {
        warnings.push("unbalanced {} emphasis braces".to_string());
    }
    if count_char(prompt, '[') != count_char(prompt, ']') {
        warnings.push("unbalanced [] de-emphasis brackets".to_string());
    }

    let tags: Vec<String> = lowered
        .split(',')
        .map(|tag| {
            tag.trim()
                .trim_matches(|c: char| matches!(c, '{' | '}' | '[' | ']'))
                .to_string()
        })
        .filter(|tag| !tag.is_empty())
        .collect();
    for (index, tag) in tags.iter().enumerate() {
        if tags[..index].contains(tag) {
            warnings.push(format!("redundant tag '{tag}'"));
        }
    }

    for (left, right) in CONFLICTING_TAG_PAIRS {
        if tags.iter().any(|tag| tag == left) && tags.iter().any(|tag| tag == right) {
            warnings.push(format!("conflicting spatial tags '{left}' and '{right}'"));
        }
    }

    warnings
}

fn count_char(text: &str, needle: char) -> usize {
    text.chars().filter(|c| *c == needle).count()
}
