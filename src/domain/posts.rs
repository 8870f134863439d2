//! Pure helpers used when composing a post.

const DESCRIPTION_MAX_CHARS: usize = 160;

/// Split comma-separated tag input into trimmed, non-empty, de-duplicated labels.
pub fn parse_tags(input: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in input.split(',').map(str::trim).filter(|tag| !tag.is_empty()) {
        if !tags.iter().any(|existing| existing == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}

/// Markdown reference inserted into the body for a pasted image.
pub fn image_markdown(url: &str) -> String {
    format!("![image]({url})")
}

/// Append an image reference to the end of a body, on its own line.
pub fn append_image_reference(body: &str, url: &str) -> String {
    let reference = image_markdown(url);
    if body.is_empty() {
        reference
    } else {
        format!("{body}\n{reference}")
    }
}

/// Plain-text description taken from the first prose paragraph of a markdown body.
///
/// Headings, image lines, block quotes and fenced code are skipped. Output is
/// truncated on a character boundary with a trailing ellipsis.
pub fn summarize_description(markdown: &str) -> String {
    let mut in_fence = false;
    let mut paragraph: Vec<&str> = Vec::new();

    for line in markdown.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        if trimmed.is_empty() {
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }
        if trimmed.starts_with('#') || trimmed.starts_with("![") || trimmed.starts_with('>') {
            if !paragraph.is_empty() {
                break;
            }
            continue;
        }
        paragraph.push(trimmed);
    }

    let text = strip_inline_markup(&paragraph.join(" "));
    truncate_chars(&text, DESCRIPTION_MAX_CHARS)
}

fn strip_inline_markup(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' | '_' | '`' | '~' => {}
            '[' => {
                let mut label = String::new();
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    label.push(inner);
                }
                if chars.peek() == Some(&'(') {
                    for inner in chars.by_ref() {
                        if inner == ')' {
                            break;
                        }
                    }
                }
                output.push_str(&label);
            }
            other => output.push(other),
        }
    }
    output.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max.saturating_sub(1)).collect();
    truncated = truncated.trim_end().to_string();
    truncated.push('…');
    truncated
}
