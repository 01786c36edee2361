//! Post-conversion cleanup pipeline for Markdown output.
//!
//! Each pass is a `&str -> String` function applied in order. Passes never
//! touch the inside of fenced code blocks except the fence line itself.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Run the full cleanup pipeline on raw Markdown text.
pub(crate) fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let passes: [&dyn Fn(&str) -> String; 6] = [
        &demote_extra_h1,
        &strip_fence_class_prefix,
        &strip_leftover_html,
        &|s: &str| resolve_links(s, base_url),
        &trim_line_ends,
        &collapse_blank_runs,
    ];

    let mut result = md.to_string();
    for pass in passes {
        result = pass(&result);
    }
    let trimmed = result.trim_matches('\n');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

/// Apply `f` to every line that sits outside a fenced code block.
fn map_prose_lines(md: &str, mut f: impl FnMut(&str) -> String) -> String {
    let mut in_fence = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                line.to_string()
            } else if in_fence {
                line.to_string()
            } else {
                f(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Headings
// ---------------------------------------------------------------------------

/// Keep the first H1; later ones become H2.
fn demote_extra_h1(md: &str) -> String {
    let mut seen_h1 = false;
    map_prose_lines(md, |line| match line.strip_prefix("# ") {
        Some(text) if seen_h1 => format!("## {text}"),
        Some(_) => {
            seen_h1 = true;
            line.to_string()
        }
        None => line.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Code fences
// ---------------------------------------------------------------------------

/// ```` ```language-js ```` → ```` ```js ````.
fn strip_fence_class_prefix(md: &str) -> String {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^(\s*)```(?:language-|lang-|highlight-)([\w+#-]+)").expect("valid regex")
    });

    FENCE_RE.replace_all(md, "$1```$2").into_owned()
}

// ---------------------------------------------------------------------------
// Leftover HTML
// ---------------------------------------------------------------------------

/// Remove layout tags that survived conversion, keeping their text.
fn strip_leftover_html(md: &str) -> String {
    static LAYOUT_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary|main)(?:\s[^>]*)?>",
        )
        .expect("valid regex")
    });

    map_prose_lines(md, |line| LAYOUT_TAG_RE.replace_all(line, "").into_owned())
}

// ---------------------------------------------------------------------------
// Links
// ---------------------------------------------------------------------------

/// Resolve relative Markdown link targets against the page URL. Images and
/// in-page anchors are left alone.
fn resolve_links(md: &str, base_url: Option<&Url>) -> String {
    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(!?)\[([^\]]*)\]\(([^)\s]+)\)").expect("valid regex"));

    let Some(base) = base_url else {
        return md.to_string();
    };

    map_prose_lines(md, |line| {
        LINK_RE
            .replace_all(line, |caps: &regex::Captures| {
                let (bang, text, href) = (&caps[1], &caps[2], &caps[3]);
                let keep = !bang.is_empty()
                    || href.starts_with('#')
                    || href.contains("://")
                    || href.starts_with("mailto:")
                    || href.starts_with("tel:");
                if keep {
                    return caps[0].to_string();
                }
                match base.join(href) {
                    Ok(resolved) => format!("[{text}]({resolved})"),
                    Err(_) => caps[0].to_string(),
                }
            })
            .into_owned()
    })
}

// ---------------------------------------------------------------------------
// Whitespace
// ---------------------------------------------------------------------------

fn trim_line_ends(md: &str) -> String {
    md.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

/// At most one blank line between blocks.
fn collapse_blank_runs(md: &str) -> String {
    static BLANK_RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    BLANK_RUN_RE.replace_all(md, "\n\n").into_owned()
}
