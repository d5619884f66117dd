//! Markdown → HTML for model answers.
//!
//! All text is HTML-escaped before any markup is produced, so nothing in the
//! input can inject tags. Fenced code blocks and inline code are lifted out into
//! placeholders first and restored last; later rules never see their contents.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static FENCED_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?ms)^```([A-Za-z0-9_+-]*)[ \t]*\n(.*?)^```[ \t]*$").expect("valid regex")
});
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`([^`\n]+)`").expect("valid regex"));
static HEADING: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(#{1,6})[ \t]+(.+?)(?:[ \t]+#+)?[ \t]*$").expect("valid regex"));
static BOLD_STARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.+?)\*\*").expect("valid regex"));
static BOLD_UNDERSCORES: Lazy<Regex> = Lazy::new(|| Regex::new(r"__(.+?)__").expect("valid regex"));
static ITALIC_STAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*([^*\n]+)\*").expect("valid regex"));
static ITALIC_UNDERSCORE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b_([^_\n]+)_\b").expect("valid regex"));
static UNORDERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*[-*+][ \t]+(.*)$").expect("valid regex"));
static ORDERED_ITEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*\d+[.)][ \t]+(.*)$").expect("valid regex"));
static TABLE_SEPARATOR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\|?\s*:?-{3,}:?\s*(\|\s*:?-{3,}:?\s*)*\|?\s*$").expect("valid regex")
});
static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x00([BI])(\d+)\x00").expect("valid regex"));

/// Escapes the five HTML special characters.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Renders markdown to an HTML fragment.
pub fn render_markdown(input: &str) -> String {
    let normalized: String = input.chars().filter(|c| *c != '\r' && *c != '\0').collect();
    let escaped = escape_html(&normalized);

    let mut blocks: Vec<String> = Vec::new();
    let lifted = FENCED_CODE.replace_all(&escaped, |caps: &Captures| {
        let lang = &caps[1];
        let code = caps[2].trim_end_matches('\n');
        let html = if lang.is_empty() {
            format!("<pre><code>{code}</code></pre>")
        } else {
            format!("<pre><code class=\"language-{lang}\">{code}</code></pre>")
        };
        blocks.push(html);
        format!("\x00B{}\x00", blocks.len() - 1)
    });

    let mut inlines: Vec<String> = Vec::new();
    let lifted = INLINE_CODE.replace_all(&lifted, |caps: &Captures| {
        inlines.push(format!("<code>{}</code>", &caps[1]));
        format!("\x00I{}\x00", inlines.len() - 1)
    });

    let html = render_blocks(&lifted);

    PLACEHOLDER
        .replace_all(&html, |caps: &Captures| {
            let index: usize = caps[2].parse().unwrap_or(usize::MAX);
            let source = if &caps[1] == "B" { &blocks } else { &inlines };
            source.get(index).cloned().unwrap_or_default()
        })
        .into_owned()
}

fn render_blocks(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let mut out: Vec<String> = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() {
            flush_paragraph(&mut paragraph, &mut out);
            i += 1;
            continue;
        }

        if is_block_placeholder(trimmed) {
            flush_paragraph(&mut paragraph, &mut out);
            out.push(trimmed.to_string());
            i += 1;
            continue;
        }

        if let Some(caps) = HEADING.captures(trimmed) {
            flush_paragraph(&mut paragraph, &mut out);
            let level = caps[1].len();
            out.push(format!("<h{level}>{}</h{level}>", render_inline(&caps[2])));
            i += 1;
            continue;
        }

        if is_table_start(&lines, i) {
            flush_paragraph(&mut paragraph, &mut out);
            let header = split_row(lines[i]);
            let mut body = Vec::new();
            i += 2;
            while i < lines.len() && lines[i].contains('|') && !lines[i].trim().is_empty() {
                body.push(split_row(lines[i]));
                i += 1;
            }
            out.push(render_table(&header, &body));
            continue;
        }

        if UNORDERED_ITEM.is_match(line) {
            flush_paragraph(&mut paragraph, &mut out);
            i = render_list(&lines, i, &UNORDERED_ITEM, "ul", &mut out);
            continue;
        }

        if ORDERED_ITEM.is_match(line) {
            flush_paragraph(&mut paragraph, &mut out);
            i = render_list(&lines, i, &ORDERED_ITEM, "ol", &mut out);
            continue;
        }

        paragraph.push(render_inline(trimmed));
        i += 1;
    }
    flush_paragraph(&mut paragraph, &mut out);

    out.join("\n")
}

fn flush_paragraph(paragraph: &mut Vec<String>, out: &mut Vec<String>) {
    if !paragraph.is_empty() {
        out.push(format!("<p>{}</p>", paragraph.join("<br>")));
        paragraph.clear();
    }
}

fn is_block_placeholder(line: &str) -> bool {
    line.starts_with("\x00B") && line.ends_with('\x00') && line.matches('\x00').count() == 2
}

/// Consumes consecutive items matching `pattern` and returns the next line index.
fn render_list(lines: &[&str], start: usize, pattern: &Regex, tag: &str, out: &mut Vec<String>) -> usize {
    let mut items = String::new();
    let mut i = start;
    while i < lines.len() {
        match pattern.captures(lines[i]) {
            Some(caps) => {
                items.push_str(&format!("<li>{}</li>", render_inline(caps[1].trim())));
                i += 1;
            }
            None => break,
        }
    }
    out.push(format!("<{tag}>{items}</{tag}>"));
    i
}

fn is_table_start(lines: &[&str], i: usize) -> bool {
    i + 2 < lines.len()
        && lines[i].contains('|')
        && TABLE_SEPARATOR.is_match(lines[i + 1])
        && lines[i + 1].contains('|')
        && lines[i + 2].contains('|')
}

fn split_row(line: &str) -> Vec<String> {
    let trimmed = line.trim();
    let trimmed = trimmed.strip_prefix('|').unwrap_or(trimmed);
    let trimmed = trimmed.strip_suffix('|').unwrap_or(trimmed);
    trimmed.split('|').map(|cell| render_inline(cell.trim())).collect()
}

fn render_table(header: &[String], body: &[Vec<String>]) -> String {
    let mut html = String::from("<table><thead><tr>");
    for cell in header {
        html.push_str(&format!("<th>{cell}</th>"));
    }
    html.push_str("</tr></thead><tbody>");
    for row in body {
        html.push_str("<tr>");
        for cell in row {
            html.push_str(&format!("<td>{cell}</td>"));
        }
        html.push_str("</tr>");
    }
    html.push_str("</tbody></table>");
    html
}

fn render_inline(text: &str) -> String {
    let text = BOLD_STARS.replace_all(text, "<strong>$1</strong>");
    let text = BOLD_UNDERSCORES.replace_all(&text, "<strong>$1</strong>");
    let text = ITALIC_STAR.replace_all(&text, "<em>$1</em>");
    ITALIC_UNDERSCORE.replace_all(&text, "<em>$1</em>").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bold_and_italic() {
        let html = render_markdown("**bold** and *italic*");
        assert_eq!(html, "<p><strong>bold</strong> and <em>italic</em></p>");
        assert!(!html.contains('*'));
    }

    #[test]
    fn test_script_is_escaped() {
        let html = render_markdown("<script>alert('x')</script>");
        assert_eq!(
            html,
            "<p>&lt;script&gt;alert(&#39;x&#39;)&lt;/script&gt;</p>"
        );
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_all_five_characters_escaped() {
        assert_eq!(escape_html(r#"&<>"'"#), "&amp;&lt;&gt;&quot;&#39;");
    }

    #[test]
    fn test_headings_all_levels() {
        for level in 1..=6 {
            let md = format!("{} Heading", "#".repeat(level));
            assert_eq!(render_markdown(&md), format!("<h{level}>Heading</h{level}>"));
        }
        assert_eq!(render_markdown("####### Seven"), "<p>####### Seven</p>");
    }

    #[test]
    fn test_heading_keeps_trailing_hash_inside_word() {
        assert_eq!(render_markdown("# Learn C#"), "<h1>Learn C#</h1>");
        assert_eq!(render_markdown("## Closed ##"), "<h2>Closed</h2>");
        assert_eq!(render_markdown("### Spaced   "), "<h3>Spaced</h3>");
    }

    #[test]
    fn test_paragraphs_and_line_breaks() {
        assert_eq!(
            render_markdown("line one\nline two\n\nsecond paragraph"),
            "<p>line one<br>line two</p>\n<p>second paragraph</p>"
        );
    }

    #[test]
    fn test_lists() {
        assert_eq!(
            render_markdown("- apples\n* pears\n\n1. first\n2. **second**"),
            "<ul><li>apples</li><li>pears</li></ul>\n<ol><li>first</li><li><strong>second</strong></li></ol>"
        );
    }

    #[test]
    fn test_fenced_code_is_not_reformatted() {
        let md = "Intro\n```rust\nlet x = **y** * z;\n# not a heading\n```\nAfter";
        assert_eq!(
            render_markdown(md),
            "<p>Intro</p>\n<pre><code class=\"language-rust\">let x = **y** * z;\n# not a heading</code></pre>\n<p>After</p>"
        );
    }

    #[test]
    fn test_fenced_code_content_is_escaped() {
        let html = render_markdown("```\n<b>hi</b>\n```");
        assert_eq!(html, "<pre><code>&lt;b&gt;hi&lt;/b&gt;</code></pre>");
    }

    #[test]
    fn test_inline_code_is_protected() {
        assert_eq!(
            render_markdown("call `a*b*c` now"),
            "<p>call <code>a*b*c</code> now</p>"
        );
    }

    #[test]
    fn test_table() {
        let md = "| Name | Amount |\n|------|-------:|\n| Grant A | **$5k** |\n| Grant B | $10k |";
        assert_eq!(
            render_markdown(md),
            "<table><thead><tr><th>Name</th><th>Amount</th></tr></thead><tbody>\
<tr><td>Grant A</td><td><strong>$5k</strong></td></tr>\
<tr><td>Grant B</td><td>$10k</td></tr></tbody></table>"
        );
    }

    #[test]
    fn test_table_needs_body_row() {
        let html = render_markdown("| a | b |\n|---|---|");
        assert!(!html.contains("<table>"));
    }

    #[test]
    fn test_snake_case_is_not_italic() {
        assert_eq!(render_markdown("use snake_case_names"), "<p>use snake_case_names</p>");
        assert_eq!(render_markdown("an _emphasis_ here"), "<p>an <em>emphasis</em> here</p>");
    }

    #[test]
    fn test_injected_placeholder_bytes_are_dropped() {
        assert_eq!(render_markdown("a\0B0\0b"), "<p>aB0b</p>");
    }
}
