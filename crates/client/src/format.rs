//! Text-to-markup transform used for every rendered chat entry.
//!
//! The steps run in a fixed order: escape, link, line breaks, fenced code,
//! inline code. Later steps match on the output of earlier ones, so a URL
//! inside a fenced block is still turned into a link.

use std::sync::LazyLock;

use regex::Regex;

const LINK_TEMPLATE: &str =
    r#"<a href="${0}" target="_blank" class="text-blue-600 hover:underline">${0}</a>"#;
const CODE_BLOCK_TEMPLATE: &str = r#"<pre class="code-block"><code>${1}</code></pre>"#;
const INLINE_CODE_TEMPLATE: &str = r#"<code style="background-color: rgba(0,0,0,0.05); padding: 2px 4px; border-radius: 3px;">${1}</code>"#;

static URL: LazyLock<Regex> = LazyLock::new(|| compile(r"https?://\S+"));
static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| compile(r"(?s)```(.*?)```"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| compile(r"`([^`]+)`"));

fn compile(pattern: &str) -> Regex {
    match Regex::new(pattern) {
        Ok(regex) => regex,
        Err(error) => panic!("invalid formatter pattern {pattern:?}: {error}"),
    }
}

/// Replaces the five HTML-significant characters with entities.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for character in text.chars() {
        match character {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#039;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Renders raw message text as markup. Total and pure; empty input yields `""`.
pub fn format_message(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let escaped = escape_html(text);
    let linked = URL.replace_all(&escaped, LINK_TEMPLATE);
    let broken = linked.replace('\n', "<br>");
    let blocks = CODE_BLOCK.replace_all(&broken, CODE_BLOCK_TEMPLATE);
    INLINE_CODE
        .replace_all(&blocks, INLINE_CODE_TEMPLATE)
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_formats_to_empty_output() {
        assert_eq!(format_message(""), "");
    }

    #[test]
    fn escapes_all_significant_characters() {
        assert_eq!(
            escape_html(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&#039;s&lt;/a&gt;"
        );
        assert_eq!(format_message("<b>"), "&lt;b&gt;");
    }

    #[test]
    fn formatting_is_not_idempotent() {
        let once = format_message("a < b");
        assert_eq!(once, "a &lt; b");
        assert_ne!(format_message(&once), once);
    }

    #[test]
    fn urls_become_links() {
        assert_eq!(
            format_message("see https://example.com/a?b=1 now"),
            "see <a href=\"https://example.com/a?b=1\" target=\"_blank\" \
             class=\"text-blue-600 hover:underline\">https://example.com/a?b=1</a> now"
        );
    }

    #[test]
    fn newlines_become_breaks() {
        assert_eq!(format_message("one\ntwo\n"), "one<br>two<br>");
    }

    #[test]
    fn fenced_code_renders_as_block_with_escaped_content() {
        assert_eq!(
            format_message(r#"```print("x")```"#),
            r#"<pre class="code-block"><code>print(&quot;x&quot;)</code></pre>"#
        );
    }

    #[test]
    fn fenced_code_spans_lines_and_is_non_greedy() {
        assert_eq!(
            format_message("```a\nb``` mid ```c```"),
            "<pre class=\"code-block\"><code>a<br>b</code></pre> mid \
             <pre class=\"code-block\"><code>c</code></pre>"
        );
    }

    #[test]
    fn inline_code_gets_styled_span() {
        assert_eq!(
            format_message("run `cargo test` please"),
            "run <code style=\"background-color: rgba(0,0,0,0.05); padding: 2px 4px; \
             border-radius: 3px;\">cargo test</code> please"
        );
    }

    #[test]
    fn urls_inside_fenced_code_are_still_linked() {
        assert_eq!(
            format_message("```\nhttp://a.b\n```"),
            "<pre class=\"code-block\"><code><br><a href=\"http://a.b\" target=\"_blank\" \
             class=\"text-blue-600 hover:underline\">http://a.b</a><br></code></pre>"
        );
    }
}
