//! Text normalization applied to every document before it is emitted.
//!
//! The rules run in a fixed order, each on the output of the previous one:
//!
//! 1. strip `<...>` tags (non-greedy, no nesting awareness)
//! 2. strip URLs (`http...` / `www....` up to the next whitespace)
//! 3. drop everything from the first `Copyright` to the end of the text
//! 4. turn newlines into spaces
//! 5. replace emoji with `:shortcode:` tokens
//! 6. remove `:shortcode:` tokens
//! 7. collapse whitespace and trim
//!
//! Steps 5 and 6 together delete emoji. Step 6 also removes shortcode-looking
//! text that was already present in the source.
//!
//! Deleting an emoji or shortcode can join its neighbours into text an earlier
//! rule would have caught (`Copy😀right`, `htt😀p://`), so [`normalize`]
//! repeats the rules until the text stops changing.

use std::sync::LazyLock;

use regex::Regex;

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"http\S+|www.\S+").expect("url regex"));
static SHORTCODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r":[a-z_&+-]+:").expect("shortcode regex"));
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("ws regex"));

const COPYRIGHT_MARKER: &str = "Copyright";

/// Longest emoji sequence (in chars) worth probing: family and kiss ZWJ
/// sequences with skin tones top out at ten code points.
const MAX_EMOJI_CHARS: usize = 10;

/// Normalizes raw document text into a single line of plain text.
///
/// The result is a fixed point: `normalize(&normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    // Every pass that changes the text removes a non-ASCII char, shortens the
    // text, or turns other whitespace into plain spaces, so this terminates.
    let mut text = normalize_pass(raw);
    loop {
        let next = normalize_pass(&text);
        if next == text {
            return text;
        }
        text = next;
    }
}

fn normalize_pass(raw: &str) -> String {
    let text = TAG_RE.replace_all(raw, "");
    let text = URL_RE.replace_all(&text, "");
    let text = strip_copyright(&text);
    let text = text.replace('\n', " ");
    let text = demojize(&text);
    let text = SHORTCODE_RE.replace_all(&text, "");
    let text = WHITESPACE_RE.replace_all(&text, " ");
    text.trim().to_string()
}

fn strip_copyright(text: &str) -> &str {
    match text.find(COPYRIGHT_MARKER) {
        Some(idx) => &text[..idx],
        None => text,
    }
}

/// Replaces every emoji with a `:shortcode:` token, matching the longest
/// sequence first so ZWJ and skin-tone sequences become a single token.
pub fn demojize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(first) = rest.chars().next() {
        if let Some((emoji, len)) = longest_emoji_prefix(rest) {
            out.push(':');
            out.push_str(&shortcode_for(emoji));
            out.push(':');
            rest = &rest[len..];
        } else {
            out.push(first);
            rest = &rest[first.len_utf8()..];
        }
    }
    out
}

fn longest_emoji_prefix(text: &str) -> Option<(&'static emojis::Emoji, usize)> {
    let mut chars = text.chars();
    let first = chars.next()?;
    // Every emoji is either non-ASCII or an ASCII keycap base followed by a
    // non-ASCII selector, so plain ASCII runs are skipped without lookups.
    if first.is_ascii() && !chars.next().is_some_and(|c| !c.is_ascii()) {
        return None;
    }

    let ends: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .skip(1)
        .chain(std::iter::once(text.len()))
        .take(MAX_EMOJI_CHARS)
        .collect();

    ends.into_iter()
        .rev()
        .find_map(|end| emojis::get(&text[..end]).map(|e| (e, end)))
}

/// Shortcode token body for an emoji. Falls back to a slug of the emoji's
/// name when it has no shortcode made only of `[a-z_&+-]`.
fn shortcode_for(emoji: &emojis::Emoji) -> String {
    if let Some(code) = emoji.shortcode() {
        if is_token_safe(code) {
            return code.to_string();
        }
    }
    let slug: String = emoji
        .name()
        .to_lowercase()
        .chars()
        .map(|c| if is_token_char(c) { c } else { '_' })
        .collect();
    if slug.is_empty() {
        "emoji".to_string()
    } else {
        slug
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_lowercase() || matches!(c, '_' | '&' | '+' | '-')
}

fn is_token_safe(code: &str) -> bool {
    !code.is_empty() && code.chars().all(is_token_char)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_html_tags() {
        let out = normalize("<p>Hello <b>World</b></p>");
        assert_eq!(out, "Hello World");
        assert!(!out.contains('<') && !out.contains('>'));
    }

    #[test]
    fn tag_removal_is_not_nesting_aware() {
        assert_eq!(normalize("a <b <c> d> e"), "a d> e");
    }

    #[test]
    fn strips_urls() {
        assert_eq!(
            normalize("See https://example.com/docs and www.example.org now"),
            "See and now"
        );
        assert_eq!(normalize("(link: http://x.y/z)"), "(link:");
    }

    #[test]
    fn truncates_at_first_copyright() {
        let out = normalize("A Copyright B");
        assert_eq!(out, "A");
        assert!(!out.contains('B'));

        let out = normalize("intro\nCopyright 2020 Acme\nmore text\nand more");
        assert_eq!(out, "intro");
    }

    #[test]
    fn lowercase_copyright_is_kept() {
        assert_eq!(normalize("copyright notice"), "copyright notice");
    }

    #[test]
    fn strips_emoji_entirely() {
        assert_eq!(normalize("hi 😀 there"), "hi there");
        assert_eq!(normalize("ship it 🚀🚀!"), "ship it !");
        assert_eq!(normalize("family 👨‍👩‍👧‍👦 photo"), "family photo");
    }

    #[test]
    fn demojize_produces_shortcode_tokens() {
        let out = demojize("hi 😀");
        assert!(out.starts_with("hi :"), "{out}");
        assert!(out.ends_with(':'), "{out}");
        assert!(SHORTCODE_RE.is_match(&out), "{out}");
    }

    #[test]
    fn demojize_leaves_plain_text_alone() {
        let text = "plain ASCII, accents é ü, CJK 漢字";
        assert_eq!(demojize(text), text);
    }

    #[test]
    fn removes_existing_shortcodes() {
        assert_eq!(normalize("done :white_check_mark: ok"), "done ok");
    }

    #[test]
    fn collapses_whitespace_and_newlines() {
        assert_eq!(normalize("  a\n\n b\t\tc \r\n d  "), "a b c d");
    }

    #[test]
    fn empty_and_blank_inputs_normalize_to_empty() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n\t "), "");
        assert_eq!(normalize("<br/>"), "");
    }

    #[test]
    fn removed_emoji_cannot_smuggle_text_past_earlier_rules() {
        assert_eq!(normalize("a Copy😀right b"), "a");
        assert_eq!(normalize("htt😀p://x.y z"), "z");
        assert_eq!(normalize("::a:b::"), ":");
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "",
            "plain words",
            "# Title\n\nSome *markdown* with <a href=\"x\">a link</a>.\n",
            "Visit https://example.com or www.example.org 😀 today\n",
            "<div>\n  <p>nested</p>\n</div>\nCopyright 2024 Acme Corp",
            "emoji run 🎉🎉 and :tada: shortcode",
            "tabs\tand\r\nwindows newlines",
            "unicode: naïve café 漢字",
            "a Copy😀right b",
            "::a:b::",
            "htt😀p://x.y z",
            "a:b😀 c",
            "<<b>i>x</b>",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {sample:?}");
        }
    }
}
