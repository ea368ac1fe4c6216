use std::collections::HashSet;
use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::Url;

static SCRIPT_SRC: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script[src]").unwrap());

const SCRIPT_EXT: &str = ".js";

/// Absolute script URLs referenced by `markup`, deduplicated, in document order.
///
/// References that do not resolve against `base`, or whose path does not
/// end in `.js`, are skipped.
pub fn discover(markup: &str, base: &Url) -> Vec<Url> {
    let document = Html::parse_document(markup);
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for element in document.select(&SCRIPT_SRC) {
        let Some(src) = element.value().attr("src").map(str::trim) else {
            continue;
        };
        if src.is_empty() {
            continue;
        }
        let Ok(resolved) = base.join(src) else {
            continue;
        };
        if !is_script_path(resolved.path()) {
            continue;
        }
        if seen.insert(resolved.as_str().to_string()) {
            found.push(resolved);
        }
    }

    found
}

fn is_script_path(path: &str) -> bool {
    path.len() >= SCRIPT_EXT.len()
        && path.is_char_boundary(path.len() - SCRIPT_EXT.len())
        && path[path.len() - SCRIPT_EXT.len()..].eq_ignore_ascii_case(SCRIPT_EXT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://example.com/blog/post.html").unwrap()
    }

    fn urls(markup: &str) -> Vec<String> {
        discover(markup, &base()).into_iter().map(String::from).collect()
    }

    #[test]
    fn resolves_relative_references() {
        let found = urls(
            r#"<script src="app.js"></script>
               <script src="/static/vendor.js"></script>
               <script src="//cdn.other.net/lib.js"></script>
               <script src="https://x.org/a/b.js"></script>"#,
        );
        assert_eq!(
            found,
            vec![
                "https://example.com/blog/app.js",
                "https://example.com/static/vendor.js",
                "https://cdn.other.net/lib.js",
                "https://x.org/a/b.js",
            ]
        );
    }

    #[test]
    fn deduplicates_keeping_first_position() {
        let found = urls(
            r#"<script src="x.js"></script>
               <script src="y.js"></script>
               <script src="x.js"></script>"#,
        );
        assert_eq!(
            found,
            vec!["https://example.com/blog/x.js", "https://example.com/blog/y.js"]
        );
    }

    #[test]
    fn identical_tags_yield_one_url() {
        let found = urls(r#"<script src="x.js"></script><script src="x.js"></script>"#);
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn ignores_non_js_and_empty_sources() {
        let found = urls(
            r#"<script src=""></script>
               <script src="   "></script>
               <script>inline()</script>
               <script src="module.mjs"></script>
               <script src="data.json"></script>
               <script src="loader.php?f=app.js"></script>
               <script src="UPPER.JS"></script>
               <script src="tracked.js?v=12#frag"></script>"#,
        );
        assert_eq!(
            found,
            vec![
                "https://example.com/blog/UPPER.JS",
                "https://example.com/blog/tracked.js?v=12#frag",
            ]
        );
    }

    #[test]
    fn skips_unresolvable_references() {
        let found = urls(
            r#"<script src="http://[::1"></script>
               <script src="http://exa mple.com/a.js"></script>
               <script src="ok.js"></script>"#,
        );
        assert_eq!(found, vec!["https://example.com/blog/ok.js"]);
    }

    #[test]
    fn discovery_is_repeatable() {
        let md = std::fs::read_to_string("tests/fixtures/landing.html").unwrap();
        let first = discover(&md, &base());
        let second = discover(&md, &base());
        assert_eq!(first, second);
        assert_eq!(first.len(), 4);
    }

    #[test]
    fn no_scripts_on_page() {
        assert!(urls("<html><body><p>static page</p></body></html>").is_empty());
    }
}
