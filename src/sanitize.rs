use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static UNSAFE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"[:\\/<>?"|*]|\s+"#).unwrap());

const FALLBACK_NAME: &str = "file";

/// Turn a (possibly percent-encoded) URL path segment into a safe file name.
///
/// Never fails: a segment that does not decode to valid UTF-8 is returned
/// unmodified.
pub fn sanitize(raw: &str) -> String {
    let Ok(decoded) = urlencoding::decode(raw) else {
        return raw.to_string();
    };
    let cleaned = UNSAFE_RE.replace_all(&decoded, "_");
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.into_owned()
    }
}

/// Directory name for a host. Hosts made only of dots (`.`, `..`) would
/// escape the output root, so they get the fallback name.
pub fn domain_dir(host: &str) -> String {
    let name = sanitize(host);
    if name.chars().all(|c| c == '.') {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}

/// Local name for the resource at 1-based `index`: `001_app.js`.
pub fn artifact_name(index: usize, url: &Url) -> String {
    let base = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(sanitize)
        .unwrap_or_else(|| format!("script_{}.js", index));
    format!("{:03}_{}", index, base)
}

/// Placeholder name recorded for a resource that could not be fetched.
pub fn failed_name(index: usize) -> String {
    format!("failed_{}.js", index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_separators_and_whitespace() {
        assert_eq!(sanitize("a b/c:d"), "a_b_c_d");
        assert_eq!(sanitize(r#"x<y>z?"|*\w"#), "x_y_z_____w");
        assert_eq!(sanitize("tab\t \nrun.js"), "tab_run.js");
    }

    #[test]
    fn empty_becomes_fallback() {
        assert_eq!(sanitize(""), "file");
    }

    #[test]
    fn decodes_percent_escapes() {
        assert_eq!(sanitize("my%20script.js"), "my_script.js");
        assert_eq!(sanitize("caf%C3%A9.js"), "café.js");
        assert_eq!(sanitize("a%2Fb.js"), "a_b.js");
    }

    #[test]
    fn malformed_encoding_does_not_fail() {
        // Invalid UTF-8 after decoding: original segment kept untouched.
        assert_eq!(sanitize("bad%FF.js"), "bad%FF.js");
        assert_eq!(sanitize("bad%FF a:b.js"), "bad%FF a:b.js");
        // Dangling escapes pass through.
        assert_eq!(sanitize("100%.js"), "100%.js");
        assert_eq!(sanitize("%zz"), "%zz");
    }

    #[test]
    fn artifact_names_are_order_prefixed() {
        let url = Url::parse("https://cdn.example.com/js/app.min.js?v=3").unwrap();
        assert_eq!(artifact_name(1, &url), "001_app.min.js");
        assert_eq!(artifact_name(42, &url), "042_app.min.js");
        assert_eq!(artifact_name(1234, &url), "1234_app.min.js");
    }

    #[test]
    fn artifact_name_without_basename() {
        let url = Url::parse("https://cdn.example.com/").unwrap();
        assert_eq!(artifact_name(7, &url), "007_script_7.js");
        let url = Url::parse("https://cdn.example.com/lib/").unwrap();
        assert_eq!(artifact_name(3, &url), "003_script_3.js");
    }

    #[test]
    fn domain_dirs_stay_inside_output_root() {
        assert_eq!(domain_dir("cdn.example.com"), "cdn.example.com");
        assert_eq!(domain_dir("[::1]"), "[__1]");
        assert_eq!(domain_dir(".."), "file");
        assert_eq!(domain_dir("."), "file");
        assert_eq!(domain_dir(""), "file");
    }

    #[test]
    fn failed_placeholder() {
        assert_eq!(failed_name(2), "failed_2.js");
    }
}
