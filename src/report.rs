//! Text artifacts written next to the downloaded scripts: the combined
//! listing of every resource and the tab-separated manifest.

use crate::error::ResourceError;

pub const COMBINED_FILE: &str = "all_js_combined.txt";
pub const MANIFEST_FILE: &str = "manifest.txt";
pub const PAGE_FILE: &str = "page.html";

const DELIMITER_WIDTH: usize = 80;

/// Concatenation of every attempted resource, in discovery order.
#[derive(Debug, Default)]
pub struct CombinedArtifact {
    buf: String,
}

impl CombinedArtifact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_success(&mut self, index: usize, url: &str, status: u16, content: &str) {
        self.header(index, url, &status.to_string());
        self.buf.push_str(content);
        if !content.ends_with('\n') {
            self.buf.push('\n');
        }
        self.buf.push('\n');
    }

    pub fn push_failure(&mut self, index: usize, url: &str, error: &ResourceError) {
        let status = match error.status_code() {
            Some(code) => format!("HTTP {}", code),
            None => "ERROR".to_string(),
        };
        self.header(index, url, &status);
        self.buf.push_str(&format!("// ERROR: {}\n\n", error.describe()));
    }

    fn header(&mut self, index: usize, url: &str, status: &str) {
        let rule = "=".repeat(DELIMITER_WIDTH);
        self.buf.push_str(&format!(
            "{rule}\n# FILE {index}: {url}\n# HTTP STATUS: {status}\n{rule}\n"
        ));
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

/// Tab-separated index of attempted resources under a short header.
#[derive(Debug)]
pub struct Manifest {
    buf: String,
}

impl Manifest {
    pub fn new(source_url: &str, count: usize) -> Self {
        Manifest {
            buf: format!("Source page: {}\nNumber of .js files: {}\n\n", source_url, count),
        }
    }

    pub fn push_ok(&mut self, index: usize, url: &str, filename: &str) {
        self.line(index, url, "OK", filename);
    }

    pub fn push_error(&mut self, index: usize, url: &str, message: &str) {
        self.line(index, url, "ERROR", message);
    }

    fn line(&mut self, index: usize, url: &str, tag: &str, detail: &str) {
        // Keep one record per line even if a message carries newlines or tabs.
        let detail = detail.replace(['\n', '\r', '\t'], " ");
        self.buf.push_str(&format!("{}\t{}\t{}\t{}\n", index, url, tag, detail));
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchError;

    #[test]
    fn success_section_layout() {
        let mut combined = CombinedArtifact::new();
        combined.push_success(1, "https://x.test/a.js", 200, "let a = 1;");
        let rule = "=".repeat(80);
        assert_eq!(
            combined.as_str(),
            format!("{rule}\n# FILE 1: https://x.test/a.js\n# HTTP STATUS: 200\n{rule}\nlet a = 1;\n\n")
        );
    }

    #[test]
    fn content_ending_in_newline_gets_one_blank_line() {
        let mut combined = CombinedArtifact::new();
        combined.push_success(1, "u", 200, "x();\n");
        assert!(combined.as_str().ends_with("=\nx();\n\n"));
        assert!(!combined.as_str().ends_with("\n\n\n"));
    }

    #[test]
    fn failure_sections_show_status_or_error() {
        let mut combined = CombinedArtifact::new();
        combined.push_failure(
            2,
            "https://x.test/b.js",
            &FetchError::HttpStatus {
                code: 403,
                reason: "Forbidden".into(),
            }
            .into(),
        );
        combined.push_failure(3, "https://x.test/c.js", &FetchError::transport("connection reset").into());

        let text = combined.as_str();
        assert!(text.contains("# FILE 2: https://x.test/b.js\n# HTTP STATUS: HTTP 403\n"));
        assert!(text.contains("// ERROR: HTTP 403 Forbidden\n"));
        assert!(text.contains("# FILE 3: https://x.test/c.js\n# HTTP STATUS: ERROR\n"));
        assert!(text.contains("// ERROR: connection reset\n"));
        let file2 = text.find("# FILE 2").unwrap();
        let file3 = text.find("# FILE 3").unwrap();
        assert!(file2 < file3);
    }

    #[test]
    fn manifest_lines() {
        let mut manifest = Manifest::new("https://x.test/", 2);
        manifest.push_ok(1, "https://x.test/a.js", "001_a.js");
        manifest.push_error(2, "https://x.test/b.js", "HTTP 404 Not Found");
        assert_eq!(
            manifest.as_str(),
            "Source page: https://x.test/\nNumber of .js files: 2\n\n\
             1\thttps://x.test/a.js\tOK\t001_a.js\n\
             2\thttps://x.test/b.js\tERROR\tHTTP 404 Not Found\n"
        );
    }

    #[test]
    fn manifest_flattens_multiline_errors() {
        let mut manifest = Manifest::new("p", 1);
        manifest.push_error(1, "u", "first\nsecond\tthird");
        assert!(manifest.as_str().ends_with("1\tu\tERROR\tfirst second third\n"));
    }
}
