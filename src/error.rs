use thiserror::Error;

/// Why a single fetch produced no usable body.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// No HTTP response was received (DNS, connect, TLS, timeout, body read).
    #[error("{reason}")]
    Transport { reason: String, timed_out: bool },
    /// A response arrived with a status outside 2xx.
    #[error("HTTP {code} {reason}")]
    HttpStatus { code: u16, reason: String },
}

impl FetchError {
    pub fn transport(reason: impl Into<String>) -> Self {
        FetchError::Transport {
            reason: reason.into(),
            timed_out: false,
        }
    }

    pub fn timeout(reason: impl Into<String>) -> Self {
        FetchError::Transport {
            reason: reason.into(),
            timed_out: true,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            FetchError::HttpStatus { code, .. } => Some(*code),
            FetchError::Transport { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchError::Transport { timed_out: true, .. })
    }

    /// Message recorded against the job: status and reason when a response
    /// arrived, else the transport reason, else "Unknown error".
    pub fn describe(&self) -> String {
        match self {
            FetchError::HttpStatus { code, reason } if reason.is_empty() => format!("HTTP {}", code),
            FetchError::HttpStatus { .. } => self.to_string(),
            FetchError::Transport { reason, .. } if reason.trim().is_empty() => "Unknown error".to_string(),
            FetchError::Transport { reason, .. } => reason.clone(),
        }
    }
}

/// Why one discovered resource ended without a saved artifact. Recorded as
/// a failed outcome; never fails the job.
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("{context}: {source}")]
    Save {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl ResourceError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ResourceError::Fetch(e) => e.status_code(),
            ResourceError::Save { .. } => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ResourceError::Fetch(e) if e.is_timeout())
    }

    pub fn describe(&self) -> String {
        match self {
            ResourceError::Fetch(e) => e.describe(),
            ResourceError::Save { .. } => self.to_string(),
        }
    }
}

/// Faults outside the per-resource loop. Any of these fails the whole job.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("URL {0} has no host")]
    MissingHost(String),
    #[error("Failed to fetch page: {0}")]
    PageFetch(#[source] FetchError),
    #[error("Job {0} not found")]
    JobNotFound(String),
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        PipelineError::Io {
            context: context.into(),
            source,
        }
    }

    /// Message logged when the job is failed, using the same preference
    /// order as per-resource failures.
    pub fn describe(&self) -> String {
        match self {
            PipelineError::PageFetch(e) => format!("Failed to fetch page: {}", e.describe()),
            other => {
                let msg = other.to_string();
                if msg.trim().is_empty() {
                    "Unknown error".to_string()
                } else {
                    msg
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_prefers_status_and_reason() {
        let e = FetchError::HttpStatus {
            code: 404,
            reason: "Not Found".into(),
        };
        assert_eq!(e.describe(), "HTTP 404 Not Found");
        assert_eq!(e.status_code(), Some(404));

        let bare = FetchError::HttpStatus {
            code: 599,
            reason: String::new(),
        };
        assert_eq!(bare.describe(), "HTTP 599");
    }

    #[test]
    fn describe_falls_back_to_transport_reason() {
        let e = FetchError::transport("error sending request: connection refused");
        assert_eq!(e.describe(), "error sending request: connection refused");
        assert_eq!(e.status_code(), None);
        assert!(!e.is_timeout());
        assert_eq!(FetchError::transport("").describe(), "Unknown error");
        assert!(FetchError::timeout("operation timed out").is_timeout());
    }

    #[test]
    fn page_fetch_message() {
        let e = PipelineError::PageFetch(FetchError::HttpStatus {
            code: 503,
            reason: "Service Unavailable".into(),
        });
        assert_eq!(e.describe(), "Failed to fetch page: HTTP 503 Service Unavailable");
    }

    #[test]
    fn save_failure_has_no_status() {
        let e = ResourceError::Save {
            context: "Failed to write out/002_x.js".into(),
            source: std::io::Error::new(std::io::ErrorKind::Other, "File name too long"),
        };
        assert_eq!(e.status_code(), None);
        assert!(!e.is_timeout());
        assert_eq!(e.describe(), "Failed to write out/002_x.js: File name too long");

        let fetch: ResourceError = FetchError::timeout("operation timed out").into();
        assert!(fetch.is_timeout());
        assert_eq!(fetch.describe(), "operation timed out");
    }
}
