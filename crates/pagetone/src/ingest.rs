//! Audio acquisition
//!
//! Audio is decoded to mono `f32le` samples at the receiver's
//! input rate by an external transcoder. A reader thread
//! moves the decoded bytes into a bounded [`SampleBuffer`],
//! and the consumer takes whole samples from it.

use std::fmt;
use std::io;
use std::process::ExitStatus;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine};
use thiserror::Error;

mod buffer;
mod transcoder;

pub use buffer::SampleBuffer;
pub use transcoder::{command_args, Notice, Transcoder};

/// Audio source
///
/// Either a location which the transcoder understands, such
/// as a file path or a URL, or a live stream which requires
/// HTTP Basic authentication.
///
/// ```
/// use pagetone::{Input, LiveStream};
///
/// let input = Input::from("recording.wav");
/// assert_eq!("recording.wav", input.location());
///
/// let input: Input = LiveStream::new("https://example.com/feed", "user", "hunter2").into();
/// assert_eq!("https://example.com/feed", input.location());
/// assert!(!format!("{:?}", input).contains("hunter2"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// Location string: path, URL, or device
    ///
    /// The location `-` is standard input.
    Location(String),

    /// Authenticated live stream
    Authenticated(LiveStream),
}

impl Input {
    /// Location to read from
    pub fn location(&self) -> &str {
        match self {
            Input::Location(loc) => loc,
            Input::Authenticated(stream) => &stream.url,
        }
    }

    /// True if the input is standard input
    pub fn is_stdin(&self) -> bool {
        matches!(self, Input::Location(loc) if loc == "-")
    }

    /// HTTP `Authorization` header value, if any
    pub fn authorization(&self) -> Option<String> {
        match self {
            Input::Location(_) => None,
            Input::Authenticated(stream) => Some(stream.authorization()),
        }
    }
}

impl From<&str> for Input {
    fn from(loc: &str) -> Self {
        Input::Location(loc.to_owned())
    }
}

impl From<String> for Input {
    fn from(loc: String) -> Self {
        Input::Location(loc)
    }
}

impl From<LiveStream> for Input {
    fn from(stream: LiveStream) -> Self {
        Input::Authenticated(stream)
    }
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Location(loc) => write!(f, "{}", loc),
            Input::Authenticated(stream) => write!(f, "{} (as {})", stream.url, stream.username),
        }
    }
}

/// Live stream which requires authentication
///
/// The credentials are sent with HTTP Basic authentication.
/// The password is never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct LiveStream {
    /// Stream URL
    pub url: String,

    /// User name
    pub username: String,

    /// Password
    pub password: String,
}

impl LiveStream {
    /// Stream with credentials
    pub fn new<U, N, P>(url: U, username: N, password: P) -> Self
    where
        U: Into<String>,
        N: Into<String>,
        P: Into<String>,
    {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// HTTP `Authorization` header value
    ///
    /// ```
    /// use pagetone::LiveStream;
    ///
    /// let stream = LiveStream::new("http://localhost/", "Aladdin", "open sesame");
    /// assert_eq!("Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ==", stream.authorization());
    /// ```
    pub fn authorization(&self) -> String {
        let creds = format!("{}:{}", self.username, self.password);
        format!("Basic {}", general_purpose::STANDARD.encode(creds))
    }
}

impl fmt::Debug for LiveStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveStream")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Audio acquisition failure
///
/// Acquisition errors end the current run.
#[derive(Error, Clone, Debug)]
pub enum IngestError {
    /// The transcoder could not be started
    #[error("unable to start transcoder \"{program}\": {source}")]
    Spawn {
        /// Transcoder program
        program: String,

        /// Cause
        #[source]
        source: Arc<io::Error>,
    },

    /// Decoded audio could not be read
    #[error("error reading decoded audio: {0}")]
    Read(#[source] Arc<io::Error>),

    /// The transcoder exited unsuccessfully
    #[error("transcoder failed with {status}: {message}")]
    Exit {
        /// Exit status
        status: ExitStatus,

        /// Last diagnostic output of the transcoder
        message: String,
    },
}

impl IngestError {
    pub(crate) fn spawn(program: &str, err: io::Error) -> Self {
        IngestError::Spawn {
            program: program.to_owned(),
            source: Arc::new(err),
        }
    }
}

impl From<io::Error> for IngestError {
    fn from(err: io::Error) -> Self {
        IngestError::Read(Arc::new(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input() {
        let input = Input::from("-");
        assert!(input.is_stdin());
        assert_eq!(None, input.authorization());
        assert_eq!("-", format!("{}", input));

        let input = Input::from(LiveStream::new("http://radio/feed", "me", "secret"));
        assert!(!input.is_stdin());
        assert_eq!(
            Some("Basic bWU6c2VjcmV0".to_owned()),
            input.authorization()
        );
        assert_eq!("http://radio/feed (as me)", format!("{}", input));
        assert!(!format!("{:?}", input).contains("secret"));
    }

    #[test]
    fn test_error_display() {
        let err = IngestError::spawn(
            "no-such-transcoder",
            io::Error::new(io::ErrorKind::NotFound, "not found"),
        );
        assert_eq!(
            "unable to start transcoder \"no-such-transcoder\": not found",
            format!("{}", err)
        );
    }
}
