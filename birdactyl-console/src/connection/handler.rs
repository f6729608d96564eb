//! Classification of socket terminations
//!
//! Decides whether a failure is a rejection (final) or a loss (retried).

use tokio_tungstenite::tungstenite::{self, protocol::CloseFrame};

/// Close codes the panel uses to refuse a console session
pub const REJECTION_CLOSE_CODES: [u16; 3] = [1008, 4001, 4003];

const DEFAULT_REJECTION: &str = "insufficient permission";

/// Why a socket ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// Authentication or permission refusal; never retried
    Rejected(String),
    /// Anything else; retried with backoff
    Lost(String),
}

impl Disconnect {
    /// Classify a failed connect or read
    pub fn from_error(err: &tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Http(response) => {
                let status = response.status().as_u16();
                if status == 401 || status == 403 {
                    let body = response
                        .body()
                        .as_deref()
                        .map(String::from_utf8_lossy)
                        .map(|b| b.trim().to_string())
                        .filter(|b| !b.is_empty());
                    Disconnect::Rejected(body.unwrap_or_else(|| match status {
                        401 => "authentication failed".to_string(),
                        _ => DEFAULT_REJECTION.to_string(),
                    }))
                } else {
                    Disconnect::Lost(format!("handshake failed with HTTP {}", status))
                }
            }
            other => Disconnect::Lost(other.to_string()),
        }
    }

    /// Classify a close frame sent by the panel
    pub fn from_close(frame: Option<&CloseFrame<'_>>) -> Self {
        match frame {
            Some(frame) if REJECTION_CLOSE_CODES.contains(&u16::from(frame.code)) => {
                let reason = frame.reason.trim();
                if reason.is_empty() {
                    Disconnect::Rejected(DEFAULT_REJECTION.to_string())
                } else {
                    Disconnect::Rejected(reason.to_string())
                }
            }
            Some(frame) => Disconnect::Lost(format!("closed by panel ({})", u16::from(frame.code))),
            None => Disconnect::Lost("closed by panel".to_string()),
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Disconnect::Rejected(reason) | Disconnect::Lost(reason) => reason,
        }
    }

    pub fn is_rejection(&self) -> bool {
        matches!(self, Disconnect::Rejected(_))
    }
}
