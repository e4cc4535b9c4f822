use serde_json::Value;
use thiserror::Error;

use crate::extract::RawQuote;

#[derive(Debug, Clone, PartialEq)]
pub enum FeedFrame {
    Quote(RawQuote),
    Error(String),
    /// Well-formed frame with a `type` this client does not consume.
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("frame is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("frame has no type discriminator")]
    MissingType,
    #[error("quote frame has no data object")]
    MissingQuoteData,
    #[error("error frame has no message")]
    MissingErrorMessage,
}

pub fn decode_frame(raw: &str) -> Result<FeedFrame, FrameError> {
    let value: Value =
        serde_json::from_str(raw).map_err(|err| FrameError::InvalidJson(err.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(FrameError::MissingType)?;

    match kind {
        "quote" => value
            .get("data")
            .and_then(Value::as_object)
            .cloned()
            .map(FeedFrame::Quote)
            .ok_or(FrameError::MissingQuoteData),
        "error" => value
            .get("message")
            .and_then(Value::as_str)
            .filter(|message| !message.is_empty())
            .map(|message| FeedFrame::Error(message.to_string()))
            .ok_or(FrameError::MissingErrorMessage),
        other => Ok(FeedFrame::Other(other.to_string())),
    }
}
