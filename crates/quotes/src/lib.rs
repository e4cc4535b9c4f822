mod extract;
mod frame;
mod processor;

pub use extract::{extract_quote, RawQuote};
pub use frame::{decode_frame, FeedFrame, FrameError};
pub use processor::{ProcessedQuote, QuoteProcessor};
