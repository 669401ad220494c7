//! Utility modules.

pub mod file;
pub mod retry;
pub mod text;

pub use file::{calculate_checksum, dir_has_entries, is_pdf_file};
pub use retry::{
    RecordingSleeper, RetryConfig, RetryResult, Sleeper, TokioSleeper,
    sleep_or_cancel, with_retry,
};
pub use text::{char_len, normalize_page_text};
