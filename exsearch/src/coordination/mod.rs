//! Download coordination across independent workers.
//!
//! [`HtmlDownloader`] serves a request from the content cache when it can.
//! Otherwise it waits until the origin is downloadable
//! ([`wait_for_downloadable`]), marks the origin `DOWNLOADING`, runs the
//! routed downloader under a deadline and records the outcome.
//!
//! The domain lock is advisory. Two workers that both read "no record" both
//! fetch; nothing is corrupted because cache writes are independent inserts.

mod html_downloader;
mod wait;

pub use html_downloader::{
    DownloadRequest, FetchedDocument, HtmlDownloader, COOKIES_OPTION, RENDER_OPTION,
};
pub use wait::{wait_for_downloadable, WaitPolicy, WaitReport, MIN_POLL_INTERVAL};
