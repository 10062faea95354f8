//! Page/revision streams from MediaWiki XML dumps
//!
//! ```text
//! ┌───────────────────────────────┐
//! │          DumpReader           │  plain / .bz2 / .gz
//! │   next_page() -> Page<'_>     │
//! └───────────────────────────────┘
//!                 │
//!                 ▼
//! ┌───────────────────────────────┐
//! │  PageHeader + Revisions<'_>   │  one forward pass,
//! │  (lazy, single pass)          │  one revision in memory
//! └───────────────────────────────┘
//! ```

pub mod source;
pub mod wikimedia;

pub use source::{DumpError, DumpFormat};
pub use wikimedia::{DumpReader, Page, Revisions};
