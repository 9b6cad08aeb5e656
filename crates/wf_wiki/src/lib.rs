pub mod client;
pub mod parse;

pub use client::WikipediaProvider;
pub use parse::{parse_on_this_day, parse_summary, OnThisDayFeed, PageSummary};
