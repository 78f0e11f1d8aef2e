//! Daybook keeps a personal article journal on disk and backs it up to a
//! single secret GitHub gist.
//!
//! The collection lives in a budgeted local store as two mirrored JSON
//! slots ([`storage`]), is edited through [`store::ArticleStore`], and
//! travels as one self-describing document file ([`sync`], [`export`]).

pub mod article;
pub mod config;
pub mod export;
pub mod storage;
pub mod store;
pub mod sync;
pub mod util;
