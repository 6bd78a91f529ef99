pub mod annotate;
pub mod app;
pub mod blast;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod fasta;
pub mod fs_util;
pub mod lctr;
pub mod lineage;
pub mod ncbi;
pub mod output;
pub mod rank_cache;
pub mod ranking;
pub mod store;
