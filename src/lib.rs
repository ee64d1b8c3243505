pub mod booking;
pub mod compactor;
pub mod config;
pub mod http;
pub mod ledger;
pub mod limits;
pub mod model;
pub mod observability;
pub mod storage;
pub mod wal;
