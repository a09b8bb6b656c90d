pub mod convert;
pub mod events;
pub mod friends;
pub mod grouping;
pub mod ingest;
pub mod logparse;
pub mod merge;
pub mod reconstruct;
pub mod stats;
pub mod types;
pub mod users;
