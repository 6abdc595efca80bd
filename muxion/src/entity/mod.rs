pub mod linked_identities;
pub mod stream_history;
pub mod temporary_links;
pub mod vod_cache;
