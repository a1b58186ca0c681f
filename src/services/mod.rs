pub mod drive;
pub mod extractor;
pub mod naming;
pub mod output;
pub mod rename_service;
