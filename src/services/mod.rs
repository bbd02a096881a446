pub mod file_service;
pub mod quota;
pub mod storage;
pub mod upload;
pub mod worker;
