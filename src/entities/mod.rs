pub mod prelude;

pub mod storage_configs;
pub mod stored_files;
pub mod users;
