pub use super::storage_configs::Entity as StorageConfigs;
pub use super::stored_files::Entity as StoredFiles;
pub use super::users::Entity as Users;
