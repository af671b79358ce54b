pub mod download_service;
pub mod endpoint_pool;
pub mod storage;
pub mod upload_service;
