mod api;

pub use api::{DataSourceStatus, HealthResponse, UploadResponse, UploadedPartInfo};
