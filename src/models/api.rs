use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy`, or `degraded` when the data source is unreachable
    pub status: String,
    /// Deployment environment (`NODE_ENV`)
    pub environment: String,
    pub data_source: DataSourceStatus,
    /// Service version
    pub version: String,
    pub uptime_seconds: u64,
    /// Current timestamp
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DataSourceStatus {
    pub name: String,
    pub connected: bool,
}

/// Metadata of one received multipart part. Contents are never echoed.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadedPartInfo {
    pub field_name: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    /// Size in bytes
    pub size: usize,
}

/// Response after accepting an upload.
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Number of parts received
    pub count: usize,
    pub total_bytes: usize,
    pub parts: Vec<UploadedPartInfo>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            environment: "test".to_string(),
            data_source: DataSourceStatus {
                name: "postgres".to_string(),
                connected: true,
            },
            version: "0.1.0".to_string(),
            uptime_seconds: 3,
            timestamp: Utc::now(),
        };

        let json = serde_json::to_value(&response).expect("Serialization should succeed");
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["data_source"]["connected"], true);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_upload_response_omits_nothing() {
        let response = UploadResponse {
            count: 1,
            total_bytes: 5,
            parts: vec![UploadedPartInfo {
                field_name: Some("file".to_string()),
                file_name: None,
                content_type: None,
                size: 5,
            }],
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["parts"][0]["file_name"], serde_json::Value::Null);
        assert_eq!(json["parts"][0]["size"], 5);
    }
}
