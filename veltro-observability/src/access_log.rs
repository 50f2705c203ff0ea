use serde::{Deserialize, Serialize};

/// One structured access log line, handed to an [`crate::logger::AccessLogger`].
#[derive(Debug, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub timestamp: String,
    pub route_id: String,
    pub client_ip: String,
    pub method: String,
    pub uri: String,
    pub response_status: u16,
    pub latency_ms: f64,
    pub upstream_addr: Option<String>,
}
