use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyLine {
    pub ready: bool,
    pub pid: u32,
    #[serde(default)]
    pub python_version: String,
    #[serde(default)]
    pub docling_version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertRequest {
    pub id: u64,
    pub name: String,
    pub pdf_b64: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvertResponse {
    pub id: u64,
    pub ok: bool,
    #[serde(default)]
    pub markdown: String,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineDiag {
    pub python_exe: String,
    pub python_version: String,
    pub docling_version: Option<String>,
    pub child_pid: u32,
    pub load_seconds: f64,
}
