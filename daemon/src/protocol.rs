//! IPC protocol definitions (JSON lines)

use serde::{Deserialize, Serialize};

/// One request line: an optional correlation id plus the command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub request: Request,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
    Ping,
    ListProcesses {
        #[serde(default)]
        params: ListProcessesParams,
    },
    KillProcess { params: KillProcessParams },
}

/// Raw `list_processes` arguments, validated into
/// [`ListOptions`](crate::filter::ListOptions) before any sampling happens.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListProcessesParams {
    #[serde(default)]
    pub sort_by: Option<String>,
    #[serde(default)]
    pub duration: Option<i64>,
    #[serde(default)]
    pub limit: Option<LimitArg>,
    #[serde(default)]
    pub name_filter: Option<String>,
    #[serde(default)]
    pub user_filter: Option<String>,
    #[serde(default)]
    pub status_filter: Option<String>,
    #[serde(default)]
    pub min_cpu: Option<f64>,
    #[serde(default)]
    pub min_memory: Option<i64>,
    #[serde(default)]
    pub include_system: Option<bool>,
    #[serde(default)]
    pub sort_asc: Option<bool>,
}

/// `limit` arrives either as a number or as a numeric string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LimitArg {
    Number(i64),
    Text(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillProcessParams {
    pub pid: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,
    Response { id: Option<String>, data: serde_json::Value },
}

impl Response {
    pub fn data(id: Option<String>, data: serde_json::Value) -> Self {
        Response::Response { id, data }
    }

    pub fn error(id: Option<String>, message: impl std::fmt::Display) -> Self {
        Response::Response {
            id,
            data: serde_json::json!({ "error": message.to_string() }),
        }
    }
}
