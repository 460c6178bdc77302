use std::borrow::Cow;
use rmcp::ErrorData;
use rmcp::model::ErrorCode;
use serde_json::json;
use snowmcp_core::control::ControlError;

pub fn mcp_err(code: ErrorCode, message: impl Into<Cow<'static, str>>) -> ErrorData {
    ErrorData {
        code,
        message: message.into(),
        data: None,
    }
}

/// Maps a control-plane failure onto an MCP error, attaching a previously
/// recorded resolution when one matches the failure message.
pub fn map_err(err: ControlError) -> ErrorData {
    let message = err.to_string();
    match err {
        ControlError::InvalidInput(_) => mcp_err(ErrorCode::INVALID_PARAMS, message),
        ControlError::NotFound(_) => mcp_err(ErrorCode::RESOURCE_NOT_FOUND, message),
        ControlError::Client { suggestion: Some(fix), .. } => ErrorData {
            code: ErrorCode::INTERNAL_ERROR,
            message: message.into(),
            data: Some(json!({
                "suggested_resolution": fix.text,
                "success_count": fix.success_count,
            })),
        },
        ControlError::Client { .. } | ControlError::Store(_) => {
            mcp_err(ErrorCode::INTERNAL_ERROR, message)
        }
    }
}
