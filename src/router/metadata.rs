use serde::{Deserialize, Serialize};

/// Upper bound on a recorded error message.
pub const MAX_ERR_LEN: usize = 4096;

/// Status code recorded when the call never completed (transport failure,
/// deadline, task loss).
pub const NO_STATUS: u16 = 0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DspMetaData {
    pub endpoint: String,
    pub status_code: u16,
    pub err_msg: String,
}

impl DspMetaData {
    pub fn new(endpoint: &str, status_code: u16, err_msg: &str) -> Self {
        DspMetaData {
            endpoint: endpoint.to_string(),
            status_code,
            err_msg: truncate_err(err_msg),
        }
    }
}

/// Clips a message to [`MAX_ERR_LEN`] bytes on a character boundary.
pub fn truncate_err(msg: &str) -> String {
    if msg.len() <= MAX_ERR_LEN {
        return msg.to_string();
    }

    let mut end = MAX_ERR_LEN;
    while !msg.is_char_boundary(end) {
        end -= 1;
    }
    msg[..end].to_string()
}
