//! Response envelope shared by both services.

use serde::{Deserialize, Serialize};

/// Generic envelope `{result, statusCode, statusMessage}`.
///
/// The product authority wraps its detail responses in this envelope, so the
/// ordering side unwraps it when querying products over HTTP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonDto<T> {
    pub result: T,
    pub status_code: u16,
    pub status_message: String,
}

impl<T> CommonDto<T> {
    /// Wraps a result with the given status.
    pub fn new(result: T, status_code: u16, status_message: impl Into<String>) -> Self {
        Self {
            result,
            status_code,
            status_message: status_message.into(),
        }
    }

    /// Unwraps the envelope, discarding status fields.
    pub fn into_result(self) -> T {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_with_camel_case_fields() {
        let dto = CommonDto::new(7_i64, 201, "order created");
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json["result"], 7);
        assert_eq!(json["statusCode"], 201);
        assert_eq!(json["statusMessage"], "order created");
    }

    #[test]
    fn deserializes_nested_result() {
        let raw = r#"{"result":{"name":"Widget"},"statusCode":200,"statusMessage":"ok"}"#;
        let dto: CommonDto<serde_json::Value> = serde_json::from_str(raw).unwrap();
        assert_eq!(dto.status_code, 200);
        assert_eq!(dto.into_result()["name"], "Widget");
    }
}
