use serde_json::Value;

use super::error::SchemaError;
use super::schema::InputSchema;
use crate::utils::validation::ConfigValidator;

/// 按声明的契约校验工具参数
///
/// 检查必填字段、类型、枚举取值，以及名称包含 `url` 的字符串字段的 URL 格式。
/// 未声明的额外字段被放行。
pub fn validate_value(schema: &InputSchema, value: &Value) -> std::result::Result<(), SchemaError> {
    let object = value.as_object().ok_or(SchemaError::NotAnObject)?;

    for key in &schema.required {
        match object.get(key) {
            None | Some(Value::Null) => return Err(SchemaError::MissingRequired(key.clone())),
            Some(_) => {}
        }
    }

    for (key, val) in object {
        let Some(property) = schema.properties.get(key) else {
            continue;
        };
        if val.is_null() {
            continue;
        }

        if !property.kind.matches(val) {
            return Err(SchemaError::TypeMismatch {
                property: key.clone(),
                expected: property.kind.as_str(),
            });
        }

        if let Some(allowed) = &property.allowed {
            if !allowed.contains(val) {
                let rendered = allowed
                    .iter()
                    .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                    .collect::<Vec<_>>()
                    .join(", ");
                return Err(SchemaError::NotInEnum {
                    property: key.clone(),
                    allowed: format!("[{rendered}]"),
                });
            }
        }

        if key.to_ascii_lowercase().contains("url") {
            if let Some(url) = val.as_str() {
                ConfigValidator::validate_url(url).map_err(|err| SchemaError::InvalidUrl {
                    property: key.clone(),
                    reason: err.to_string(),
                })?;
            }
        }
    }

    Ok(())
}
