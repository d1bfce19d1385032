use serde_json::Value;

pub const TITLE_MAX_CHARS: usize = 1000;
pub const DESCRIPTION_MAX_CHARS: usize = 5000;

/// The task backend owns final validation; these checks mirror its limits so
/// requests that can never succeed are answered without a backend hop. The
/// display strings are the exact `detail` messages the browser expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TaskValidationError {
    #[error("Title is required")]
    TitleRequired,
    #[error("Title must be 1000 characters or less")]
    TitleTooLong,
    #[error("Description must be 5000 characters or less")]
    DescriptionTooLong,
}

pub fn validate_create_payload(payload: &Value) -> Result<(), TaskValidationError> {
    validate_title(payload.get("title"))?;
    validate_description(payload.get("description"))
}

/// Absent fields are the backend's business; present ones are held to the
/// same limits as a create.
pub fn validate_update_payload(payload: &Value) -> Result<(), TaskValidationError> {
    if let Some(title) = payload.get("title") {
        validate_title(Some(title))?;
    }
    validate_description(payload.get("description"))
}

fn validate_title(value: Option<&Value>) -> Result<(), TaskValidationError> {
    let title = value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|title| !title.is_empty())
        .ok_or(TaskValidationError::TitleRequired)?;

    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(TaskValidationError::TitleTooLong);
    }
    Ok(())
}

fn validate_description(value: Option<&Value>) -> Result<(), TaskValidationError> {
    if let Some(description) = value.and_then(Value::as_str) {
        if description.chars().count() > DESCRIPTION_MAX_CHARS {
            return Err(TaskValidationError::DescriptionTooLong);
        }
    }
    Ok(())
}
