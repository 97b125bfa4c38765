//! Declarative field constraints.
//!
//! Each entity module publishes a `FIELDS` table describing its columns
//! (type, required, allowed values, default). Constructors resolve incoming
//! values against that table so the declaration and the enforcement cannot
//! drift apart.

use crate::errors::ModelError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Uuid,
    Text,
    Integer,
    Timestamp,
    Json,
}

#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub allowed: &'static [&'static str],
    pub default: Option<&'static str>,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, required: true, allowed: &[], default: None }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self { name, kind, required: false, allowed: &[], default: None }
    }

    pub const fn one_of(self, allowed: &'static [&'static str]) -> Self {
        Self { allowed, ..self }
    }

    pub const fn default_value(self, default: &'static str) -> Self {
        Self { default: Some(default), ..self }
    }
}

fn declared<'a>(fields: &'a [FieldSpec], name: &str) -> Result<&'a FieldSpec, ModelError> {
    fields
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| ModelError::Validation(format!("unknown field {name}")))
}

/// Resolve a text value against its declaration: blank falls back to the
/// default, required fields must end up present, enums must match.
pub fn resolve(fields: &[FieldSpec], name: &str, value: Option<&str>) -> Result<Option<String>, ModelError> {
    let decl = declared(fields, name)?;
    let value = value.map(str::trim).filter(|v| !v.is_empty()).or(decl.default);
    let Some(value) = value else {
        if decl.required {
            return Err(ModelError::Validation(format!("{name} required")));
        }
        return Ok(None);
    };
    if !decl.allowed.is_empty() && !decl.allowed.contains(&value) {
        return Err(ModelError::Validation(format!("{name} must be one of {}", decl.allowed.join(", "))));
    }
    Ok(Some(value.to_string()))
}

/// Like [`resolve`] but for fields that are required or defaulted.
pub fn resolve_required(fields: &[FieldSpec], name: &str, value: Option<&str>) -> Result<String, ModelError> {
    resolve(fields, name, value)?.ok_or_else(|| ModelError::Validation(format!("{name} required")))
}

/// Integer default lookup for fields declared with a numeric default.
pub fn default_int(fields: &[FieldSpec], name: &str) -> Result<i32, ModelError> {
    declared(fields, name)?
        .default
        .and_then(|d| d.parse::<i32>().ok())
        .ok_or_else(|| ModelError::Validation(format!("{name} has no integer default")))
}

pub fn validate_email(field: &str, email: &str) -> Result<(), ModelError> {
    let trimmed = email.trim();
    match trimmed.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ModelError::Validation(format!("{field} is not a valid email"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIELDS: &[FieldSpec] = &[
        FieldSpec::required("name", FieldKind::Text),
        FieldSpec::required("status", FieldKind::Text).one_of(&["active", "inactive"]).default_value("active"),
        FieldSpec::optional("nickname", FieldKind::Text),
        FieldSpec::required("minutes", FieldKind::Integer).default_value("60"),
    ];

    #[test]
    fn blank_required_field_is_rejected() {
        let err = resolve(FIELDS, "name", Some("  ")).unwrap_err();
        assert!(err.to_string().contains("name required"));
    }

    #[test]
    fn default_applies_when_missing() {
        assert_eq!(resolve_required(FIELDS, "status", None).unwrap(), "active");
        assert_eq!(default_int(FIELDS, "minutes").unwrap(), 60);
    }

    #[test]
    fn enum_constraint_enforced() {
        assert!(resolve(FIELDS, "status", Some("paused")).is_err());
        assert_eq!(resolve(FIELDS, "status", Some("inactive")).unwrap().as_deref(), Some("inactive"));
    }

    #[test]
    fn optional_field_may_be_absent() {
        assert_eq!(resolve(FIELDS, "nickname", None).unwrap(), None);
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("email", "a@b.io").is_ok());
        assert!(validate_email("email", "nope").is_err());
        assert!(validate_email("email", "@b.io").is_err());
    }
}
