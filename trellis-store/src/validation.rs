//! Structural schema validation for project documents.
//!
//! Runs against the raw JSON value so a malformed file is caught before any
//! typed decode. Errors make a document unloadable; warnings mark gaps the
//! migration step backfills.

use serde_json::Value;
use trellis_core::{NodeId, NodeType, Timestamp, ValidationError};

/// How bad a finding is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The document cannot be loaded or saved as-is.
    Error,
    /// Tolerable gap; migration repairs it.
    Warning,
}

/// One finding from a validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    /// Dotted path into the document, e.g. `structure_tree[0].name`.
    pub path: String,
}

/// All findings from one validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// True when no error-severity issue was found.
    pub valid: bool,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let valid = !issues
            .iter()
            .any(|issue| issue.severity == Severity::Error);
        Self { valid, issues }
    }

    /// Convert into a schema-violation error carrying every error-severity
    /// finding, or `Ok` when the document is loadable.
    pub fn into_result(self) -> Result<(), ValidationError> {
        if self.valid {
            return Ok(());
        }
        let issues = self
            .issues
            .into_iter()
            .filter(|issue| issue.severity == Severity::Error)
            .map(|issue| format!("{}: {}", issue.path, issue.message))
            .collect();
        Err(ValidationError::SchemaViolation { issues })
    }
}

fn error(path: impl Into<String>, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        severity: Severity::Error,
        message: message.into(),
        path: path.into(),
    }
}

fn warning(path: impl Into<String>, message: impl Into<String>) -> ValidationIssue {
    ValidationIssue {
        severity: Severity::Warning,
        message: message.into(),
        path: path.into(),
    }
}

/// Validate a project document against the structural schema.
///
/// Collects every finding rather than stopping at the first, so a failing
/// load reports the full damage.
pub fn validate_document(value: &Value) -> ValidationResult {
    let mut issues = Vec::new();

    let Some(root) = value.as_object() else {
        issues.push(error("", "document must be a JSON object"));
        return ValidationResult::from_issues(issues);
    };

    match root.get("meta") {
        None => issues.push(error("meta", "required section is missing")),
        Some(meta) => validate_meta(meta, &mut issues),
    }

    match root.get("context") {
        None => issues.push(error("context", "required field is missing")),
        Some(context) if !context.is_string() => {
            issues.push(error("context", "must be a string"))
        }
        Some(_) => {}
    }

    match root.get("chat_history") {
        None => issues.push(warning("chat_history", "missing, backfilled by migration")),
        Some(history) if !history.is_array() => {
            issues.push(error("chat_history", "must be an array"))
        }
        Some(_) => {}
    }

    match root.get("structure_tree") {
        None => issues.push(error("structure_tree", "required section is missing")),
        Some(Value::Array(nodes)) => {
            for (index, node) in nodes.iter().enumerate() {
                validate_node(node, &format!("structure_tree[{}]", index), &mut issues);
            }
        }
        Some(_) => issues.push(error("structure_tree", "must be an array")),
    }

    ValidationResult::from_issues(issues)
}

fn validate_meta(meta: &Value, issues: &mut Vec<ValidationIssue>) {
    let Some(meta) = meta.as_object() else {
        issues.push(error("meta", "must be an object"));
        return;
    };

    match meta.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => {}
        Some(_) => issues.push(error("meta.name", "must not be empty")),
        None => issues.push(error("meta.name", "must be a string")),
    }

    match meta.get("create_time").and_then(Value::as_str) {
        Some(raw) => {
            if raw.parse::<Timestamp>().is_err() {
                issues.push(error("meta.create_time", "must be an RFC3339 datetime"));
            }
        }
        None => issues.push(error("meta.create_time", "must be a datetime string")),
    }

    if meta.get("version").and_then(Value::as_str).is_none() {
        issues.push(error("meta.version", "must be a string"));
    }

    if !meta.contains_key("schema_version") {
        issues.push(warning(
            "meta.schema_version",
            "missing, backfilled by migration",
        ));
    }
    if !meta.contains_key("last_modified") {
        issues.push(warning(
            "meta.last_modified",
            "missing, backfilled by migration",
        ));
    }
}

fn validate_node(value: &Value, path: &str, issues: &mut Vec<ValidationIssue>) {
    let Some(node) = value.as_object() else {
        issues.push(error(path, "must be an object"));
        return;
    };

    match node.get("id").and_then(Value::as_str) {
        Some(id) => {
            if id.parse::<NodeId>().is_err() {
                issues.push(error(format!("{}.id", path), "must be a UUID"));
            }
        }
        None => issues.push(error(format!("{}.id", path), "must be a UUID string")),
    }

    match node.get("type").and_then(Value::as_str) {
        Some(kind) => {
            if NodeType::parse(kind).is_none() {
                issues.push(error(
                    format!("{}.type", path),
                    "must be one of subsystem, device, feature",
                ));
            }
        }
        None => issues.push(error(format!("{}.type", path), "must be a string")),
    }

    match node.get("name").and_then(Value::as_str) {
        Some(name) if !name.trim().is_empty() => {}
        Some(_) => issues.push(error(format!("{}.name", path), "must not be empty")),
        None => issues.push(error(format!("{}.name", path), "must be a string")),
    }

    match node.get("quantity") {
        Some(quantity) => match quantity.as_u64() {
            Some(count) if count >= 1 => {}
            _ => issues.push(error(
                format!("{}.quantity", path),
                "must be an integer of at least 1",
            )),
        },
        None => issues.push(error(format!("{}.quantity", path), "is required")),
    }

    if let Some(specs) = node.get("specs") {
        match specs.as_object() {
            Some(entries) => {
                for (key, spec) in entries {
                    if !(spec.is_string() || spec.is_number() || spec.is_boolean()) {
                        issues.push(error(
                            format!("{}.specs.{}", path, key),
                            "must be a string, number, or boolean",
                        ));
                    }
                }
            }
            None => issues.push(error(format!("{}.specs", path), "must be an object")),
        }
    }

    if let Some(children) = node.get("children") {
        match children.as_array() {
            Some(entries) => {
                for (index, child) in entries.iter().enumerate() {
                    validate_node(child, &format!("{}.children[{}]", path, index), issues);
                }
            }
            None => issues.push(error(format!("{}.children", path), "must be an array")),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use trellis_core::{NodeType, ProjectData, ProjectNode};

    fn valid_doc() -> Value {
        let mut data = ProjectData::new("Acme HQ Security");
        data.structure_tree.push(
            ProjectNode::new(NodeType::Subsystem, "Security").with_child(
                ProjectNode::new(NodeType::Device, "IP Camera").with_quantity(10),
            ),
        );
        serde_json::to_value(&data).unwrap()
    }

    #[test]
    fn test_valid_document_passes() {
        let result = validate_document(&valid_doc());
        assert!(result.valid, "unexpected issues: {:?}", result.issues);
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn test_non_object_document_rejected() {
        let result = validate_document(&json!([1, 2, 3]));
        assert!(!result.valid);
    }

    #[test]
    fn test_missing_meta_rejected() {
        let mut doc = valid_doc();
        doc.as_object_mut().unwrap().remove("meta");
        let result = validate_document(&doc);
        assert!(!result.valid);
        assert!(result.issues.iter().any(|issue| issue.path == "meta"));
    }

    #[test]
    fn test_empty_project_name_rejected() {
        let mut doc = valid_doc();
        doc["meta"]["name"] = json!("   ");
        let result = validate_document(&doc);
        assert!(!result.valid);
        assert!(result.issues.iter().any(|issue| issue.path == "meta.name"));
    }

    #[test]
    fn test_bad_create_time_rejected() {
        let mut doc = valid_doc();
        doc["meta"]["create_time"] = json!("yesterday");
        let result = validate_document(&doc);
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|issue| issue.path == "meta.create_time"));
    }

    #[test]
    fn test_zero_quantity_rejected_with_node_path() {
        let mut doc = valid_doc();
        doc["structure_tree"][0]["children"][0]["quantity"] = json!(0);
        let result = validate_document(&doc);
        assert!(!result.valid);
        let err = result.into_result().unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("structure_tree[0].children[0].quantity"));
    }

    #[test]
    fn test_unknown_node_type_rejected() {
        let mut doc = valid_doc();
        doc["structure_tree"][0]["type"] = json!("cabinet");
        let result = validate_document(&doc);
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|issue| issue.path == "structure_tree[0].type"));
    }

    #[test]
    fn test_bad_node_id_rejected() {
        let mut doc = valid_doc();
        doc["structure_tree"][0]["id"] = json!("not-a-uuid");
        assert!(!validate_document(&doc).valid);
    }

    #[test]
    fn test_nested_spec_value_rejected() {
        let mut doc = valid_doc();
        doc["structure_tree"][0]["specs"] = json!({"ports": {"count": 8}});
        let result = validate_document(&doc);
        assert!(!result.valid);
        assert!(result
            .issues
            .iter()
            .any(|issue| issue.path == "structure_tree[0].specs.ports"));
    }

    #[test]
    fn test_warnings_do_not_invalidate() {
        let doc = json!({
            "meta": {
                "name": "Legacy",
                "create_time": "2024-03-01T09:00:00Z",
                "version": "1.0.0"
            },
            "context": "",
            "structure_tree": []
        });
        let result = validate_document(&doc);
        assert!(result.valid);
        // Missing schema_version, last_modified, chat_history are flagged soft.
        assert_eq!(
            result
                .issues
                .iter()
                .filter(|issue| issue.severity == Severity::Warning)
                .count(),
            3
        );
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn test_all_errors_collected() {
        let doc = json!({
            "context": 7,
            "structure_tree": [
                {"id": "nope", "type": "cabinet", "name": "", "quantity": 0}
            ]
        });
        let result = validate_document(&doc);
        assert!(!result.valid);
        let errors: Vec<_> = result
            .issues
            .iter()
            .filter(|issue| issue.severity == Severity::Error)
            .collect();
        // meta, context, and four node-level findings.
        assert!(errors.len() >= 6, "got: {:?}", errors);
    }

    #[test]
    fn test_quantity_must_be_integral() {
        let mut doc = valid_doc();
        doc["structure_tree"][0]["quantity"] = json!(2.5);
        assert!(!validate_document(&doc).valid);
        doc["structure_tree"][0]["quantity"] = json!(-3);
        assert!(!validate_document(&doc).valid);
    }
}
