//! C2 — Schema Loader: parses and validates a project's AVRO schemas.

use apache_avro::schema::{Schema as AvroSchema, SchemaKind};
use pipegen_core::error::PipegenError;
use pipegen_core::model::{Schema, SchemaType};
use std::collections::HashMap;
use std::path::Path;

/// Loads every `.avsc`/`.json` file under `dir/schemas`, parses each as an
/// AVRO schema, validates it, and keys the result by the derived schema key
/// (spec §4.2). Absence of a `schemas/` directory is not an error: schemas
/// are optional when the SQL already declares topics and the gateway is
/// expected to auto-register them.
pub fn load_schemas(dir: &Path) -> Result<HashMap<String, Schema>, PipegenError> {
    let schema_dir = dir.join("schemas");
    if !schema_dir.is_dir() {
        return Ok(HashMap::new());
    }

    let mut paths: Vec<_> = std::fs::read_dir(&schema_dir)
        .map_err(|e| {
            PipegenError::ProjectInvalid(format!("failed to read {}: {e}", schema_dir.display()))
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("avsc") | Some("json")))
        .collect();
    paths.sort();

    let mut schemas = HashMap::new();
    for path in &paths {
        let raw_text = std::fs::read_to_string(path).map_err(|e| {
            PipegenError::ProjectInvalid(format!("failed to read {}: {e}", path.display()))
        })?;

        let parsed = AvroSchema::parse_str(&raw_text).map_err(|e| {
            PipegenError::ProjectInvalid(format!(
                "failed to parse avro schema {}: {e}",
                path.display()
            ))
        })?;

        let schema = to_schema(&parsed, &raw_text, path)?;

        let key = derive_key(path);
        schemas.insert(key, schema);
    }

    Ok(schemas)
}

/// Derives the schema's map key from its filename: lowercased, `_`/`-`
/// stripped; names containing `input`/`event` map to `input`; names
/// containing `output`/`result` map to `output`; otherwise the sanitized
/// name itself.
fn derive_key(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("schema")
        .to_lowercase();
    let sanitized: String = stem.chars().filter(|c| *c != '_' && *c != '-').collect();

    if sanitized.contains("input") || sanitized.contains("event") {
        "input".to_string()
    } else if sanitized.contains("output") || sanitized.contains("result") {
        "output".to_string()
    } else {
        sanitized
    }
}

fn to_schema(parsed: &AvroSchema, raw_text: &str, path: &Path) -> Result<Schema, PipegenError> {
    match parsed.kind() {
        SchemaKind::Record => {
            let (name, namespace, field_names) = match parsed {
                AvroSchema::Record { name, fields, .. } => {
                    let names: Vec<String> = fields.iter().map(|f| f.name.clone()).collect();
                    (name.name.clone(), name.namespace.clone(), names)
                }
                _ => unreachable!("SchemaKind::Record always matches Schema::Record"),
            };

            if field_names.is_empty() {
                return Err(PipegenError::ProjectInvalid(format!(
                    "record schema {} has no fields",
                    path.display()
                )));
            }
            let mut seen = std::collections::HashSet::new();
            for field in &field_names {
                if !seen.insert(field) {
                    return Err(PipegenError::ProjectInvalid(format!(
                        "record schema {} has duplicate field name {field}",
                        path.display()
                    )));
                }
            }

            Ok(Schema {
                name,
                namespace,
                schema_type: SchemaType::Record,
                fields: field_names,
                raw_text: raw_text.to_string(),
                source_path: path.display().to_string(),
            })
        }
        SchemaKind::Array => Ok(Schema {
            name: schema_name(path),
            namespace: None,
            schema_type: SchemaType::Array,
            fields: Vec::new(),
            raw_text: raw_text.to_string(),
            source_path: path.display().to_string(),
        }),
        SchemaKind::Map => Ok(Schema {
            name: schema_name(path),
            namespace: None,
            schema_type: SchemaType::Map,
            fields: Vec::new(),
            raw_text: raw_text.to_string(),
            source_path: path.display().to_string(),
        }),
        other => Err(PipegenError::ProjectInvalid(format!(
            "schema {} has unsupported top-level type {other:?}; expected record, array, or map",
            path.display()
        ))),
    }
}

fn schema_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("schema")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_schema(dir: &Path, name: &str, content: &str) {
        std::fs::write(dir.join("schemas").join(name), content).unwrap();
    }

    #[test]
    fn loads_record_schema_and_derives_input_key() {
        let project = tempfile::tempdir().unwrap();
        std::fs::create_dir(project.path().join("schemas")).unwrap();
        write_schema(
            project.path(),
            "input-event.avsc",
            r#"{"type":"record","name":"Event","fields":[{"name":"id","type":"string"}]}"#,
        );

        let schemas = load_schemas(project.path()).unwrap();
        let schema = schemas.get("input").expect("input key present");
        assert_eq!(schema.fields, vec!["id".to_string()]);
    }

    #[test]
    fn rejects_record_with_no_fields() {
        let project = tempfile::tempdir().unwrap();
        std::fs::create_dir(project.path().join("schemas")).unwrap();
        write_schema(
            project.path(),
            "empty.avsc",
            r#"{"type":"record","name":"Empty","fields":[]}"#,
        );

        assert!(load_schemas(project.path()).is_err());
    }

    #[test]
    fn missing_schemas_dir_is_not_an_error() {
        let project = tempfile::tempdir().unwrap();
        let schemas = load_schemas(project.path()).unwrap();
        assert!(schemas.is_empty());
    }
}
