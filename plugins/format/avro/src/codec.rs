use apache_avro::Schema;
use apache_avro::types::Value;

use crate::error::CodecError;

// ═══════════════════════════════════════════════════════════════
//  Schema
// ═══════════════════════════════════════════════════════════════

/// Parse an Avro schema document written in JSON.
pub fn parse_schema(definition: &str) -> Result<Schema, CodecError> {
    Schema::parse_str(definition).map_err(|e| CodecError::SchemaParse(e.to_string()))
}

/// Parse a schema document and render the parsed schema back to compact
/// JSON. The result is what gets registered with the service: whitespace
/// and key order are normalized, docs and defaults are kept.
pub fn normalize_schema(definition: &str) -> Result<String, CodecError> {
    let schema = parse_schema(definition)?;
    serde_json::to_string(&schema).map_err(|e| CodecError::SchemaParse(e.to_string()))
}

// ═══════════════════════════════════════════════════════════════
//  Binary datum
// ═══════════════════════════════════════════════════════════════

/// Encode one value as a bare Avro binary datum (no container header,
/// no fingerprint). Decoding requires the exact same schema.
pub fn encode_binary(schema: &Schema, value: Value) -> Result<Vec<u8>, CodecError> {
    apache_avro::to_avro_datum(schema, value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a bare binary datum written with `schema`. Trailing bytes are
/// rejected.
pub fn decode_binary(schema: &Schema, data: &[u8]) -> Result<Value, CodecError> {
    let mut reader = data;
    let value = apache_avro::from_avro_datum(schema, &mut reader, None)
        .map_err(|e| CodecError::Decode(e.to_string()))?;
    if !reader.is_empty() {
        return Err(CodecError::Decode(format!(
            "{} trailing bytes after datum",
            reader.len()
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECORD_A: &str = r#"{"type":"record","name":"A","fields":[{"name":"x","type":"int"}]}"#;

    #[test]
    fn normalized_definition_reparses_to_same_schema() {
        let pretty = r#"{
            "type": "record",
            "name": "A",
            "fields": [ { "name": "x", "type": "int" } ]
        }"#;
        let normalized = normalize_schema(pretty).unwrap();
        assert!(!normalized.contains('\n'));
        assert_eq!(parse_schema(&normalized).unwrap(), parse_schema(RECORD_A).unwrap());
    }

    #[test]
    fn malformed_schemas_are_rejected() {
        assert!(matches!(parse_schema("{not json"), Err(CodecError::SchemaParse(_))));
        assert!(matches!(
            parse_schema(r#"{"type":"record","name":"A"}"#),
            Err(CodecError::SchemaParse(_))
        ));
        assert!(matches!(parse_schema(r#"{"type":"intt"}"#), Err(CodecError::SchemaParse(_))));
    }

    #[test]
    fn datum_decodes_with_same_schema() {
        let schema = parse_schema(RECORD_A).unwrap();
        let value = Value::Record(vec![("x".into(), Value::Int(-3))]);
        let bytes = encode_binary(&schema, value.clone()).unwrap();
        assert_eq!(decode_binary(&schema, &bytes).unwrap(), value);
    }

    #[test]
    fn encode_rejects_non_conforming_value() {
        let schema = parse_schema(RECORD_A).unwrap();
        let value = Value::Record(vec![("x".into(), Value::String("nope".into()))]);
        assert!(matches!(encode_binary(&schema, value), Err(CodecError::Encode(_))));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let schema = parse_schema(RECORD_A).unwrap();
        let mut bytes = encode_binary(&schema, Value::Record(vec![("x".into(), Value::Int(1))]))
            .unwrap();
        bytes.push(0);
        assert!(matches!(decode_binary(&schema, &bytes), Err(CodecError::Decode(_))));
    }
}
