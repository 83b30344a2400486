use std::fmt::Write as _;

use apache_avro::Schema;
use apache_avro::types::Value;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::CodecError;

// ═══════════════════════════════════════════════════════════════
//  Avro → JSON text
// ═══════════════════════════════════════════════════════════════

/// Render a decoded value as schema-less JSON text.
///
/// Layout follows the generic record `toString` form used by the JVM Avro
/// library: `{"x": 1, "name": "a"}`, `[1, 2]`. Record fields keep schema
/// order, map keys are sorted, unions are unwrapped and byte payloads are
/// rendered as base64 strings. Logical types render in their underlying
/// form: timestamps as numbers, `uuid` and `big-decimal` as text, `decimal`
/// as its two's-complement bytes and `duration` as its 12 fixed bytes.
pub fn render_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Boolean(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i)
        | Value::Date(i)
        | Value::TimeMillis(i) => {
            let _ = write!(out, "{i}");
        }
        Value::Long(l)
        | Value::TimeMicros(l)
        | Value::TimestampMillis(l)
        | Value::TimestampMicros(l)
        | Value::TimestampNanos(l)
        | Value::LocalTimestampMillis(l)
        | Value::LocalTimestampMicros(l)
        | Value::LocalTimestampNanos(l) => {
            let _ = write!(out, "{l}");
        }
        Value::Float(f) => write_number(out, f64::from(*f)),
        Value::Double(d) => write_number(out, *d),
        Value::Bytes(b) | Value::Fixed(_, b) => write_string(out, &STANDARD.encode(b)),
        Value::String(s) | Value::Enum(_, s) => write_string(out, s),
        Value::Uuid(u) => write_string(out, &u.to_string()),
        Value::BigDecimal(d) => write_string(out, &d.to_string()),
        Value::Decimal(d) => {
            let bytes: Vec<u8> = d.try_into().unwrap_or_default();
            write_string(out, &STANDARD.encode(bytes));
        }
        // Months, days and millis as the 12 little-endian bytes of the fixed.
        Value::Duration(d) => write_string(out, &STANDARD.encode(<[u8; 12]>::from(*d))),
        Value::Union(_, inner) => write_value(out, inner),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Map(entries) => {
            let mut keys: Vec<&String> = entries.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(out, key);
                out.push_str(": ");
                write_value(out, &entries[key]);
            }
            out.push('}');
        }
        Value::Record(fields) => {
            out.push('{');
            for (i, (name, field)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                write_string(out, name);
                out.push_str(": ");
                write_value(out, field);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    // serde_json handles escaping; a &str always serializes.
    match serde_json::to_string(s) {
        Ok(quoted) => out.push_str(&quoted),
        Err(_) => out.push_str("\"\""),
    }
}

fn write_number(out: &mut String, n: f64) {
    // Non-finite values have no JSON form.
    match serde_json::Number::from_f64(n) {
        Some(num) => {
            let _ = write!(out, "{num}");
        }
        None => out.push_str("null"),
    }
}

// ═══════════════════════════════════════════════════════════════
//  JSON → Avro
// ═══════════════════════════════════════════════════════════════

/// Convert a JSON document into an Avro value conforming to `schema`.
///
/// Accepts what [`render_json`] produces. Fails with `Decode` on any
/// mismatch: wrong type, unknown enum symbol, missing field without a
/// default, no matching union branch.
pub fn json_to_avro(json: &serde_json::Value, schema: &Schema) -> Result<Value, CodecError> {
    let value = convert(json, schema)?;
    value
        .resolve(schema)
        .map_err(|e| CodecError::Decode(format!("json does not match schema: {e}")))
}

fn mismatch(json: &serde_json::Value, expected: &str) -> CodecError {
    CodecError::Decode(format!("expected {expected}, got {json}"))
}

fn long_as(
    json: &serde_json::Value,
    n: &serde_json::Number,
    expected: &str,
    wrap: fn(i64) -> Value,
) -> Result<Value, CodecError> {
    n.as_i64().map(wrap).ok_or_else(|| mismatch(json, expected))
}

/// Widen a two's-complement payload until it can hold `precision` digits.
/// Writers may store small unscaled values in fewer bytes than the
/// precision allows; the resolver insists on the full width.
fn sign_extend(mut bytes: Vec<u8>, precision: usize) -> Vec<u8> {
    let digits = |len: usize| ((8 * len - 1) as f64 * std::f64::consts::LOG10_2).floor() as usize;
    let mut len = bytes.len().max(1);
    while digits(len) < precision {
        len += 1;
    }
    if len > bytes.len() {
        let fill = match bytes.first() {
            Some(b) if b & 0x80 != 0 => 0xff,
            _ => 0x00,
        };
        let mut widened = vec![fill; len - bytes.len()];
        widened.append(&mut bytes);
        bytes = widened;
    }
    bytes
}

fn convert(json: &serde_json::Value, schema: &Schema) -> Result<Value, CodecError> {
    use serde_json::Value as J;

    match (json, schema) {
        (J::Null, Schema::Null) => Ok(Value::Null),
        (J::Bool(b), Schema::Boolean) => Ok(Value::Boolean(*b)),
        (J::Number(n), Schema::Int) => n
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .map(Value::Int)
            .ok_or_else(|| mismatch(json, "int")),
        (J::Number(n), Schema::Long) => {
            n.as_i64().map(Value::Long).ok_or_else(|| mismatch(json, "long"))
        }
        (J::Number(n), Schema::Float) => n
            .as_f64()
            .map(|f| Value::Float(f as f32))
            .ok_or_else(|| mismatch(json, "float")),
        (J::Number(n), Schema::Double) => {
            n.as_f64().map(Value::Double).ok_or_else(|| mismatch(json, "double"))
        }
        (J::Number(n), Schema::Date) => n
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .map(Value::Date)
            .ok_or_else(|| mismatch(json, "date")),
        (J::Number(n), Schema::TimeMillis) => n
            .as_i64()
            .and_then(|i| i32::try_from(i).ok())
            .map(Value::TimeMillis)
            .ok_or_else(|| mismatch(json, "time-millis")),
        (J::Number(n), Schema::TimeMicros) => {
            n.as_i64().map(Value::TimeMicros).ok_or_else(|| mismatch(json, "time-micros"))
        }
        (J::Number(n), Schema::TimestampMillis) => n
            .as_i64()
            .map(Value::TimestampMillis)
            .ok_or_else(|| mismatch(json, "timestamp-millis")),
        (J::Number(n), Schema::TimestampMicros) => n
            .as_i64()
            .map(Value::TimestampMicros)
            .ok_or_else(|| mismatch(json, "timestamp-micros")),
        (J::Number(n), Schema::TimestampNanos) => {
            long_as(json, n, "timestamp-nanos", Value::TimestampNanos)
        }
        (J::Number(n), Schema::LocalTimestampMillis) => {
            long_as(json, n, "local-timestamp-millis", Value::LocalTimestampMillis)
        }
        (J::Number(n), Schema::LocalTimestampMicros) => {
            long_as(json, n, "local-timestamp-micros", Value::LocalTimestampMicros)
        }
        (J::Number(n), Schema::LocalTimestampNanos) => {
            long_as(json, n, "local-timestamp-nanos", Value::LocalTimestampNanos)
        }
        (J::String(s), Schema::Uuid) => uuid::Uuid::parse_str(s)
            .map(Value::Uuid)
            .map_err(|_| mismatch(json, "uuid")),
        (J::String(s), Schema::BigDecimal) => s
            .parse::<bigdecimal::BigDecimal>()
            .map(Value::BigDecimal)
            .map_err(|_| mismatch(json, "big-decimal")),
        (J::Number(n), Schema::BigDecimal) => n
            .to_string()
            .parse::<bigdecimal::BigDecimal>()
            .map(Value::BigDecimal)
            .map_err(|_| mismatch(json, "big-decimal")),
        (J::String(s), Schema::Decimal(decimal)) => STANDARD
            .decode(s.as_bytes())
            .map(|bytes| Value::Decimal(sign_extend(bytes, decimal.precision).into()))
            .map_err(|_| mismatch(json, "base64 decimal")),
        (J::String(s), Schema::Duration) => {
            let bytes = STANDARD
                .decode(s.as_bytes())
                .map_err(|_| mismatch(json, "base64 duration"))?;
            let fixed = <[u8; 12]>::try_from(bytes.as_slice())
                .map_err(|_| mismatch(json, "duration(12)"))?;
            Ok(Value::Duration(apache_avro::Duration::from(fixed)))
        }
        (J::String(s), Schema::String) => Ok(Value::String(s.clone())),
        (J::String(s), Schema::Bytes) => STANDARD
            .decode(s.as_bytes())
            .map(Value::Bytes)
            .map_err(|_| mismatch(json, "base64 bytes")),
        (J::String(s), Schema::Fixed(fixed)) => {
            let bytes = STANDARD
                .decode(s.as_bytes())
                .map_err(|_| mismatch(json, "base64 fixed"))?;
            if bytes.len() != fixed.size {
                return Err(mismatch(json, &format!("fixed({})", fixed.size)));
            }
            Ok(Value::Fixed(fixed.size, bytes))
        }
        (J::String(s), Schema::Enum(enum_schema)) => enum_schema
            .symbols
            .iter()
            .position(|sym| sym == s)
            .map(|idx| Value::Enum(idx as u32, s.clone()))
            .ok_or_else(|| mismatch(json, &format!("one of {:?}", enum_schema.symbols))),
        (J::Array(items), Schema::Array(inner)) => {
            let values: Result<Vec<Value>, CodecError> =
                items.iter().map(|item| convert(item, &inner.items)).collect();
            Ok(Value::Array(values?))
        }
        (J::Object(map), Schema::Map(inner)) => {
            let mut entries = std::collections::HashMap::with_capacity(map.len());
            for (key, item) in map {
                entries.insert(key.clone(), convert(item, &inner.types)?);
            }
            Ok(Value::Map(entries))
        }
        (J::Object(map), Schema::Record(record_schema)) => {
            let mut fields = Vec::with_capacity(record_schema.fields.len());
            for field in &record_schema.fields {
                let field_json = match (map.get(&field.name), &field.default) {
                    (Some(v), _) => v,
                    (None, Some(default)) => default,
                    (None, None) => {
                        return Err(CodecError::Decode(format!(
                            "record '{}' is missing field '{}'",
                            record_schema.name.name, field.name
                        )));
                    }
                };
                fields.push((field.name.clone(), convert(field_json, &field.schema)?));
            }
            Ok(Value::Record(fields))
        }
        (val, Schema::Union(union_schema)) => {
            for (idx, variant) in union_schema.variants().iter().enumerate() {
                if let Ok(v) = convert(val, variant) {
                    return Ok(Value::Union(idx as u32, Box::new(v)));
                }
            }
            Err(CodecError::Decode(format!("no union branch accepts {val}")))
        }
        // Named references are resolved against the full schema by the caller.
        (val, Schema::Ref { .. }) => Ok(Value::from(val.clone())),
        (val, other) => Err(mismatch(val, &format!("{other:?}"))),
    }
}
