use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use apache_avro::types::Value;
use apache_avro::{Reader, Schema, Writer};

use crate::error::CodecError;

/// Sequential reader over an Avro object container file.
///
/// Every record is resolved from the file's embedded writer schema into
/// the reader schema given at construction, so downstream encoders can
/// rely on values conforming to that schema.
pub struct RecordReader<'s, R: Read> {
    inner: Reader<'s, R>,
}

impl<'s> RecordReader<'s, BufReader<File>> {
    /// Open a container file. A missing or unreadable file is `Io`, a bad
    /// header is `Decode`.
    pub fn open(path: impl AsRef<Path>, schema: &'s Schema) -> Result<Self, CodecError> {
        let file = File::open(path.as_ref())?;
        Self::new(BufReader::new(file), schema)
    }
}

impl<'s, R: Read> RecordReader<'s, R> {
    pub fn new(reader: R, schema: &'s Schema) -> Result<Self, CodecError> {
        let inner = Reader::with_schema(schema, reader)
            .map_err(|e| CodecError::Decode(format!("container header: {e}")))?;
        Ok(Self { inner })
    }

    /// Schema embedded in the container header.
    pub fn writer_schema(&self) -> &Schema {
        self.inner.writer_schema()
    }
}

impl<R: Read> Iterator for RecordReader<'_, R> {
    type Item = Result<Value, CodecError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .next()
            .map(|r| r.map_err(|e| CodecError::Decode(e.to_string())))
    }
}

/// Write values into an in-memory object container with `schema` embedded.
pub fn write_container<I>(schema: &Schema, values: I) -> Result<Vec<u8>, CodecError>
where
    I: IntoIterator<Item = Value>,
{
    let mut writer = Writer::new(schema, Vec::new());
    for value in values {
        writer
            .append(value)
            .map_err(|e| CodecError::Encode(e.to_string()))?;
    }
    writer.into_inner().map_err(|e| CodecError::Encode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::parse_schema;

    fn record(x: i32) -> Value {
        Value::Record(vec![("x".into(), Value::Int(x))])
    }

    #[test]
    fn reads_records_in_file_order() {
        let schema =
            parse_schema(r#"{"type":"record","name":"A","fields":[{"name":"x","type":"int"}]}"#)
                .unwrap();
        let bytes = write_container(&schema, [record(1), record(2), record(3)]).unwrap();

        let reader = RecordReader::new(bytes.as_slice(), &schema).unwrap();
        assert_eq!(reader.writer_schema(), &schema);
        let values: Vec<Value> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(values, vec![record(1), record(2), record(3)]);
    }

    #[test]
    fn records_are_resolved_into_reader_schema() {
        let writer_schema =
            parse_schema(r#"{"type":"record","name":"A","fields":[{"name":"x","type":"int"}]}"#)
                .unwrap();
        let reader_schema = parse_schema(
            r#"{"type":"record","name":"A","fields":[
                {"name":"x","type":"long"},
                {"name":"y","type":"string","default":"none"}
            ]}"#,
        )
        .unwrap();
        let bytes = write_container(&writer_schema, [record(5)]).unwrap();

        let values: Vec<Value> = RecordReader::new(bytes.as_slice(), &reader_schema)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            values,
            vec![Value::Record(vec![
                ("x".into(), Value::Long(5)),
                ("y".into(), Value::String("none".into())),
            ])]
        );
    }

    #[test]
    fn incompatible_reader_schema_fails_on_read() {
        let writer_schema =
            parse_schema(r#"{"type":"record","name":"A","fields":[{"name":"x","type":"int"}]}"#)
                .unwrap();
        let reader_schema =
            parse_schema(r#"{"type":"record","name":"A","fields":[{"name":"z","type":"string"}]}"#)
                .unwrap();
        let bytes = write_container(&writer_schema, [record(5)]).unwrap();

        match RecordReader::new(bytes.as_slice(), &reader_schema) {
            Ok(mut reader) => {
                assert!(matches!(reader.next(), Some(Err(CodecError::Decode(_)))));
            }
            Err(e) => assert!(matches!(e, CodecError::Decode(_))),
        }
    }

    #[test]
    fn garbage_is_not_a_container() {
        let schema = parse_schema(r#""int""#).unwrap();
        assert!(matches!(
            RecordReader::new(&b"definitely not avro"[..], &schema),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn missing_file_is_io() {
        let schema = parse_schema(r#""int""#).unwrap();
        assert!(matches!(
            RecordReader::open("/nonexistent/records.avro", &schema),
            Err(CodecError::Io(_))
        ));
    }
}
