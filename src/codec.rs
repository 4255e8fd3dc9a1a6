// 💾 Flat-file codec - one record per line, space separated, strings quoted
//
//   cities.txt    id "name" population "grade" "type"
//   drivers.txt   id "fullName" "birthDate" cityId
//   fines.txt     id amount "type" "severity"
//   registry.txt  recordId driverId cityId fineId paid "date"
//
// Field order is the declaration order of each record struct. Text fields
// are always quoted, whatever they contain; numbers never are. Embedded
// quotes and backslashes are backslash-escaped.

use crate::error::{DbError, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io;
use std::path::Path;

fn reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .delimiter(b' ')
        .has_headers(false)
        .double_quote(false)
        .escape(Some(b'\\'));
    builder
}

fn writer_builder() -> csv::WriterBuilder {
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(b' ')
        .has_headers(false)
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'));
    builder
}

/// `"text"` with `\` and `"` escaped
fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        if ch == '"' || ch == '\\' {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

fn encode_field(value: &Value) -> String {
    match value {
        Value::String(text) => quote(text),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => u8::from(*flag).to_string(),
        Value::Null => quote(""),
        other => quote(&other.to_string()),
    }
}

/// Fields of one record, already quoted by their serialized type.
/// The writer runs with quoting off so a text field that looks like a
/// number (a city called "2024") still comes out quoted.
fn to_fields<R: Serialize>(record: &R) -> Result<csv::StringRecord> {
    let value = serde_json::to_value(record)
        .map_err(|err| DbError::validation(format!("Cannot encode record: {}", err)))?;
    match value {
        Value::Object(fields) => Ok(fields.values().map(encode_field).collect()),
        other => Ok(std::iter::once(encode_field(&other)).collect()),
    }
}

/// Parse every line of `path`. Nothing is returned unless the whole file parses.
pub fn read_records<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>> {
    let file = File::open(path).map_err(|source| {
        tracing::error!(path = %path.display(), error = %source, "Error opening table file");
        DbError::Io {
            path: path.to_path_buf(),
            source,
        }
    })?;

    let mut rdr = reader_builder().from_reader(file);
    let mut records = Vec::new();

    for result in rdr.deserialize() {
        let record: R = result.map_err(|err| DbError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Write `records` to `path`, replacing its contents. The file is only
/// truncated once it has been opened successfully.
pub fn write_records<'a, R, I>(path: &Path, records: I) -> Result<usize>
where
    R: Serialize + 'a,
    I: IntoIterator<Item = &'a R>,
{
    let io_error = |source: io::Error| DbError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(|source| {
        tracing::error!(path = %path.display(), error = %source, "Error opening table file for writing");
        io_error(source)
    })?;

    let mut wtr = writer_builder().from_writer(file);
    let mut written = 0;
    for record in records {
        let fields = to_fields(record)?;
        wtr.write_record(&fields).map_err(|err| io_error(io::Error::from(err)))?;
        written += 1;
    }
    wtr.flush().map_err(io_error)?;

    Ok(written)
}

/// Encode a single record the way it would appear in its file (no newline).
#[cfg(test)]
pub(crate) fn encode_line<R: Serialize>(record: &R) -> Result<String> {
    let mut wtr = writer_builder().from_writer(Vec::new());
    wtr.write_record(&to_fields(record)?)
        .map_err(|err| DbError::validation(format!("Cannot encode record: {}", err)))?;
    let bytes = wtr
        .into_inner()
        .map_err(|err| DbError::validation(format!("Cannot encode record: {}", err)))?;
    Ok(String::from_utf8_lossy(&bytes).trim_end().to_string())
}

/// Decode a single line in table-file format.
#[cfg(test)]
pub(crate) fn decode_line<R: DeserializeOwned>(line: &str) -> Result<R> {
    let mut rdr = reader_builder().from_reader(line.as_bytes());
    match rdr.deserialize().next() {
        Some(Ok(record)) => Ok(record),
        Some(Err(err)) => Err(DbError::validation(format!("Cannot decode {:?}: {}", line, err))),
        None => Err(DbError::validation("Empty line")),
    }
}
