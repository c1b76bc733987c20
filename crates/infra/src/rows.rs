//! Lazy row decoding of downloaded export files.

use std::io::Cursor;

use csv::{ReaderBuilder, StringRecord, StringRecordsIntoIter};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use marketo_core::ExportFormat;

fn reader(text: String, format: ExportFormat) -> csv::Reader<Cursor<String>> {
    ReaderBuilder::new()
        .delimiter(format.delimiter())
        .has_headers(true)
        .flexible(true)
        .from_reader(Cursor::new(text))
}

/// Single-pass iterator over the data rows of an export file, each mapped
/// through a caller-supplied function.
pub struct ExportRows<F> {
    headers: StringRecord,
    records: StringRecordsIntoIter<Cursor<String>>,
    map: F,
}

impl<F> std::fmt::Debug for ExportRows<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportRows")
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

impl<F> ExportRows<F> {
    /// Header row of the file (empty for an empty file).
    pub fn headers(&self) -> &StringRecord {
        &self.headers
    }
}

impl<T, F> Iterator for ExportRows<F>
where
    F: FnMut(&StringRecord) -> T,
{
    type Item = Result<T, csv::Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = self.records.next()?;
        Some(record.map(|r| (self.map)(&r)))
    }
}

/// Decode `text`, mapping every data row with `map`.
pub fn map_rows<T, F>(text: String, format: ExportFormat, map: F) -> Result<ExportRows<F>, csv::Error>
where
    F: FnMut(&StringRecord) -> T,
{
    let mut reader = reader(text, format);
    let headers = reader.headers()?.clone();
    Ok(ExportRows {
        headers,
        records: reader.into_records(),
        map,
    })
}

/// Decode `text` into `T` by header name.
pub fn deserialize_rows<T: DeserializeOwned>(
    text: String,
    format: ExportFormat,
) -> csv::DeserializeRecordsIntoIter<Cursor<String>, T> {
    reader(text, format).into_deserialize()
}

/// Default column set of an activity export file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityRecord {
    #[serde(rename = "marketoGUID")]
    pub marketo_guid: String,
    pub lead_id: u64,
    pub activity_date: String,
    pub activity_type_id: u32,
    #[serde(default)]
    pub campaign_id: Option<u64>,
    #[serde(default)]
    pub primary_attribute_value_id: Option<String>,
    #[serde(default)]
    pub primary_attribute_value: Option<String>,
    /// JSON object of activity-specific attributes, as sent.
    #[serde(default)]
    pub attributes: Option<String>,
}

impl ActivityRecord {
    /// Parse the `attributes` column.
    pub fn attributes_json(&self) -> Result<Option<serde_json::Value>, serde_json::Error> {
        self.attributes
            .as_deref()
            .filter(|a| !a.is_empty())
            .map(serde_json::from_str)
            .transpose()
    }
}
