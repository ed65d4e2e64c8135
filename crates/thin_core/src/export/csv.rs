//! Streaming CSV export of submissions.
//!
//! # Responsibility
//! - Derive the header row from the first submission's document.
//! - Write one escaped row per submission as the cursor advances.
//!
//! # Invariants
//! - Only the header list and the current row are held in memory.
//! - No header line is written unless the first document has at least one
//!   element child; in that case nothing at all is written.
//! - Fields with more than one child node render as [`REPEAT_GROUP_SENTINEL`].

use crate::export::{ExportError, ExportResult};
use crate::model::payload::FieldValue;
use crate::model::submission::Submission;
use crate::repo::RepoResult;
use log::info;
use std::borrow::Cow;
use std::io::Write;

/// MIME type of the produced document.
pub const CSV_CONTENT_TYPE: &str = "text/csv";
/// Cell text used for repeated/grouped payload fields.
pub const REPEAT_GROUP_SENTINEL: &str = "(repeat group)";

const REQUIRES_QUOTES: [char; 4] = [',', '"', '\r', '\n'];

/// Counts reported after an export finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Number of header columns written.
    pub columns: usize,
    /// Number of data rows written.
    pub rows: usize,
}

/// Writes submissions as CSV to any byte sink.
pub struct CsvExporter<W: Write> {
    out: W,
}

impl<W: Write> CsvExporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Drains `submissions`, writing the header and one row per element.
    ///
    /// The first error from the source or the sink stops the export; bytes
    /// already written stay written.
    pub fn export<I>(&mut self, submissions: I) -> ExportResult<ExportSummary>
    where
        I: IntoIterator<Item = RepoResult<Submission>>,
    {
        let mut submissions = submissions.into_iter();
        let Some(first) = submissions.next().transpose()? else {
            return Ok(ExportSummary::default());
        };

        let headers = self.stream_headers(&first)?;
        if headers.is_empty() {
            return Ok(ExportSummary::default());
        }

        self.stream_submission(&first, &headers)?;
        let mut rows = 1;
        for submission in submissions {
            self.stream_submission(&submission?, &headers)?;
            rows += 1;
        }
        self.out.flush().map_err(ExportError::Io)?;

        info!(
            "event=csv_export module=export status=ok columns={} rows={}",
            headers.len(),
            rows
        );
        Ok(ExportSummary {
            columns: headers.len(),
            rows,
        })
    }

    /// Returns the underlying sink.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn stream_headers(&mut self, template: &Submission) -> ExportResult<Vec<String>> {
        let headers: Vec<String> = template
            .payload()
            .root()
            .map(|root| {
                root.child_elements()
                    .map(|child| child.name().to_string())
                    .collect()
            })
            .unwrap_or_default();
        if headers.is_empty() {
            return Ok(headers);
        }

        self.write(headers.join(",").as_bytes())?;
        self.write(b"\n")?;
        Ok(headers)
    }

    fn stream_submission(&mut self, submission: &Submission, fields: &[String]) -> ExportResult<()> {
        for (index, field) in fields.iter().enumerate() {
            if index > 0 {
                self.write(b",")?;
            }
            self.stream_value(submission, field)?;
        }
        self.write(b"\n")
    }

    fn stream_value(&mut self, submission: &Submission, field: &str) -> ExportResult<()> {
        let value = match submission.payload().field_value(field) {
            FieldValue::Text(text) => text,
            FieldValue::RepeatGroup => REPEAT_GROUP_SENTINEL,
            FieldValue::Missing | FieldValue::Empty => return Ok(()),
        };
        self.write(escape_value(value).as_bytes())
    }

    fn write(&mut self, bytes: &[u8]) -> ExportResult<()> {
        self.out.write_all(bytes).map_err(ExportError::Io)
    }
}

/// Quotes `value` when it contains a comma, quote or line break, doubling
/// embedded quotes. Other values pass through unchanged.
pub fn escape_value(value: &str) -> Cow<'_, str> {
    if !value.contains(REQUIRES_QUOTES) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(format!("\"{}\"", value.replace('"', "\"\"")))
}

#[cfg(test)]
mod tests {
    use super::{escape_value, CsvExporter, ExportSummary, REPEAT_GROUP_SENTINEL};
    use crate::model::submission::Submission;
    use crate::repo::RepoResult;

    fn rows(payloads: &[&str]) -> Vec<RepoResult<Submission>> {
        payloads
            .iter()
            .map(|payload| Ok(Submission::from_payload(*payload)))
            .collect()
    }

    fn export(payloads: &[&str]) -> (String, ExportSummary) {
        let mut exporter = CsvExporter::new(Vec::new());
        let summary = exporter.export(rows(payloads)).unwrap();
        (String::from_utf8(exporter.into_inner()).unwrap(), summary)
    }

    #[test]
    fn escape_value_quotes_only_when_needed() {
        assert_eq!(escape_value("plain"), "plain");
        assert_eq!(escape_value("12,5"), "\"12,5\"");
        assert_eq!(escape_value("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_value("two\nlines"), "\"two\nlines\"");
        assert_eq!(escape_value("cr\rhere"), "\"cr\rhere\"");
    }

    #[test]
    fn empty_source_writes_nothing() {
        let (csv, summary) = export(&[]);
        assert!(csv.is_empty());
        assert_eq!(summary, ExportSummary::default());
    }

    #[test]
    fn document_without_elements_writes_nothing() {
        let (csv, _) = export(&["<data id=\"f\">just text</data>", "<data><a>1</a></data>"]);
        assert!(csv.is_empty());
    }

    #[test]
    fn header_and_rows_follow_first_document() {
        let (csv, summary) = export(&[
            "<data><age>5</age><kilograms>12</kilograms></data>",
            "<data><kilograms>12,5</kilograms><extra>x</extra></data>",
        ]);
        assert_eq!(csv, "age,kilograms\n5,12\n,\"12,5\"\n");
        assert_eq!(summary, ExportSummary { columns: 2, rows: 2 });
    }

    #[test]
    fn repeat_group_renders_sentinel() {
        let (csv, _) = export(&["<data><name>a</name><kids><k>1</k><k>2</k></kids></data>"]);
        assert_eq!(csv, format!("name,kids\na,{REPEAT_GROUP_SENTINEL}\n"));
    }

    #[test]
    fn source_error_stops_export() {
        let source: Vec<RepoResult<Submission>> = vec![
            Ok(Submission::from_payload("<data><a>1</a></data>")),
            Err(crate::repo::RepoError::InvalidData("broken row".to_string())),
        ];
        let mut exporter = CsvExporter::new(Vec::new());
        assert!(exporter.export(source).is_err());
        assert_eq!(exporter.into_inner(), b"a\n1\n".to_vec());
    }
}
