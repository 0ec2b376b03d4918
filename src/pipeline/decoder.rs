//! Tabular decoder: raw delimited text into header-keyed records.
//!
//! Rules:
//!
//! - A leading byte-order mark is stripped and the text is trimmed.
//! - The first line is the header row; trimmed header tokens become field names.
//! - Input with no non-blank row after the header is fatal ([`ImportError::EmptyInput`]).
//!   Dropped rows count as rows here.
//! - Blank lines are skipped without being counted or reported.
//! - `\r\n`, `\n` and a lone `\r` each end one line, both for splitting rows and for the
//!   line numbers reported on records.
//! - A row whose token count differs from the header's is dropped, logged, and reported in
//!   [`DecodeOutcome::skipped`]; decoding continues.
//!
//! The full sequence is materialized before returning.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::{ImportError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderOptions {
    /// Honour RFC 4180 double quotes, so a quoted field may hold commas or line breaks.
    /// When off, quote characters are ordinary field content.
    pub quoting: bool,
}

impl Default for DecoderOptions {
    fn default() -> Self {
        Self { quoting: true }
    }
}

/// One data row: a mapping from trimmed header name to trimmed cell value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    /// 1-based line of the source text where the row starts.
    pub line: usize,
    fields: BTreeMap<String, String>,
}

impl DecodedRecord {
    pub fn new(line: usize, fields: BTreeMap<String, String>) -> Self {
        Self { line, fields }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// The value of `name`, or `""` when the column is absent.
    pub fn get_or_empty(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A data row excluded because its token count did not match the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SkippedLine {
    pub line: usize,
    pub found: usize,
    pub expected: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeOutcome {
    pub headers: Vec<String>,
    pub records: Vec<DecodedRecord>,
    pub skipped: Vec<SkippedLine>,
}

impl DecodeOutcome {
    pub fn skipped_lines(&self) -> Vec<usize> {
        self.skipped.iter().map(|s| s.line).collect()
    }
}

fn count_line_breaks(text: &str) -> usize {
    let bytes = text.as_bytes();
    bytes
        .iter()
        .enumerate()
        .filter(|&(i, &b)| b == b'\n' || (b == b'\r' && bytes.get(i + 1) != Some(&b'\n')))
        .count()
}

/// 1-based line of `body` on which the row reported at byte `start` begins.
fn line_at(body: &str, start: usize) -> usize {
    // The reader may report a row from before the blank lines it skipped.
    let rest = body.get(start..).unwrap_or("");
    let row_start = start + (rest.len() - rest.trim_start_matches(['\r', '\n']).len());
    1 + count_line_breaks(body.get(..row_start).unwrap_or(body))
}

/// Decode `raw` into records. Pure: the same input always yields the same outcome.
pub fn decode(raw: &str, options: &DecoderOptions) -> Result<DecodeOutcome> {
    let without_bom = raw.strip_prefix('\u{feff}').unwrap_or(raw);
    let body = without_bom.trim();
    if body.is_empty() {
        return Err(ImportError::EmptyInput);
    }

    // Report line numbers against the submitted file, not the trimmed body.
    let leading = &without_bom[..without_bom.len() - without_bom.trim_start().len()];
    let line_offset = count_line_breaks(leading);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .quoting(options.quoting)
        .from_reader(body.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let mut records = Vec::new();
    let mut skipped = Vec::new();
    for result in reader.records() {
        let row = result?;
        let start = row.position().map(|p| p.byte() as usize).unwrap_or(0);
        let line = line_at(body, start) + line_offset;

        if row.len() <= 1 && row.iter().all(str::is_empty) {
            continue;
        }

        if row.len() != headers.len() {
            warn!(
                line,
                found = row.len(),
                expected = headers.len(),
                "Dropping row: column count does not match the header"
            );
            skipped.push(SkippedLine {
                line,
                found: row.len(),
                expected: headers.len(),
            });
            continue;
        }

        // Right-most column wins when a header name repeats.
        let fields = headers
            .iter()
            .cloned()
            .zip(row.iter().map(str::to_string))
            .collect::<BTreeMap<_, _>>();
        records.push(DecodedRecord::new(line, fields));
    }

    if records.is_empty() && skipped.is_empty() {
        return Err(ImportError::EmptyInput);
    }

    debug!(
        rows = records.len(),
        skipped = skipped.len(),
        columns = headers.len(),
        "Decoded tabular content"
    );

    Ok(DecodeOutcome {
        headers,
        records,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_default(raw: &str) -> Result<DecodeOutcome> {
        decode(raw, &DecoderOptions::default())
    }

    #[test]
    fn test_well_formed_rows_round_trip() {
        let out = decode_default("id,name,level\nc1,6A,6ème\nc2,5B,5ème\n").unwrap();
        assert_eq!(out.headers, vec!["id", "name", "level"]);
        assert_eq!(out.records.len(), 2);
        for record in &out.records {
            let names: Vec<&str> = record.field_names().collect();
            assert_eq!(names, vec!["id", "level", "name"]);
        }
        assert_eq!(out.records[1].get("name"), Some("5B"));
        assert_eq!(out.records[1].get("level"), Some("5ème"));
        assert!(out.skipped.is_empty());
    }

    #[test]
    fn test_headers_and_values_are_trimmed() {
        let out = decode_default(" id , name \n  c1 ,  Ada  \n").unwrap();
        assert_eq!(out.headers, vec!["id", "name"]);
        assert_eq!(out.records[0].get("name"), Some("Ada"));
    }

    #[test]
    fn test_byte_order_mark_is_stripped() {
        let out = decode_default("\u{feff}id,name\n1,Ada").unwrap();
        assert_eq!(out.headers[0], "id");
        assert_eq!(out.records[0].get("id"), Some("1"));
    }

    #[test]
    fn test_any_line_ending_convention() {
        for raw in ["id,name\r\n1,Ada\r\n2,Bo", "id,name\n1,Ada\n2,Bo", "id,name\r1,Ada\r2,Bo"] {
            let out = decode_default(raw).unwrap();
            assert_eq!(out.records.len(), 2, "input {:?}", raw);
            assert_eq!(out.records[1].get("name"), Some("Bo"));
            let lines: Vec<usize> = out.records.iter().map(|r| r.line).collect();
            assert_eq!(lines, vec![2, 3], "input {:?}", raw);
        }
    }

    #[test]
    fn test_carriage_return_lines_are_numbered_like_newlines() {
        let out = decode_default("\r\rid,name\r\r1,Ada\r2\r3,Cy").unwrap();
        let lines: Vec<usize> = out.records.iter().map(|r| r.line).collect();
        assert_eq!(lines, vec![5, 7]);
        assert_eq!(out.skipped_lines(), vec![6]);
    }

    #[test]
    fn test_empty_or_header_only_is_fatal() {
        for raw in [
            "",
            "   \n\n",
            "id,name",
            "id,name\n\n  \n",
            "\u{feff}id,name\r\n",
            "\"first\nname\",last",
        ] {
            assert!(
                matches!(decode_default(raw), Err(ImportError::EmptyInput)),
                "input {:?}",
                raw
            );
        }
    }

    #[test]
    fn test_mismatched_rows_are_dropped_and_reported() {
        let raw = "id,name,level\nc1,6A,6ème\nc2,5B\nc3,4C,4ème,extra\nc4,3D,3ème";
        let out = decode_default(raw).unwrap();
        let ids: Vec<&str> = out.records.iter().map(|r| r.get_or_empty("id")).collect();
        assert_eq!(ids, vec!["c1", "c4"]);
        assert_eq!(
            out.skipped,
            vec![
                SkippedLine { line: 3, found: 2, expected: 3 },
                SkippedLine { line: 4, found: 4, expected: 3 },
            ]
        );
        assert_eq!(out.skipped_lines(), vec![3, 4]);
    }

    #[test]
    fn test_header_with_only_dropped_rows_is_not_empty() {
        let out = decode_default("id,name\nc1").unwrap();
        assert!(out.records.is_empty());
        assert_eq!(out.skipped_lines(), vec![2]);
    }

    #[test]
    fn test_quoted_line_break_keeps_following_line_numbers() {
        let out = decode_default("id,note\n1,\"deux\nlignes\"\n2,simple").unwrap();
        assert_eq!(out.records[0].get("note"), Some("deux\nlignes"));
        assert_eq!(out.records[0].line, 2);
        assert_eq!(out.records[1].line, 4);
    }

    #[test]
    fn test_blank_lines_are_not_counted() {
        let out = decode_default("\n\nid,name\n\n1,Ada\n   \n2,Bo\n\n").unwrap();
        assert_eq!(out.records.len(), 2);
        assert!(out.skipped.is_empty());
        assert_eq!(out.records[0].line, 5);
        assert_eq!(out.records[1].line, 7);
    }

    #[test]
    fn test_empty_id_cell_is_kept() {
        let out = decode_default("id,name,level\n,6A,6ème").unwrap();
        assert_eq!(out.records.len(), 1);
        let record = &out.records[0];
        assert_eq!(record.get("id"), Some(""));
        assert_eq!(record.get("name"), Some("6A"));
        assert_eq!(record.get("level"), Some("6ème"));
    }

    #[test]
    fn test_quoted_fields_hold_commas_when_quoting_enabled() {
        let raw = "id,description\nt1,\"Cantine, janvier\"";
        let out = decode_default(raw).unwrap();
        assert_eq!(out.records[0].get("description"), Some("Cantine, janvier"));

        let literal = decode(raw, &DecoderOptions { quoting: false }).unwrap();
        assert!(literal.records.is_empty());
        assert_eq!(literal.skipped_lines(), vec![2]);
    }

    #[test]
    fn test_duplicate_header_keeps_rightmost_value() {
        let out = decode_default("id,name,name\n1,first,second").unwrap();
        assert_eq!(out.records[0].get("name"), Some("second"));
        assert_eq!(out.records[0].len(), 2);
    }

    #[test]
    fn test_decoding_is_pure() {
        let raw = "id,amount\nt1,10\nt2\nt3,abc";
        assert_eq!(decode_default(raw).unwrap(), decode_default(raw).unwrap());
    }
}
