//! XML rendering of query results.
//!
//! Output is deterministic for a given input and timestamp: fixed element
//! order, two-space indentation, one element per line.

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, Utc};
use querent_core::safety::ValidatedQuery;
use querent_core::types::{CellValue, QueryResult, ResultSummary};

use crate::error::ExportError;

/// A rendered result document. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportDocument {
    xml: String,
    question: String,
    sql: String,
    generated_at: DateTime<Utc>,
    row_count: usize,
    execution_time_ms: f64,
    summary: ResultSummary,
}

impl ExportDocument {
    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn generated_at(&self) -> DateTime<Utc> {
        self.generated_at
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn execution_time_ms(&self) -> f64 {
        self.execution_time_ms
    }

    pub fn summary(&self) -> &ResultSummary {
        &self.summary
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.xml.as_bytes().to_vec()
    }
}

/// Render a result stamped with the current time.
pub fn serialize(
    question: &str,
    validated: &ValidatedQuery,
    result: &QueryResult,
    summary: &ResultSummary,
) -> Result<ExportDocument, ExportError> {
    serialize_at(question, validated, result, summary, Utc::now())
}

/// Render a result with an explicit `generatedAt` timestamp.
pub fn serialize_at(
    question: &str,
    validated: &ValidatedQuery,
    result: &QueryResult,
    summary: &ResultSummary,
    generated_at: DateTime<Utc>,
) -> Result<ExportDocument, ExportError> {
    check_column_names(result)?;

    let mut w = XmlWriter::new();
    w.open("queryResult", &[])?;

    w.open("metadata", &[])?;
    w.text("query", &[], question)?;
    w.text("sql", &[], validated.sql())?;
    w.text(
        "generatedAt",
        &[],
        &generated_at.to_rfc3339_opts(SecondsFormat::Millis, true),
    )?;
    w.text("rowCount", &[], &result.row_count.to_string())?;
    w.text("executionTimeMs", &[], &format_float(result.execution_time_ms))?;
    w.text("summary", &[], &summary.summary)?;
    w.list("keyFindings", "finding", &summary.key_findings)?;
    w.list("dataQualityNotes", "note", &summary.data_quality_notes)?;
    w.close("metadata");

    if result.columns.is_empty() {
        w.empty("schema", &[])?;
    } else {
        w.open("schema", &[])?;
        for col in &result.columns {
            w.empty(
                "column",
                &[("name", &col.name), ("type", &col.column_type.to_string())],
            )?;
        }
        w.close("schema");
    }

    if result.rows.is_empty() {
        w.empty("rows", &[])?;
    } else {
        w.open("rows", &[])?;
        for (index, row) in result.rows.iter().enumerate() {
            if row.len() != result.columns.len() {
                return Err(ExportError::Serialization(format!(
                    "row {} has {} cells, expected {}",
                    index,
                    row.len(),
                    result.columns.len()
                )));
            }
            w.open("row", &[])?;
            for (col, cell) in result.columns.iter().zip(row) {
                match cell {
                    CellValue::Null => w.empty(&col.name, &[("null", "true")])?,
                    other => w.text(&col.name, &[], &cell_text(other))?,
                }
            }
            w.close("row");
        }
        w.close("rows");
    }

    w.close("queryResult");

    Ok(ExportDocument {
        xml: w.finish(),
        question: question.to_string(),
        sql: validated.sql().to_string(),
        generated_at,
        row_count: result.row_count,
        execution_time_ms: result.execution_time_ms,
        summary: summary.clone(),
    })
}

fn check_column_names(result: &QueryResult) -> Result<(), ExportError> {
    let mut seen = HashSet::new();
    for col in &result.columns {
        if !is_valid_element_name(&col.name) {
            return Err(ExportError::Serialization(format!(
                "column name is not a valid XML element name: {:?}",
                col.name
            )));
        }
        if !seen.insert(col.name.as_str()) {
            return Err(ExportError::Serialization(format!(
                "duplicate column name: {}",
                col.name
            )));
        }
    }
    Ok(())
}

/// Letter or `_` first, then letters, digits, `_`, `-`, `.`; no `xml` prefix.
pub fn is_valid_element_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_alphabetic() || first == '_') {
        return false;
    }
    if name.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("xml")) {
        return false;
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

fn cell_text(cell: &CellValue) -> String {
    match cell {
        CellValue::Null => String::new(),
        CellValue::Integer(i) => i.to_string(),
        CellValue::Float(f) => format_float(*f),
        CellValue::Boolean(b) => b.to_string(),
        CellValue::Text(s) => s.clone(),
        CellValue::Blob(bytes) => hex::encode(bytes),
    }
}

/// Shortest decimal form that parses back to the same value.
fn format_float(value: f64) -> String {
    format!("{:?}", value)
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r')
        || ('\u{20}'..='\u{D7FF}').contains(&c)
        || ('\u{E000}'..='\u{FFFD}').contains(&c)
        || c >= '\u{10000}'
}

/// Escape text for element content and attribute values.
///
/// Carriage returns are written as `&#13;` so end-of-line normalization
/// on read leaves them intact.
pub fn escape(text: &str) -> Result<String, ExportError> {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '\r' => out.push_str("&#13;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c if is_xml_char(c) => out.push(c),
            c => {
                return Err(ExportError::Serialization(format!(
                    "character U+{:04X} cannot be represented in XML",
                    c as u32
                )))
            }
        }
    }
    Ok(out)
}

struct XmlWriter {
    out: String,
    depth: usize,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            out: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"),
            depth: 0,
        }
    }

    fn start_tag(&mut self, tag: &str, attrs: &[(&str, &str)]) -> Result<(), ExportError> {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push('<');
        self.out.push_str(tag);
        for (name, value) in attrs {
            self.out.push(' ');
            self.out.push_str(name);
            self.out.push_str("=\"");
            self.out.push_str(&escape(value)?);
            self.out.push('"');
        }
        Ok(())
    }

    fn open(&mut self, tag: &str, attrs: &[(&str, &str)]) -> Result<(), ExportError> {
        self.start_tag(tag, attrs)?;
        self.out.push_str(">\n");
        self.depth += 1;
        Ok(())
    }

    fn close(&mut self, tag: &str) {
        self.depth = self.depth.saturating_sub(1);
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push_str(">\n");
    }

    fn empty(&mut self, tag: &str, attrs: &[(&str, &str)]) -> Result<(), ExportError> {
        self.start_tag(tag, attrs)?;
        self.out.push_str("/>\n");
        Ok(())
    }

    fn text(&mut self, tag: &str, attrs: &[(&str, &str)], text: &str) -> Result<(), ExportError> {
        self.start_tag(tag, attrs)?;
        self.out.push('>');
        self.out.push_str(&escape(text)?);
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push_str(">\n");
        Ok(())
    }

    /// A wrapper element with one child per item, omitted when empty.
    fn list(&mut self, tag: &str, item_tag: &str, items: &[String]) -> Result<(), ExportError> {
        if items.is_empty() {
            return Ok(());
        }
        self.open(tag, &[])?;
        for item in items {
            self.text(item_tag, &[], item)?;
        }
        self.close(tag);
        Ok(())
    }

    fn finish(self) -> String {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use querent_core::safety::QueryGuard;
    use querent_core::types::{ColumnType, ResultColumn};

    fn validated(sql: &str) -> ValidatedQuery {
        QueryGuard::default().validate_sql(sql).unwrap()
    }

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::milliseconds(42)
    }

    fn col(name: &str, column_type: ColumnType) -> ResultColumn {
        ResultColumn {
            name: name.to_string(),
            column_type,
        }
    }

    fn top_customers() -> QueryResult {
        QueryResult {
            columns: vec![
                col("customer_name", ColumnType::String),
                col("revenue", ColumnType::Float),
            ],
            rows: vec![
                vec![CellValue::Text("Acme & Sons".into()), CellValue::Float(1500.0)],
                vec![CellValue::Text("Globex".into()), CellValue::Null],
            ],
            row_count: 2,
            execution_time_ms: 3.25,
            truncated: false,
        }
    }

    #[test]
    fn test_document_layout() {
        let summary = ResultSummary {
            summary: "Two customers".to_string(),
            key_findings: vec!["Acme leads".to_string()],
            data_quality_notes: vec![],
        };
        let doc = serialize_at(
            "Top 2 customers by revenue",
            &validated("SELECT customer_name, revenue FROM sales LIMIT 2"),
            &top_customers(),
            &summary,
            fixed_time(),
        )
        .unwrap();

        let expected = "\
<?xml version=\"1.0\" encoding=\"UTF-8\"?>
<queryResult>
  <metadata>
    <query>Top 2 customers by revenue</query>
    <sql>SELECT customer_name, revenue FROM sales LIMIT 2</sql>
    <generatedAt>2024-03-09T14:05:07.042Z</generatedAt>
    <rowCount>2</rowCount>
    <executionTimeMs>3.25</executionTimeMs>
    <summary>Two customers</summary>
    <keyFindings>
      <finding>Acme leads</finding>
    </keyFindings>
  </metadata>
  <schema>
    <column name=\"customer_name\" type=\"string\"/>
    <column name=\"revenue\" type=\"float\"/>
  </schema>
  <rows>
    <row>
      <customer_name>Acme &amp; Sons</customer_name>
      <revenue>1500.0</revenue>
    </row>
    <row>
      <customer_name>Globex</customer_name>
      <revenue null=\"true\"/>
    </row>
  </rows>
</queryResult>
";
        assert_eq!(doc.xml(), expected);
        assert_eq!(doc.row_count(), 2);
        assert_eq!(doc.generated_at(), fixed_time());
        assert_eq!(doc.sql(), "SELECT customer_name, revenue FROM sales LIMIT 2");
    }

    #[test]
    fn test_deterministic_for_fixed_timestamp() {
        let q = validated("SELECT 1");
        let a = serialize_at("q", &q, &top_customers(), &ResultSummary::new("s"), fixed_time()).unwrap();
        let b = serialize_at("q", &q, &top_customers(), &ResultSummary::new("s"), fixed_time()).unwrap();
        assert_eq!(a.xml(), b.xml());
    }

    #[test]
    fn test_escaping_in_text_and_sql() {
        let doc = serialize_at(
            "Who's <top> & \"best\"?",
            &validated("SELECT a FROM t WHERE b > 1 AND c < 'x'"),
            &QueryResult {
                columns: vec![],
                rows: vec![],
                row_count: 0,
                execution_time_ms: 0.0,
                truncated: false,
            },
            &ResultSummary::new(""),
            fixed_time(),
        )
        .unwrap();
        assert!(doc
            .xml()
            .contains("<query>Who&apos;s &lt;top&gt; &amp; &quot;best&quot;?</query>"));
        assert!(doc.xml().contains("b &gt; 1 AND c &lt; &apos;x&apos;"));
        assert!(doc.xml().contains("  <schema/>\n  <rows/>\n"));
        assert!(!doc.xml().contains("keyFindings"));
    }

    #[test]
    fn test_invalid_column_names_rejected() {
        for bad in ["1st", "has space", "ns:col", "xmlData", "", "a<b"] {
            let mut result = top_customers();
            result.columns[0].name = bad.to_string();
            let err = serialize_at("q", &validated("SELECT 1"), &result, &ResultSummary::new(""), fixed_time())
                .unwrap_err();
            assert!(matches!(err, ExportError::Serialization(_)), "{:?}", bad);
        }
    }

    #[test]
    fn test_duplicate_column_names_rejected() {
        let mut result = top_customers();
        result.columns[1].name = "customer_name".to_string();
        let err = serialize_at("q", &validated("SELECT 1"), &result, &ResultSummary::new(""), fixed_time())
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_control_character_rejected() {
        let mut result = top_customers();
        result.rows[0][0] = CellValue::Text("bell\u{7}".to_string());
        let err = serialize_at("q", &validated("SELECT 1"), &result, &ResultSummary::new(""), fixed_time())
            .unwrap_err();
        assert!(err.to_string().contains("U+0007"));
    }

    #[test]
    fn test_valid_element_names() {
        for good in ["revenue", "_x", "total.sum", "a-b", "été", "xm"] {
            assert!(is_valid_element_name(good), "{:?}", good);
        }
    }

    // -- Round trip through a minimal reader --

    fn unescape(text: &str) -> String {
        text.replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&apos;", "'")
            .replace("&#13;", "\r")
            .replace("&amp;", "&")
    }

    fn attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
        let key = format!("{}=\"", name);
        let start = tag.find(&key)? + key.len();
        let end = tag[start..].find('"')? + start;
        Some(&tag[start..end])
    }

    /// Text between `<tag>` and `</tag>`, newlines included.
    fn between<'a>(xml: &'a str, open: &str, close: &str) -> &'a str {
        let start = xml.find(open).unwrap() + open.len();
        let end = xml[start..].find(close).unwrap() + start;
        &xml[start..end]
    }

    /// Cells of one `<row>` body, scanned element by element.
    fn read_cells(mut body: &str) -> Vec<Option<String>> {
        let mut cells = Vec::new();
        loop {
            body = body.trim_start();
            if body.is_empty() {
                return cells;
            }
            let tag_end = body.find('>').unwrap();
            let tag = &body[1..tag_end];
            if tag.ends_with('/') {
                assert!(tag.contains("null=\"true\""), "{}", tag);
                cells.push(None);
                body = &body[tag_end + 1..];
                continue;
            }
            let close = format!("</{}>", tag);
            let content_end = body.find(&close).unwrap();
            cells.push(Some(unescape(&body[tag_end + 1..content_end])));
            body = &body[content_end + close.len()..];
        }
    }

    /// Reads back (row count, columns, rows as text-or-None).
    fn read_back(xml: &str) -> (usize, Vec<(String, String)>, Vec<Vec<Option<String>>>) {
        let row_count = between(xml, "<rowCount>", "</rowCount>").parse().unwrap();

        let columns = between(xml, "<schema>", "</schema>")
            .split("<column ")
            .skip(1)
            .map(|tag| {
                (
                    unescape(attr(tag, "name").unwrap()),
                    attr(tag, "type").unwrap().to_string(),
                )
            })
            .collect();

        let mut rows = Vec::new();
        let mut rest = between(xml, "<rows>", "</rows>");
        while let Some(start) = rest.find("<row>") {
            let body_start = start + "<row>".len();
            let body_end = rest[body_start..].find("</row>").unwrap() + body_start;
            rows.push(read_cells(&rest[body_start..body_end]));
            rest = &rest[body_end + "</row>".len()..];
        }
        (row_count, columns, rows)
    }

    #[test]
    fn test_round_trip_recovers_rows_and_types() {
        let result = QueryResult {
            columns: vec![
                col("id", ColumnType::Integer),
                col("ratio", ColumnType::Float),
                col("active", ColumnType::Boolean),
                col("label", ColumnType::String),
                col("raw", ColumnType::Other),
            ],
            rows: vec![
                vec![
                    CellValue::Integer(-7),
                    CellValue::Float(0.1),
                    CellValue::Boolean(true),
                    CellValue::Text("<b>\"quoted\" & 'single'</b>".into()),
                    CellValue::Blob(vec![0x00, 0xff, 0x10]),
                ],
                vec![
                    CellValue::Integer(i64::MAX),
                    CellValue::Float(1e-7),
                    CellValue::Boolean(false),
                    CellValue::Null,
                    CellValue::Null,
                ],
                vec![
                    CellValue::Integer(0),
                    CellValue::Float(-2.5),
                    CellValue::Boolean(true),
                    CellValue::Text("line1\nline2\r\nline3\r".into()),
                    CellValue::Null,
                ],
            ],
            row_count: 3,
            execution_time_ms: 1.0,
            truncated: false,
        };

        let doc = serialize_at("q", &validated("SELECT 1"), &result, &ResultSummary::new("s"), fixed_time())
            .unwrap();
        let (row_count, columns, rows) = read_back(doc.xml());

        assert_eq!(row_count, 3);
        let expected_columns: Vec<(String, String)> = result
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.column_type.to_string()))
            .collect();
        assert_eq!(columns, expected_columns);

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0].as_deref(), Some("-7"));
        assert_eq!(rows[0][1].as_deref().unwrap().parse::<f64>().unwrap(), 0.1);
        assert_eq!(rows[0][2].as_deref(), Some("true"));
        assert_eq!(rows[0][3].as_deref(), Some("<b>\"quoted\" & 'single'</b>"));
        assert_eq!(rows[0][4].as_deref(), Some("00ff10"));
        assert_eq!(rows[1][0].as_deref(), Some(i64::MAX.to_string().as_str()));
        assert_eq!(rows[1][1].as_deref().unwrap().parse::<f64>().unwrap(), 1e-7);
        assert_eq!(rows[1][3], None);
        assert_eq!(rows[2][3].as_deref(), Some("line1\nline2\r\nline3\r"));
        assert!(doc.xml().contains("<label>line1\nline2&#13;\nline3&#13;</label>"));
    }
}
