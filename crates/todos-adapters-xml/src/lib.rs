//! XML comment report parser for todos.
//!
//! This crate reads the report format written by the upstream comment
//! scanner and turns it into a [`Report`]:
//!
//! ```xml
//! <comments xmlns="http://todos.sourceforge.net" version="1.0">
//!   <comment pattern="TODO" file="src/Main.java" line="12">// TODO: remove</comment>
//! </comments>
//! ```
//!
//! The document structure is validated while reading: the root element must
//! be `comments` in the todos namespace or in no namespace, every child must
//! be a `comment` element of the same kind with `pattern`,
//! `file` and an integer `line` attribute, and comment bodies may only hold
//! text. Element text is kept verbatim apart from entity unescaping.

use std::path::Path;

use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use thiserror::Error;
use todos_ports::ReportParser;
use todos_types::{Comment, Report};

// ============================================================================
// Constants
// ============================================================================

/// Namespace used by the upstream scanner. Documents without it are accepted.
pub const TODOS_NAMESPACE: &str = "http://todos.sourceforge.net";

const ROOT_ELEMENT: &[u8] = b"comments";
const COMMENT_ELEMENT: &[u8] = b"comment";

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while reading a report file.
#[derive(Debug, Error)]
pub enum XmlError {
    /// The file could not be read.
    #[error("Failed to read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The document is not well-formed XML.
    #[error("Malformed XML at byte {position}: {source}")]
    Malformed {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    /// The document is well-formed but does not follow the report structure.
    #[error("Invalid report structure: {0}")]
    Schema(String),
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a report document.
///
/// # Examples
///
/// ```
/// use todos_adapters_xml::parse_report;
///
/// let xml = r#"<comments version="1.0">
///   <comment pattern="TODO" file="a.rs" line="3">// TODO: later</comment>
/// </comments>"#;
///
/// let report = parse_report(xml).unwrap();
/// assert_eq!(report.version(), Some("1.0"));
/// assert_eq!(report.comments()[0].line, 3);
/// assert_eq!(report.comments()[0].source_code, "// TODO: later");
/// ```
pub fn parse_report(text: &str) -> Result<Report, XmlError> {
    let mut reader = NsReader::from_str(text);

    // Prolog: everything up to the root element
    let (version, comments) = loop {
        match read_event(&mut reader)? {
            (Event::Start(e), foreign) => {
                check_root(&e, foreign)?;
                let version = root_version(&e)?;
                break (version, parse_comments(&mut reader)?);
            }
            (Event::Empty(e), foreign) => {
                check_root(&e, foreign)?;
                break (root_version(&e)?, Vec::new());
            }
            (Event::Text(t), _) if is_blank(&t) => {}
            (Event::Text(_) | Event::CData(_), _) => {
                return Err(XmlError::Schema(
                    "text content outside of the root element".to_string(),
                ));
            }
            (Event::End(_), _) => {
                return Err(XmlError::Schema("unexpected end tag before root".to_string()));
            }
            (Event::Eof, _) => {
                return Err(XmlError::Schema("missing root element".to_string()));
            }
            // Declaration, doctype, processing instructions and comments
            _ => {}
        }
    };

    // Epilog: only whitespace and markup without content may follow
    loop {
        match read_event(&mut reader)? {
            (Event::Eof, _) => break,
            (Event::Text(t), _) if is_blank(&t) => {}
            (Event::Start(_) | Event::Empty(_), _) => {
                return Err(XmlError::Schema(
                    "more than one root element".to_string(),
                ));
            }
            (Event::Text(_) | Event::CData(_), _) => {
                return Err(XmlError::Schema(
                    "text content after the root element".to_string(),
                ));
            }
            _ => {}
        }
    }

    Ok(Report::new(comments, version))
}

/// Read and parse a report file.
pub fn parse_report_file(path: &Path) -> Result<Report, XmlError> {
    let text = std::fs::read_to_string(path).map_err(|source| XmlError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_report(&text)
}

/// Read the next event together with the namespace of its element, if that
/// namespace is neither the todos namespace nor absent.
fn read_event<'a>(
    reader: &mut NsReader<&'a [u8]>,
) -> Result<(Event<'a>, Option<String>), XmlError> {
    let result = reader
        .read_resolved_event()
        .map(|(ns, event)| (event, foreign_namespace(&ns)));
    result.map_err(|source| malformed(reader, source))
}

fn foreign_namespace(ns: &ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Unbound => None,
        ResolveResult::Bound(Namespace(uri)) if *uri == TODOS_NAMESPACE.as_bytes() => None,
        ResolveResult::Bound(Namespace(uri)) => Some(String::from_utf8_lossy(uri).into_owned()),
        ResolveResult::Unknown(prefix) => Some(format!(
            "undeclared prefix '{}'",
            String::from_utf8_lossy(prefix)
        )),
    }
}

fn malformed(reader: &NsReader<&[u8]>, source: quick_xml::Error) -> XmlError {
    XmlError::Malformed {
        position: reader.buffer_position() as u64,
        source,
    }
}

fn check_namespace(e: &BytesStart<'_>, foreign: Option<String>) -> Result<(), XmlError> {
    match foreign {
        None => Ok(()),
        Some(namespace) => Err(XmlError::Schema(format!(
            "element '{}' is in namespace '{namespace}', expected '{TODOS_NAMESPACE}' or none",
            String::from_utf8_lossy(e.name().as_ref())
        ))),
    }
}

fn is_blank(text: &[u8]) -> bool {
    text.iter().all(u8::is_ascii_whitespace)
}

fn check_root(e: &BytesStart<'_>, foreign: Option<String>) -> Result<(), XmlError> {
    if e.local_name().as_ref() == ROOT_ELEMENT {
        check_namespace(e, foreign)
    } else {
        Err(XmlError::Schema(format!(
            "expected root element 'comments', found '{}'",
            String::from_utf8_lossy(e.name().as_ref())
        )))
    }
}

fn root_version(e: &BytesStart<'_>) -> Result<Option<String>, XmlError> {
    let attributes = read_attributes(e)?;
    Ok(attributes
        .into_iter()
        .find(|(name, _)| name == "version")
        .map(|(_, value)| value))
}

/// Attributes of `e` as unescaped `(local name, value)` pairs, namespace
/// declarations excluded.
fn read_attributes(e: &BytesStart<'_>) -> Result<Vec<(String, String)>, XmlError> {
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| XmlError::Schema(format!("invalid attribute: {err}")))?;
        let key = attr.key.as_ref();
        if key == b"xmlns" || key.starts_with(b"xmlns:") {
            continue;
        }
        let name = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|err| XmlError::Schema(format!("invalid value of attribute '{name}': {err}")))?
            .into_owned();
        attributes.push((name, value));
    }
    Ok(attributes)
}

/// Parse the children of the root element up to and including its end tag.
fn parse_comments(reader: &mut NsReader<&[u8]>) -> Result<Vec<Comment>, XmlError> {
    let mut comments = Vec::new();

    loop {
        match read_event(reader)? {
            (Event::Start(e), foreign) => {
                let (pattern, file, line) = comment_attributes(&e, foreign)?;
                let text = parse_comment_body(reader)?;
                comments.push(Comment::new(pattern, file, line, text));
            }
            (Event::Empty(e), foreign) => {
                let (pattern, file, line) = comment_attributes(&e, foreign)?;
                comments.push(Comment::new(pattern, file, line, String::new()));
            }
            (Event::End(_), _) => return Ok(comments),
            (Event::Text(t), _) if is_blank(&t) => {}
            (Event::Text(_) | Event::CData(_), _) => {
                return Err(XmlError::Schema(
                    "unexpected text between comment elements".to_string(),
                ));
            }
            (Event::Eof, _) => {
                return Err(XmlError::Schema(
                    "unexpected end of document inside 'comments'".to_string(),
                ));
            }
            _ => {}
        }
    }
}

fn comment_attributes(
    e: &BytesStart<'_>,
    foreign: Option<String>,
) -> Result<(String, String, i32), XmlError> {
    if e.local_name().as_ref() != COMMENT_ELEMENT {
        return Err(XmlError::Schema(format!(
            "unexpected element '{}' inside 'comments'",
            String::from_utf8_lossy(e.name().as_ref())
        )));
    }
    check_namespace(e, foreign)?;

    let mut pattern = None;
    let mut file = None;
    let mut line = None;
    for (name, value) in read_attributes(e)? {
        match name.as_str() {
            "pattern" => pattern = Some(value),
            "file" => file = Some(value),
            "line" => line = Some(value),
            _ => {}
        }
    }

    let pattern = pattern.ok_or_else(|| missing_attribute("pattern"))?;
    let file = file.ok_or_else(|| missing_attribute("file"))?;
    let line = line.ok_or_else(|| missing_attribute("line"))?;
    let line: i32 = line.trim().parse().map_err(|_| {
        XmlError::Schema(format!(
            "attribute 'line' of comment in '{file}' is not an integer: '{line}'"
        ))
    })?;

    Ok((pattern, file, line))
}

fn missing_attribute(name: &str) -> XmlError {
    XmlError::Schema(format!("comment is missing required attribute '{name}'"))
}

/// Collect the text of a `comment` element up to its end tag.
fn parse_comment_body(reader: &mut NsReader<&[u8]>) -> Result<String, XmlError> {
    let mut text = String::new();

    loop {
        match read_event(reader)?.0 {
            Event::Text(t) => {
                let unescaped = t.unescape().map_err(|err| malformed(reader, err))?;
                text.push_str(&unescaped);
            }
            Event::CData(c) => {
                let raw = c.into_inner();
                let chunk = std::str::from_utf8(&raw).map_err(|_| {
                    XmlError::Schema("CDATA section is not valid UTF-8".to_string())
                })?;
                text.push_str(chunk);
            }
            Event::End(_) => return Ok(text),
            Event::Start(e) | Event::Empty(e) => {
                return Err(XmlError::Schema(format!(
                    "unexpected element '{}' inside 'comment'",
                    String::from_utf8_lossy(e.name().as_ref())
                )));
            }
            Event::Eof => {
                return Err(XmlError::Schema(
                    "unexpected end of document inside 'comment'".to_string(),
                ));
            }
            _ => {}
        }
    }
}

// ============================================================================
// Port Implementation
// ============================================================================

/// [`ReportParser`] backed by [`parse_report_file`].
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlReportParser;

impl ReportParser for XmlReportParser {
    type Error = XmlError;

    fn parse_file(&self, path: &Path) -> Result<Report, XmlError> {
        parse_report_file(path)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- generated by the scanner -->
<comments xmlns="http://todos.sourceforge.net" version="1.0">
  <comment pattern="TODO" file="src/Main.java" line="12">// TODO: remove</comment>
  <comment pattern="FIXME" file="src/Util.java" line="3">/* FIXME: a &lt; b &amp;&amp; c */</comment>
</comments>
"#;

    #[test]
    fn test_parse_sample() {
        let report = parse_report(SAMPLE).unwrap();

        assert_eq!(report.version(), Some("1.0"));
        assert_eq!(report.comments_count(), 2);

        let first = &report.comments()[0];
        assert_eq!(first.pattern, "TODO");
        assert_eq!(first.file, "src/Main.java");
        assert_eq!(first.line, 12);
        assert_eq!(first.source_code, "// TODO: remove");
        assert_eq!(first.diff_status, None);

        assert_eq!(report.comments()[1].source_code, "/* FIXME: a < b && c */");
    }

    #[test]
    fn test_parse_without_namespace_or_version() {
        let report =
            parse_report(r#"<comments><comment pattern="TODO" file="a" line="1">x</comment></comments>"#)
                .unwrap();
        assert_eq!(report.version(), None);
        assert_eq!(report.comments_count(), 1);
    }

    #[test]
    fn test_parse_prefixed_namespace() {
        let xml = format!(
            r#"<t:comments xmlns:t="{TODOS_NAMESPACE}" version="2">
  <t:comment pattern="TODO" file="a" line="1">x</t:comment>
</t:comments>"#
        );
        let report = parse_report(&xml).unwrap();
        assert_eq!(report.version(), Some("2"));
        assert_eq!(report.comments()[0].pattern, "TODO");
    }

    #[test]
    fn test_foreign_namespace_is_schema_error() {
        let err = parse_report(r#"<x:comments xmlns:x="urn:other"/>"#).unwrap_err();
        assert!(matches!(err, XmlError::Schema(ref msg) if msg.contains("urn:other")));

        let err = parse_report(r#"<comments xmlns="urn:other"/>"#).unwrap_err();
        assert!(matches!(err, XmlError::Schema(_)));

        let xml = format!(
            r#"<comments xmlns="{TODOS_NAMESPACE}" xmlns:x="urn:other">
  <x:comment pattern="TODO" file="a" line="1">x</x:comment>
</comments>"#
        );
        let err = parse_report(&xml).unwrap_err();
        assert!(matches!(err, XmlError::Schema(ref msg) if msg.contains("'x:comment'")));
    }

    #[test]
    fn test_undeclared_prefix_is_schema_error() {
        let err = parse_report("<t:comments/>").unwrap_err();
        assert!(matches!(err, XmlError::Schema(ref msg) if msg.contains("undeclared prefix 't'")));
    }

    #[test]
    fn test_parse_keeps_multiline_text_verbatim() {
        let xml = "<comments><comment pattern=\"TODO\" file=\"a\" line=\"1\">  // TODO: one\n  next line  \n</comment></comments>";
        let report = parse_report(xml).unwrap();
        assert_eq!(report.comments()[0].source_code, "  // TODO: one\n  next line  \n");
    }

    #[test]
    fn test_parse_cdata_and_text_are_joined() {
        let xml = r#"<comments><comment pattern="TODO" file="a" line="1">a <![CDATA[<b>]]> c</comment></comments>"#;
        let report = parse_report(xml).unwrap();
        assert_eq!(report.comments()[0].source_code, "a <b> c");
    }

    #[test]
    fn test_parse_empty_root() {
        let report = parse_report(r#"<comments version="1.0"/>"#).unwrap();
        assert_eq!(report.comments_count(), 0);
        assert_eq!(report.version(), Some("1.0"));
    }

    #[test]
    fn test_parse_self_closing_comment() {
        let report =
            parse_report(r#"<comments><comment pattern="TODO" file="a" line="-1"/></comments>"#)
                .unwrap();
        let comment = &report.comments()[0];
        assert_eq!(comment.line, -1);
        assert_eq!(comment.source_code, "");
    }

    #[test]
    fn test_parse_line_with_whitespace() {
        let report =
            parse_report(r#"<comments><comment pattern="TODO" file="a" line=" 7 ">x</comment></comments>"#)
                .unwrap();
        assert_eq!(report.comments()[0].line, 7);
    }

    #[test]
    fn test_missing_attribute_is_schema_error() {
        let err = parse_report(r#"<comments><comment pattern="TODO" line="1">x</comment></comments>"#)
            .unwrap_err();
        assert!(matches!(err, XmlError::Schema(ref msg) if msg.contains("'file'")));
    }

    #[test]
    fn test_non_integer_line_is_schema_error() {
        let err =
            parse_report(r#"<comments><comment pattern="TODO" file="a" line="ten">x</comment></comments>"#)
                .unwrap_err();
        assert!(matches!(err, XmlError::Schema(ref msg) if msg.contains("not an integer")));
    }

    #[test]
    fn test_wrong_root_is_schema_error() {
        let err = parse_report("<todos/>").unwrap_err();
        assert!(matches!(err, XmlError::Schema(ref msg) if msg.contains("'todos'")));
    }

    #[test]
    fn test_unknown_child_is_schema_error() {
        let err = parse_report("<comments><note/></comments>").unwrap_err();
        assert!(matches!(err, XmlError::Schema(_)));
    }

    #[test]
    fn test_nested_element_in_comment_is_schema_error() {
        let err = parse_report(
            r#"<comments><comment pattern="TODO" file="a" line="1">x<b/></comment></comments>"#,
        )
        .unwrap_err();
        assert!(matches!(err, XmlError::Schema(_)));
    }

    #[test]
    fn test_second_root_is_schema_error() {
        let err = parse_report("<comments/><comments/>").unwrap_err();
        assert!(matches!(err, XmlError::Schema(ref msg) if msg.contains("more than one")));
    }

    #[test]
    fn test_empty_document_is_schema_error() {
        assert!(matches!(parse_report("").unwrap_err(), XmlError::Schema(_)));
        assert!(matches!(
            parse_report("<?xml version=\"1.0\"?>\n").unwrap_err(),
            XmlError::Schema(_)
        ));
    }

    #[test]
    fn test_mismatched_end_tag_is_malformed() {
        let err = parse_report(
            r#"<comments><comment pattern="TODO" file="a" line="1">x</commentz></comments>"#,
        )
        .unwrap_err();
        assert!(matches!(err, XmlError::Malformed { .. }));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_truncated_document_is_error() {
        assert!(parse_report(r#"<comments><comment pattern="TODO" file="a" line="1">x"#).is_err());
    }

    #[test]
    fn test_parse_report_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("todos.xml");
        std::fs::write(&path, SAMPLE).unwrap();

        let report = XmlReportParser.parse_file(&path).unwrap();
        assert_eq!(report.comments_count(), 2);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = parse_report_file(&dir.path().join("missing.xml")).unwrap_err();

        assert!(matches!(err, XmlError::Io { ref path, .. } if path.ends_with("missing.xml")));
        assert!(err.source().is_some());
    }
}
