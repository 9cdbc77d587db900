/// Structural XLSX comparison
///
/// Two workbooks are equivalent when they contain the same members and each
/// member carries the same content once volatile metadata is removed:
///
/// - creation/modification timestamps in `docProps/core.xml`
/// - window geometry (`workbookView`) and calculation engine ids (`calcPr`)
/// - printer settings Excel adds to worksheet `pageSetup`
/// - chart `pageMargins`
/// - the order of entries in `[Content_Types].xml` and `*.rels`
///
/// XML members are compared as lists of canonical tags, so insignificant
/// whitespace between elements and inside tags does not matter. Binary
/// members (images, VBA projects) are compared byte for byte.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Cursor, Read};

use exediff_common::types::{ComparisonResult, IgnoreRules, Mismatch};
use lazy_static::lazy_static;
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use regex::Regex;
use tracing::debug;

use crate::error::CompareError;

/// Tags of context shown on each side of the first difference
const CONTEXT_TAGS: usize = 3;

/// Upper bound on buffer preallocation; sizes in ZIP headers are not trusted
const MAX_PREALLOC: u64 = 1 << 20;

const BINARY_EXTENSIONS: &[&str] = &["png", "jpeg", "jpg", "bmp", "gif", "wmf", "emf", "tiff", "bin"];

lazy_static! {
    static ref ISO_TIMESTAMP: Regex = Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}Z").unwrap();
    static ref WORKBOOK_VIEW: Regex = Regex::new(r"<workbookView[^>]*>").unwrap();
    static ref CALC_PR: Regex = Regex::new(r"<calcPr[^>]*>").unwrap();
    static ref WORKSHEET_PART: Regex = Regex::new(r"^xl/worksheets/sheet\d+\.xml$").unwrap();
    static ref PAGE_SETUP_RID: Regex = Regex::new(r#"(<pageSetup[^>]*) r:id="rId1""#).unwrap();
    static ref CHART_PART: Regex = Regex::new(r"^xl/charts/chart\d+\.xml$").unwrap();
    static ref CHART_PAGE_MARGINS: Regex = Regex::new(r"<c:pageMargins[^>]*>").unwrap();
}

/// Compiled form of a case's [`IgnoreRules`]
#[derive(Debug, Default)]
pub struct IgnoreMatcher {
    files: HashSet<String>,
    elements: HashMap<String, Vec<Regex>>,
}

impl IgnoreMatcher {
    /// Patterns are anchored at the start of the tag (`<c:style` drops every
    /// tag beginning with `<c:style`)
    pub fn compile(rules: &IgnoreRules) -> Result<Self, CompareError> {
        let mut elements = HashMap::new();
        for (part, patterns) in &rules.elements {
            let compiled = patterns
                .iter()
                .map(|pattern| {
                    Regex::new(&format!("^(?:{})", pattern)).map_err(|source| {
                        CompareError::InvalidPattern {
                            part: part.clone(),
                            pattern: pattern.clone(),
                            source,
                        }
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            elements.insert(part.clone(), compiled);
        }

        Ok(Self {
            files: rules.files.iter().cloned().collect(),
            elements,
        })
    }

    fn skips_file(&self, name: &str) -> bool {
        self.files.contains(name)
    }

    fn filter(&self, part: &str, tags: Vec<String>) -> Vec<String> {
        match self.elements.get(part) {
            Some(patterns) => tags
                .into_iter()
                .filter(|tag| !patterns.iter().any(|p| p.is_match(tag)))
                .collect(),
            None => tags,
        }
    }
}

/// Compare two XLSX files structurally
///
/// Unreadable archives are reported as mismatches rather than errors: a
/// corrupt output or reference is a failed comparison.
pub fn compare_xlsx(got: &[u8], expected: &[u8], ignore: &IgnoreMatcher) -> ComparisonResult {
    if got == expected {
        return ComparisonResult::matched();
    }

    let got_members = match read_members(got) {
        Ok(members) => members,
        Err(e) => {
            return ComparisonResult::mismatch(Mismatch::new(format!(
                "output is not a readable XLSX archive: {}",
                e
            )))
        }
    };
    let expected_members = match read_members(expected) {
        Ok(members) => members,
        Err(e) => {
            return ComparisonResult::mismatch(Mismatch::new(format!(
                "reference is not a readable XLSX archive: {}",
                e
            )))
        }
    };

    let got_names: Vec<&String> = got_members.keys().filter(|n| !ignore.skips_file(n)).collect();
    let expected_names: Vec<&String> = expected_members
        .keys()
        .filter(|n| !ignore.skips_file(n))
        .collect();

    if got_names != expected_names {
        return ComparisonResult::mismatch(
            Mismatch::new(format!(
                "archive members differ ({} vs {})",
                got_names.len(),
                expected_names.len()
            ))
            .with_context(
                got_names.iter().map(|n| n.to_string()).collect(),
                expected_names.iter().map(|n| n.to_string()).collect(),
            ),
        );
    }

    for name in got_names {
        if let Some(mismatch) = compare_member(name, &got_members[name], &expected_members[name], ignore) {
            debug!(part = %name, "XLSX member differs");
            return ComparisonResult::mismatch(mismatch);
        }
    }

    ComparisonResult::matched()
}

/// Read every file member of a ZIP container, keyed (and so sorted) by name
fn read_members(bytes: &[u8]) -> zip::result::ZipResult<BTreeMap<String, Vec<u8>>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes))?;
    let mut members = BTreeMap::new();

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut contents = Vec::with_capacity(file.size().min(MAX_PREALLOC) as usize);
        file.read_to_end(&mut contents)?;
        members.insert(name, contents);
    }

    Ok(members)
}

fn is_binary(name: &str) -> bool {
    name.rsplit_once('.')
        .map(|(_, ext)| BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn compare_member(name: &str, got: &[u8], expected: &[u8], ignore: &IgnoreMatcher) -> Option<Mismatch> {
    if is_binary(name) {
        if got == expected {
            return None;
        }
        return Some(
            Mismatch::new(format!(
                "binary content differs ({} bytes vs {} bytes)",
                got.len(),
                expected.len()
            ))
            .in_part(name),
        );
    }

    let (got_xml, expected_xml) = strip_volatile(
        name,
        String::from_utf8_lossy(got).into_owned(),
        String::from_utf8_lossy(expected).into_owned(),
    );
    if got_xml == expected_xml {
        return None;
    }

    let (got_tags, expected_tags) = if name.ends_with(".vml") {
        (vml_to_tags(&got_xml), vml_to_tags(&expected_xml))
    } else {
        let got_tags = match xml_to_tags(&got_xml) {
            Ok(tags) => tags,
            Err(e) => {
                return Some(Mismatch::new(format!("output is not well-formed XML: {}", e)).in_part(name))
            }
        };
        let expected_tags = match xml_to_tags(&expected_xml) {
            Ok(tags) => tags,
            Err(e) => {
                return Some(
                    Mismatch::new(format!("reference is not well-formed XML: {}", e)).in_part(name),
                )
            }
        };
        (got_tags, expected_tags)
    };

    let mut got_tags = ignore.filter(name, got_tags);
    let mut expected_tags = ignore.filter(name, expected_tags);

    if name == "[Content_Types].xml" || name.ends_with(".rels") {
        sort_relationship_tags(&mut got_tags);
        sort_relationship_tags(&mut expected_tags);
    }

    if got_tags == expected_tags {
        None
    } else {
        Some(divergence(name, &got_tags, &expected_tags))
    }
}

/// Remove metadata that legitimately differs between otherwise equal files
///
/// Printer settings only ever appear in the Excel-authored reference, so they
/// are stripped from that side alone.
fn strip_volatile(name: &str, got: String, expected: String) -> (String, String) {
    if name == "docProps/core.xml" {
        return (
            ISO_TIMESTAMP.replace_all(&got, "").into_owned(),
            ISO_TIMESTAMP.replace_all(&expected, "").into_owned(),
        );
    }

    if name == "xl/workbook.xml" {
        let collapse = |xml: &str| {
            let xml = WORKBOOK_VIEW.replace_all(xml, "<workbookView/>");
            CALC_PR.replace_all(&xml, "<calcPr/>").into_owned()
        };
        return (collapse(&got), collapse(&expected));
    }

    if WORKSHEET_PART.is_match(name) {
        let expected = expected
            .replace(r#"horizontalDpi="200" "#, "")
            .replace(r#"verticalDpi="200" "#, "");
        let expected = PAGE_SETUP_RID.replace_all(&expected, "$1").into_owned();
        return (got, expected);
    }

    if CHART_PART.is_match(name) {
        return (
            CHART_PAGE_MARGINS.replace_all(&got, "<c:pageMargins/>").into_owned(),
            CHART_PAGE_MARGINS.replace_all(&expected, "<c:pageMargins/>").into_owned(),
        );
    }

    (got, expected)
}

/// Tokenize XML into canonical tags
///
/// Start and empty tags are re-rendered as `name attr="value" ...` with a
/// single space between items; whitespace-only text is dropped; comments and
/// doctypes are skipped.
pub fn xml_to_tags(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut tags = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) => tags.push(format!("<{}>", render_start(&e)?)),
            Event::Empty(e) => tags.push(format!("<{}/>", render_start(&e)?)),
            Event::End(e) => tags.push(format!("</{}>", String::from_utf8_lossy(e.name().as_ref()))),
            Event::Text(e) => {
                let text = e.unescape()?;
                if !text.trim().is_empty() {
                    tags.push(text.into_owned());
                }
            }
            Event::CData(e) => tags.push(format!("<![CDATA[{}]]>", String::from_utf8_lossy(&e))),
            Event::Decl(e) => tags.push(format!("<?{}?>", String::from_utf8_lossy(&e))),
            Event::PI(e) => tags.push(format!("<?{}?>", String::from_utf8_lossy(&e))),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(tags)
}

fn render_start(e: &BytesStart) -> Result<String, quick_xml::Error> {
    let mut tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    for attr in e.attributes() {
        let attr = attr?;
        tag.push(' ');
        tag.push_str(&String::from_utf8_lossy(attr.key.as_ref()));
        tag.push_str("=\"");
        tag.push_str(&String::from_utf8_lossy(&attr.value));
        tag.push('"');
    }
    Ok(tag)
}

/// Tokenize VML, which Excel writes as loosely formatted, not quite XML
///
/// Lines are trimmed and joined, single quotes become double quotes and the
/// result is split between adjacent tags.
pub fn vml_to_tags(vml: &str) -> Vec<String> {
    let mut joined = String::new();

    for line in vml.replace('\r', "").split('\n') {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut line = line.replace('\'', "\"");
        // Attribute list continues on the next line
        if line.ends_with('"') {
            line.push(' ');
        }
        if line.ends_with('>') {
            line.push('\n');
        }
        let line = line.replace("><", ">\n<");

        if line == "<x:Anchor>\n" {
            joined.push_str(line.trim());
        } else {
            joined.push_str(&line);
        }
    }

    joined
        .trim_end()
        .split('\n')
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Entry order in relationship and content-type files is irrelevant; sort
/// everything between the first and last tag
fn sort_relationship_tags(tags: &mut [String]) {
    if tags.len() > 2 {
        let last = tags.len() - 1;
        tags[1..last].sort();
    }
}

fn divergence(part: &str, got: &[String], expected: &[String]) -> Mismatch {
    let index = got
        .iter()
        .zip(expected)
        .position(|(g, e)| g != e)
        .unwrap_or_else(|| got.len().min(expected.len()));

    let start = index.saturating_sub(CONTEXT_TAGS);
    let window = |tags: &[String]| -> Vec<String> {
        tags.iter()
            .skip(start)
            .take(CONTEXT_TAGS * 2 + 1)
            .cloned()
            .collect()
    };

    Mismatch::new(format!(
        "XML differs at tag {} ({} tags vs {} tags)",
        index + 1,
        got.len(),
        expected.len()
    ))
    .in_part(part)
    .with_context(window(got), window(expected))
}
