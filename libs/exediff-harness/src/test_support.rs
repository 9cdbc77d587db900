/// Fixtures shared by the harness test modules

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

/// Members of a small but realistic chart workbook
pub(crate) fn workbook_parts(created: &str) -> Vec<(String, Vec<u8>)> {
    let parts: Vec<(&str, String)> = vec![
        (
            "[Content_Types].xml",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#, "\n",
                r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
                r#"<Default Extension="png" ContentType="image/png"/>"#,
                r#"<Default Extension="xml" ContentType="application/xml"/>"#,
                r#"<Override PartName="/xl/workbook.xml" ContentType="application/vnd.openxmlformats-officedocument.spreadsheetml.sheet.main+xml"/>"#,
                r#"<Override PartName="/xl/charts/chart1.xml" ContentType="application/vnd.openxmlformats-officedocument.drawingml.chart+xml"/>"#,
                r#"</Types>"#
            )
            .to_string(),
        ),
        (
            "_rels/.rels",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#, "\n",
                r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
                r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>"#,
                r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="xl/workbook.xml"/>"#,
                r#"</Relationships>"#
            )
            .to_string(),
        ),
        (
            "docProps/core.xml",
            format!(
                concat!(
                    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#, "\n",
                    r#"<cp:coreProperties xmlns:cp="http://schemas.openxmlformats.org/package/2006/metadata/core-properties" xmlns:dcterms="http://purl.org/dc/terms/">"#,
                    r#"<dcterms:created>{created}</dcterms:created>"#,
                    r#"<dcterms:modified>{created}</dcterms:modified>"#,
                    r#"</cp:coreProperties>"#
                ),
                created = created
            ),
        ),
        (
            "xl/workbook.xml",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#, "\n",
                r#"<workbook xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
                r#"<bookViews><workbookView xWindow="240" yWindow="15" windowWidth="16095" windowHeight="9660"/></bookViews>"#,
                r#"<sheets><sheet name="Sheet1" sheetId="1" r:id="rId1"/></sheets>"#,
                r#"<calcPr calcId="124519" fullCalcOnLoad="1"/>"#,
                r#"</workbook>"#
            )
            .to_string(),
        ),
        (
            "xl/worksheets/sheet1.xml",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#, "\n",
                r#"<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
                r#"<sheetData><row r="1"><c r="A1"><v>1</v></c><c r="B1"><v>2</v></c></row></sheetData>"#,
                r#"<pageMargins left="0.7" right="0.7" top="0.75" bottom="0.75" header="0.3" footer="0.3"/>"#,
                r#"</worksheet>"#
            )
            .to_string(),
        ),
        (
            "xl/charts/chart1.xml",
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#, "\n",
                r#"<c:chartSpace xmlns:c="http://schemas.openxmlformats.org/drawingml/2006/chart">"#,
                r#"<c:chart><c:plotArea><c:layout><c:manualLayout>"#,
                r#"<c:layoutTarget val="inner"/><c:xMode val="edge"/><c:yMode val="edge"/>"#,
                r#"<c:x val="0.13171062992125984"/><c:y val="0.26436351706036748"/>"#,
                r#"</c:manualLayout></c:layout></c:plotArea></c:chart>"#,
                r#"<c:printSettings><c:pageMargins b="0.75" l="0.7" r="0.7" t="0.75" header="0.3" footer="0.3"/></c:printSettings>"#,
                r#"</c:chartSpace>"#
            )
            .to_string(),
        ),
    ];

    let mut parts: Vec<(String, Vec<u8>)> = parts
        .into_iter()
        .map(|(name, xml)| (name.to_string(), xml.into_bytes()))
        .collect();
    parts.push((
        "xl/media/image1.png".to_string(),
        vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0x0d],
    ));
    parts
}

/// Pack members into a ZIP container, in the given order
pub(crate) fn build_xlsx(parts: &[(String, Vec<u8>)]) -> Vec<u8> {
    build_xlsx_with(parts, zip::CompressionMethod::Deflated)
}

/// Uncompressed container, so member text can be located in the raw bytes
pub(crate) fn build_xlsx_stored(parts: &[(String, Vec<u8>)]) -> Vec<u8> {
    build_xlsx_with(parts, zip::CompressionMethod::Stored)
}

fn build_xlsx_with(parts: &[(String, Vec<u8>)], method: zip::CompressionMethod) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default().compression_method(method);
    for (name, bytes) in parts {
        zip.start_file(name.as_str(), options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap().into_inner()
}

/// Replace the contents of one member
pub(crate) fn set_part(parts: &mut [(String, Vec<u8>)], name: &str, contents: &str) {
    let entry = parts
        .iter_mut()
        .find(|(n, _)| n == name)
        .unwrap_or_else(|| panic!("no part named {}", name));
    entry.1 = contents.as_bytes().to_vec();
}

/// Flip one byte of `needle` inside a stored container
pub(crate) fn corrupt_stored(bytes: &mut [u8], needle: &str) {
    let offset = bytes
        .windows(needle.len())
        .position(|w| w == needle.as_bytes())
        .unwrap_or_else(|| panic!("{} not found in container", needle));
    bytes[offset + needle.len() - 1] ^= 0x01;
}

pub(crate) fn part_text(parts: &[(String, Vec<u8>)], name: &str) -> String {
    let (_, bytes) = parts.iter().find(|(n, _)| n == name).unwrap();
    String::from_utf8(bytes.clone()).unwrap()
}

/// Write an executable `/bin/sh` script standing in for a compiled test program
#[cfg(unix)]
pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    {
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"#!/bin/sh\n").unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.sync_all().unwrap();
    }
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
