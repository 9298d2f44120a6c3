//! Plain-text extraction from supporting documents attached to a prompt.

use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek};
use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use quick_xml::events::Event;
use quick_xml::Reader as XmlReader;
use tracing::{debug, info};
use zip::ZipArchive;

use crate::error::{GenieError, Result};

/// Extensions accepted for attachment, lowercase with the dot.
pub const ALLOWED_EXTENSIONS: [&str; 5] = [".docx", ".xlsx", ".pdf", ".pptx", ".xls"];

/// A document whose text goes along with the next prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub path: PathBuf,
    pub name: String,
    pub text: String,
}

impl Attachment {
    pub fn load(path: &Path) -> Result<Self> {
        let text = extract_text(path)?;
        info!(file = %path.display(), chars = text.len(), "attachment loaded");
        Ok(Self {
            path: path.to_path_buf(),
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            text,
        })
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn is_supported(path: &Path) -> bool {
    ALLOWED_EXTENSIONS.contains(&extension(path).as_str())
}

/// Extract the text of a docx, pptx, pdf, xlsx or xls file.
pub fn extract_text(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(GenieError::Attachment(format!(
            "The specified file does not exist: {}",
            path.display()
        )));
    }
    let ext = extension(path);
    match ext.as_str() {
        ".docx" => {
            let mut archive = open_zip(path)?;
            xml_text(&mut archive, "word/document.xml", b"w:t", b"w:p")
        }
        ".pptx" => pptx_text(path),
        ".xlsx" | ".xls" => spreadsheet_text(path),
        ".pdf" => pdf_text(path),
        _ => Err(GenieError::Attachment(format!(
            "File type {ext} is not supported."
        ))),
    }
}

fn open_zip(path: &Path) -> Result<ZipArchive<BufReader<File>>> {
    let file = File::open(path)?;
    ZipArchive::new(BufReader::new(file))
        .map_err(|e| GenieError::Attachment(format!("{}: {e}", path.display())))
}

/// Text inside `text_tag` elements of one archive member, with a newline
/// after every `block_tag`.
fn xml_text<R: Read + Seek>(
    archive: &mut ZipArchive<R>,
    member: &str,
    text_tag: &[u8],
    block_tag: &[u8],
) -> Result<String> {
    let entry = archive
        .by_name(member)
        .map_err(|e| GenieError::Attachment(format!("{member}: {e}")))?;
    collect_text(BufReader::new(entry), text_tag, block_tag)
        .map_err(|e| GenieError::Attachment(format!("{member}: {e}")))
}

fn collect_text<R: BufRead>(
    reader: R,
    text_tag: &[u8],
    block_tag: &[u8],
) -> std::result::Result<String, quick_xml::Error> {
    let mut xml = XmlReader::from_reader(reader);
    let mut buf = Vec::new();
    let mut text = String::new();
    let mut in_text = false;
    let mut block_has_text = false;

    loop {
        match xml.read_event_into(&mut buf)? {
            Event::Start(e) if e.name().as_ref() == text_tag => in_text = true,
            Event::End(e) if e.name().as_ref() == text_tag => in_text = false,
            Event::End(e) if e.name().as_ref() == block_tag => {
                if block_has_text {
                    text.push('\n');
                    block_has_text = false;
                }
            }
            Event::Text(e) if in_text => {
                text.push_str(&e.unescape()?);
                block_has_text = true;
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }
    Ok(text.trim_end().to_string())
}

/// One line per page, in page order.
fn pdf_text(path: &Path) -> Result<String> {
    let attachment_error = |e: lopdf::Error| GenieError::Attachment(format!("{}: {e}", path.display()));
    let document = lopdf::Document::load(path).map_err(attachment_error)?;

    let mut text = String::new();
    for page in document.get_pages().into_keys() {
        let page_text = document.extract_text(&[page]).map_err(attachment_error)?;
        text.push_str(page_text.trim_end());
        text.push('\n');
    }
    debug!(pages = document.get_pages().len(), "pdf text extracted");
    Ok(text)
}

fn pptx_text(path: &Path) -> Result<String> {
    let mut archive = open_zip(path)?;
    let mut slides: Vec<(u32, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slides.sort();
    debug!(slides = slides.len(), "extracting presentation text");

    let mut text = String::new();
    for (_, member) in &slides {
        let slide = xml_text(&mut archive, member, b"a:t", b"a:p")?;
        text.push_str(&slide.replace('\n', " "));
        text.push('\n');
    }
    Ok(text)
}

fn spreadsheet_text(path: &Path) -> Result<String> {
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| GenieError::Attachment(format!("{}: {e}", path.display())))?;

    let mut text = String::new();
    for sheet in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&sheet)
            .map_err(|e| GenieError::Attachment(format!("{sheet}: {e}")))?;
        let Some((first_row, first_col)) = range.start() else {
            continue;
        };
        for (row, col, value) in range.used_cells() {
            if matches!(value, Data::Empty) {
                continue;
            }
            let value = value.to_string();
            if value.is_empty() {
                continue;
            }
            let reference = cell_reference(first_row + row as u32, first_col + col as u32);
            text.push_str(&format!("{reference}: {value}\n"));
        }
    }
    Ok(text)
}

/// A1-style reference for zero-based `row` and `col`.
pub fn cell_reference(row: u32, col: u32) -> String {
    let mut letters = Vec::new();
    let mut n = col + 1;
    while n > 0 {
        let rem = (n - 1) % 26;
        letters.push(b'A' + rem as u8);
        n = (n - 1) / 26;
    }
    letters.reverse();
    format!("{}{}", String::from_utf8_lossy(&letters), row + 1)
}
