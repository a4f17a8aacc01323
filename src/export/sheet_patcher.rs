//! Patches edited cells into existing worksheet XML.
//!
//! The original XML streams through unchanged apart from rows that carry
//! edits. Edited cells are written as inline strings (`t="inlineStr"`), so the
//! shared string table never needs rebuilding. Missing rows and cells are
//! inserted in row/column order.

use std::collections::{btree_map, BTreeMap};
use std::iter::Peekable;
use std::vec;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::cell_ref::{cell_ref, parse_cell_ref};
use crate::error::{Result, XlimagesError};
use crate::types::CellCoordinate;
use crate::xml_helpers::{attr_string, attr_u32};

type RowEdits<'a> = BTreeMap<u32, Vec<(u32, &'a str)>>;

/// Rewrite `xml` with every edit applied.
///
/// # Errors
/// Returns [`XlimagesError::XmlParse`] if the worksheet is malformed.
pub(crate) fn patch_sheet_xml(
    path: &str,
    xml: &str,
    edits: &BTreeMap<CellCoordinate, String>,
) -> Result<Vec<u8>> {
    let mut rows: RowEdits<'_> = BTreeMap::new();
    for (at, value) in edits {
        rows.entry(at.row).or_default().push((at.col, value.as_str()));
    }

    let mut reader = Reader::from_str(xml);
    reader.trim_text(false);
    let mut patcher = SheetPatcher::new(rows, xml.len());

    loop {
        let event = reader.read_event().map_err(|e| XlimagesError::XmlParse {
            path: path.to_string(),
            content: xml.to_string(),
            message: format!("at byte {}: {e}", reader.buffer_position()),
        })?;
        if matches!(event, Event::Eof) {
            break;
        }
        patcher.handle(&event)?;
    }

    Ok(patcher.finish())
}

struct SheetPatcher<'a> {
    writer: Writer<Vec<u8>>,
    rows: Peekable<btree_map::IntoIter<u32, Vec<(u32, &'a str)>>>,
    /// Edits still to place in the row being streamed
    cells: Peekable<vec::IntoIter<(u32, &'a str)>>,
    /// Namespace prefix used by the sheet's own elements, e.g. "x:"
    prefix: String,
    in_sheet_data: bool,
    seen_sheet_data: bool,
    in_edited_row: bool,
    current_row: Option<u32>,
    next_col: u32,
    /// Depth inside a replaced `<c>` whose content is dropped
    skip_depth: usize,
}

impl<'a> SheetPatcher<'a> {
    fn new(rows: RowEdits<'a>, capacity: usize) -> Self {
        Self {
            writer: Writer::new(Vec::with_capacity(capacity)),
            rows: rows.into_iter().peekable(),
            cells: Vec::new().into_iter().peekable(),
            prefix: String::new(),
            in_sheet_data: false,
            seen_sheet_data: false,
            in_edited_row: false,
            current_row: None,
            next_col: 0,
            skip_depth: 0,
        }
    }

    fn finish(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    fn handle(&mut self, event: &Event<'_>) -> Result<()> {
        if self.skip_depth > 0 {
            match event {
                Event::Start(_) => self.skip_depth += 1,
                Event::End(_) => self.skip_depth -= 1,
                _ => {}
            }
            return Ok(());
        }

        match event {
            Event::Start(e) | Event::Empty(e) => {
                let is_empty = matches!(event, Event::Empty(_));
                match e.local_name().as_ref() {
                    b"sheetData" => {
                        self.prefix = prefix_of(e.name().as_ref());
                        self.seen_sheet_data = true;
                        if is_empty {
                            self.writer.write_event(Event::Start(e.borrow()))?;
                            self.write_remaining_rows()?;
                            self.writer
                                .write_event(Event::End(BytesEnd::new(qualified_name(e))))?;
                        } else {
                            self.in_sheet_data = true;
                            self.writer.write_event(event.borrow())?;
                        }
                    }
                    b"row" if self.in_sheet_data => self.open_row(e, is_empty)?,
                    b"c" if self.in_edited_row => self.open_cell(e, is_empty)?,
                    _ => self.writer.write_event(event.borrow())?,
                }
            }
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"sheetData" if self.in_sheet_data => {
                        self.write_remaining_rows()?;
                        self.in_sheet_data = false;
                    }
                    b"row" if self.in_edited_row => {
                        self.write_remaining_cells()?;
                        self.in_edited_row = false;
                    }
                    b"worksheet" if !self.seen_sheet_data => {
                        self.prefix = prefix_of(e.name().as_ref());
                        self.seen_sheet_data = true;
                        let name = format!("{}sheetData", self.prefix);
                        self.writer
                            .write_event(Event::Start(BytesStart::new(name.as_str())))?;
                        self.write_remaining_rows()?;
                        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
                    }
                    _ => {}
                }
                self.writer.write_event(event.borrow())?;
            }
            _ => self.writer.write_event(event.borrow())?,
        }
        Ok(())
    }

    fn open_row(&mut self, e: &BytesStart<'_>, is_empty: bool) -> Result<()> {
        let row = attr_u32(e, b"r")
            .and_then(|r| r.checked_sub(1))
            .unwrap_or_else(|| self.current_row.map_or(0, |r| r.saturating_add(1)));
        self.current_row = Some(row);
        self.next_col = 0;

        self.write_rows_before(row)?;

        let Some((_, cells)) = self.rows.next_if(|(r, _)| *r == row) else {
            let event = if is_empty {
                Event::Empty(e.borrow())
            } else {
                Event::Start(e.borrow())
            };
            self.writer.write_event(event)?;
            return Ok(());
        };

        // Cell spans are a load hint; drop them rather than keep a stale one.
        let name = qualified_name(e);
        let mut start = BytesStart::new(name.as_str());
        for attr in e.attributes().flatten() {
            if attr.key.as_ref() != b"spans" {
                start.push_attribute(attr);
            }
        }
        self.writer.write_event(Event::Start(start))?;

        self.cells = cells.into_iter().peekable();
        if is_empty {
            self.write_remaining_cells()?;
            self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        } else {
            self.in_edited_row = true;
        }
        Ok(())
    }

    fn open_cell(&mut self, e: &BytesStart<'_>, is_empty: bool) -> Result<()> {
        let col = attr_string(e, b"r")
            .and_then(|r| parse_cell_ref(&r))
            .map_or(self.next_col, |(col, _)| col);
        self.next_col = col.saturating_add(1);

        self.write_cells_before(col)?;

        match self.cells.next_if(|(c, _)| *c == col) {
            Some((_, value)) => {
                let style = attr_string(e, b"s");
                self.write_cell(self.row(), col, value, style.as_deref())?;
                if !is_empty {
                    self.skip_depth = 1;
                }
            }
            None => {
                let event = if is_empty {
                    Event::Empty(e.borrow())
                } else {
                    Event::Start(e.borrow())
                };
                self.writer.write_event(event)?;
            }
        }
        Ok(())
    }

    fn row(&self) -> u32 {
        self.current_row.unwrap_or(0)
    }

    fn write_rows_before(&mut self, row: u32) -> Result<()> {
        while let Some((r, cells)) = self.rows.next_if(|(r, _)| *r < row) {
            self.write_new_row(r, cells)?;
        }
        Ok(())
    }

    fn write_remaining_rows(&mut self) -> Result<()> {
        while let Some((r, cells)) = self.rows.next() {
            self.write_new_row(r, cells)?;
        }
        Ok(())
    }

    fn write_new_row(&mut self, row: u32, cells: Vec<(u32, &str)>) -> Result<()> {
        let name = format!("{}row", self.prefix);
        let number = (u64::from(row) + 1).to_string();
        let mut start = BytesStart::new(name.as_str());
        start.push_attribute(("r", number.as_str()));
        self.writer.write_event(Event::Start(start))?;
        for (col, value) in cells {
            self.write_cell(row, col, value, None)?;
        }
        self.writer.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn write_cells_before(&mut self, col: u32) -> Result<()> {
        while let Some((c, value)) = self.cells.next_if(|(c, _)| *c < col) {
            self.write_cell(self.row(), c, value, None)?;
        }
        Ok(())
    }

    fn write_remaining_cells(&mut self) -> Result<()> {
        while let Some((c, value)) = self.cells.next() {
            self.write_cell(self.row(), c, value, None)?;
        }
        Ok(())
    }

    fn write_cell(&mut self, row: u32, col: u32, value: &str, style: Option<&str>) -> Result<()> {
        let c_name = format!("{}c", self.prefix);
        let is_name = format!("{}is", self.prefix);
        let t_name = format!("{}t", self.prefix);
        let reference = cell_ref(row, col);

        let mut cell = BytesStart::new(c_name.as_str());
        cell.push_attribute(("r", reference.as_str()));
        if let Some(style) = style {
            cell.push_attribute(("s", style));
        }
        cell.push_attribute(("t", "inlineStr"));

        let mut text = BytesStart::new(t_name.as_str());
        if value.trim() != value {
            text.push_attribute(("xml:space", "preserve"));
        }

        self.writer.write_event(Event::Start(cell))?;
        self.writer
            .write_event(Event::Start(BytesStart::new(is_name.as_str())))?;
        self.writer.write_event(Event::Start(text))?;
        self.writer.write_event(Event::Text(BytesText::new(value)))?;
        self.writer.write_event(Event::End(BytesEnd::new(t_name)))?;
        self.writer.write_event(Event::End(BytesEnd::new(is_name)))?;
        self.writer.write_event(Event::End(BytesEnd::new(c_name)))?;
        Ok(())
    }
}

fn qualified_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn prefix_of(name: &[u8]) -> String {
    let name = String::from_utf8_lossy(name);
    name.rfind(':')
        .and_then(|pos| name.get(..=pos))
        .unwrap_or("")
        .to_string()
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;

    fn edits(cells: &[((u32, u32), &str)]) -> BTreeMap<CellCoordinate, String> {
        cells
            .iter()
            .map(|&((row, col), value)| (CellCoordinate::new(row, col), value.to_string()))
            .collect()
    }

    fn patch(xml: &str, cells: &[((u32, u32), &str)]) -> String {
        let out = patch_sheet_xml("xl/worksheets/sheet1.xml", xml, &edits(cells)).unwrap();
        String::from_utf8(out).unwrap()
    }

    const SHEET: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData><row r="2" spans="1:3"><c r="A2" t="s"><v>0</v></c><c r="C2" s="4"><f>1+1</f><v>2</v></c></row><row r="5"><c r="A5"><v>9</v></c></row></sheetData><pageMargins left="0.7"/></worksheet>"#;

    #[test]
    fn test_no_edits_is_identical() {
        assert_eq!(patch(SHEET, &[]), SHEET);
    }

    #[test]
    fn test_replace_cell_keeps_style_and_drops_content() {
        let out = patch(SHEET, &[((1, 2), "https://cdn/x.png")]);
        assert!(out.contains(
            r#"<c r="C2" s="4" t="inlineStr"><is><t>https://cdn/x.png</t></is></c>"#
        ));
        assert!(!out.contains("<f>1+1</f>"));
        assert!(out.contains(r#"<c r="A2" t="s"><v>0</v></c>"#));
        assert!(!out.contains("spans"));
    }

    #[test]
    fn test_insert_cell_in_column_order() {
        let out = patch(SHEET, &[((1, 1), "mid"), ((1, 5), "end")]);
        let a2 = out.find(r#"r="A2""#).unwrap();
        let b2 = out.find(r#"r="B2""#).unwrap();
        let c2 = out.find(r#"r="C2""#).unwrap();
        let f2 = out.find(r#"r="F2""#).unwrap();
        assert!(a2 < b2 && b2 < c2 && c2 < f2);
    }

    #[test]
    fn test_insert_rows_before_between_and_after() {
        let out = patch(SHEET, &[((0, 0), "first"), ((2, 1), "third"), ((9, 0), "last")]);
        let r1 = out.find(r#"<row r="1">"#).unwrap();
        let r2 = out.find(r#"<row r="2""#).unwrap();
        let r3 = out.find(r#"<row r="3">"#).unwrap();
        let r5 = out.find(r#"<row r="5""#).unwrap();
        let r10 = out.find(r#"<row r="10">"#).unwrap();
        assert!(r1 < r2 && r2 < r3 && r3 < r5 && r5 < r10);
        assert!(out.contains(r#"<c r="B3" t="inlineStr"><is><t>third</t></is></c>"#));
        assert!(out.ends_with(r#"</sheetData><pageMargins left="0.7"/></worksheet>"#));
    }

    #[test]
    fn test_empty_sheet_data_is_expanded() {
        let xml = r#"<worksheet><sheetData/></worksheet>"#;
        let out = patch(xml, &[((2, 1), "x")]);
        assert_eq!(
            out,
            r#"<worksheet><sheetData><row r="3"><c r="B3" t="inlineStr"><is><t>x</t></is></c></row></sheetData></worksheet>"#
        );
    }

    #[test]
    fn test_self_closing_row_and_cell() {
        let xml = r#"<worksheet><sheetData><row r="1"/><row r="2"><c r="A2" s="1"/></row></sheetData></worksheet>"#;
        let out = patch(xml, &[((0, 0), "a"), ((1, 0), "b")]);
        assert!(out.contains(
            r#"<row r="1"><c r="A1" t="inlineStr"><is><t>a</t></is></c></row>"#
        ));
        assert!(out.contains(
            r#"<row r="2"><c r="A2" s="1" t="inlineStr"><is><t>b</t></is></c></row>"#
        ));
    }

    #[test]
    fn test_prefixed_sheet_elements() {
        let xml = r#"<x:worksheet xmlns:x="urn:main"><x:sheetData></x:sheetData></x:worksheet>"#;
        let out = patch(xml, &[((0, 0), "v")]);
        assert!(out.contains(
            r#"<x:row r="1"><x:c r="A1" t="inlineStr"><x:is><x:t>v</x:t></x:is></x:c></x:row>"#
        ));
    }

    #[test]
    fn test_values_are_escaped_and_space_preserved() {
        let xml = r#"<worksheet><sheetData/></worksheet>"#;
        let out = patch(xml, &[((0, 0), " a<b & c ")]);
        assert!(out.contains(r#"<t xml:space="preserve"> a&lt;b &amp; c </t>"#));
    }

    #[test]
    fn test_malformed_sheet() {
        let err = patch_sheet_xml("s.xml", "<worksheet><sheetData></worksheet>", &edits(&[]))
            .unwrap_err();
        assert!(matches!(err, XlimagesError::XmlParse { ref path, .. } if path == "s.xml"));
    }
}
