//! Minimal xlsx reader: workbook sheet list, shared strings and one worksheet.
//!
//! Only cached cell values (`<v>`) are read, formulas are never evaluated.

use crate::error::{BenchmarkError, Result};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Seek};
use zip::result::ZipError;
use zip::ZipArchive;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn display(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(true) => "TRUE".to_string(),
            CellValue::Bool(false) => "FALSE".to_string(),
        }
    }
}

static EMPTY_CELL: CellValue = CellValue::Empty;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SheetGrid {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetGrid {
    pub fn new(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    pub fn cell(&self, row: usize, col: usize) -> &CellValue {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .unwrap_or(&EMPTY_CELL)
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// One line per non-empty row, cells separated by a single space.
    pub fn to_lines(&self) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .filter(|c| !c.is_empty())
                    .map(CellValue::display)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|line| !line.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone)]
struct SheetEntry {
    name: String,
    rel_id: Option<String>,
}

/// Reads the sheet whose name contains one of `keywords`, else the active
/// sheet, else the first.
pub fn read_sheet(bytes: &[u8], keywords: &[String]) -> Result<SheetGrid> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let workbook_xml = read_entry(&mut archive, "xl/workbook.xml")?
        .ok_or_else(|| BenchmarkError::Workbook("xl/workbook.xml not found".to_string()))?;
    let (sheets, active_tab) = parse_workbook(&workbook_xml)?;

    let relationships = match read_entry(&mut archive, "xl/_rels/workbook.xml.rels")? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };
    let shared_strings = match read_entry(&mut archive, "xl/sharedStrings.xml")? {
        Some(xml) => parse_shared_strings(&xml)?,
        None => Vec::new(),
    };

    let index = select_sheet(&sheets, active_tab, keywords)
        .ok_or_else(|| BenchmarkError::Workbook("workbook has no sheets".to_string()))?;
    let sheet = &sheets[index];

    let path = sheet
        .rel_id
        .as_ref()
        .and_then(|id| relationships.get(id))
        .map(|target| resolve_target(target))
        .unwrap_or_else(|| format!("xl/worksheets/sheet{}.xml", index + 1));

    let sheet_xml = read_entry(&mut archive, &path)?
        .ok_or_else(|| BenchmarkError::Workbook(format!("{} not found", path)))?;

    let rows = parse_worksheet(&sheet_xml, &shared_strings)?;
    Ok(SheetGrid::new(sheet.name.clone(), rows))
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Option<String>> {
    match archive.by_name(name) {
        Ok(mut file) => {
            let mut content = String::new();
            file.read_to_string(&mut content)?;
            Ok(Some(content))
        }
        Err(ZipError::FileNotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn resolve_target(target: &str) -> String {
    if let Some(absolute) = target.strip_prefix('/') {
        absolute.to_string()
    } else if target.starts_with("xl/") {
        target.to_string()
    } else {
        format!("xl/{}", target)
    }
}

fn select_sheet(sheets: &[SheetEntry], active_tab: usize, keywords: &[String]) -> Option<usize> {
    if sheets.is_empty() {
        return None;
    }

    let by_keyword = sheets.iter().position(|sheet| {
        let name = sheet.name.to_lowercase();
        keywords.iter().any(|k| name.contains(&k.to_lowercase()))
    });

    by_keyword.or_else(|| (active_tab < sheets.len()).then_some(active_tab)).or(Some(0))
}

fn attr_value(element: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| BenchmarkError::Workbook(e.to_string()))?;
        if attr.key.local_name().as_ref() == key {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

fn parse_workbook(xml: &str) -> Result<(Vec<SheetEntry>, usize)> {
    let mut reader = Reader::from_str(xml);
    let mut sheets = Vec::new();
    let mut active_tab = 0;

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) => match e.local_name().as_ref() {
                b"sheet" => {
                    let name = attr_value(&e, b"name")?.unwrap_or_default();
                    let rel_id = attr_value(&e, b"id")?;
                    sheets.push(SheetEntry { name, rel_id });
                }
                b"workbookView" => {
                    if let Some(tab) = attr_value(&e, b"activeTab")? {
                        active_tab = tab.parse().unwrap_or(0);
                    }
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok((sheets, active_tab))
}

fn parse_relationships(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    let mut targets = HashMap::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr_value(&e, b"Id")?, attr_value(&e, b"Target")?) {
                    targets.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(targets)
}

fn parse_shared_strings(xml: &str) -> Result<Vec<String>> {
    let mut reader = Reader::from_str(xml);
    let mut strings = Vec::new();
    let mut current = String::new();
    let mut in_item = false;
    let mut in_text = false;
    // phonetic guide runs (furigana) are not part of the cell text
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"si" => {
                    in_item = true;
                    current.clear();
                }
                b"rPh" => phonetic_depth += 1,
                b"t" => in_text = true,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Event::End(e) => match e.local_name().as_ref() {
                b"si" => {
                    strings.push(std::mem::take(&mut current));
                    in_item = false;
                }
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"t" => in_text = false,
                _ => {}
            },
            Event::Text(t) if in_item && in_text && phonetic_depth == 0 => {
                current.push_str(&t.unescape()?);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(strings)
}

/// Sheet limits of the xlsx format: column XFD, row 1,048,576.
const MAX_ROWS: usize = 1_048_576;
const MAX_COLUMNS: usize = 16_384;

fn out_of_range(reference: &str) -> BenchmarkError {
    BenchmarkError::Workbook(format!("cell reference {} is outside the sheet limits", reference))
}

fn check_position(row: usize, col: usize) -> Result<(usize, usize)> {
    if row >= MAX_ROWS || col >= MAX_COLUMNS {
        return Err(out_of_range(&format!("R{}C{}", row + 1, col + 1)));
    }
    Ok((row, col))
}

/// Zero-based (row, column) from an A1-style reference. `Ok(None)` for a
/// reference that is not A1-style at all; references past the sheet limits
/// are an error.
fn parse_cell_ref(reference: &str) -> Result<Option<(usize, usize)>> {
    let letters: String = reference.chars().take_while(|c| c.is_ascii_alphabetic()).collect();
    let digits = &reference[letters.len()..];

    if letters.is_empty() || digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Ok(None);
    }
    if letters.len() > 3 {
        return Err(out_of_range(reference));
    }

    let mut col = 0usize;
    for ch in letters.chars() {
        col = col * 26 + (ch.to_ascii_uppercase() as usize - 'A' as usize + 1);
    }

    let row: usize = digits.parse().map_err(|_| out_of_range(reference))?;
    if row == 0 {
        return Ok(None);
    }
    if row > MAX_ROWS || col > MAX_COLUMNS {
        return Err(out_of_range(reference));
    }

    Ok(Some((row - 1, col - 1)))
}

fn cell_value(cell_type: Option<&str>, raw: &str, shared: &[String]) -> CellValue {
    match cell_type {
        Some("s") => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|idx| shared.get(idx))
            .map(|s| CellValue::Text(s.clone()))
            .unwrap_or(CellValue::Empty),
        Some("str") | Some("inlineStr") => {
            if raw.is_empty() {
                CellValue::Empty
            } else {
                CellValue::Text(raw.to_string())
            }
        }
        Some("b") => CellValue::Bool(raw.trim() == "1"),
        Some("e") => CellValue::Empty,
        _ => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                CellValue::Empty
            } else if let Ok(n) = trimmed.parse::<f64>() {
                CellValue::Number(n)
            } else {
                CellValue::Text(trimmed.to_string())
            }
        }
    }
}

fn parse_worksheet(xml: &str, shared: &[String]) -> Result<Vec<Vec<CellValue>>> {
    let mut reader = Reader::from_str(xml);
    let mut cells: BTreeMap<usize, BTreeMap<usize, CellValue>> = BTreeMap::new();

    let mut row_idx: Option<usize> = None;
    let mut next_col = 0usize;
    let mut position: Option<(usize, usize)> = None;
    let mut cell_type: Option<String> = None;
    let mut buffer = String::new();
    let mut in_value = false;
    let mut in_inline = false;
    let mut in_inline_text = false;
    let mut phonetic_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"row" => {
                    let explicit = attr_value(&e, b"r")?
                        .and_then(|r| r.parse::<usize>().ok())
                        .filter(|r| *r > 0)
                        .map(|r| r - 1);
                    let row = explicit.unwrap_or_else(|| row_idx.map_or(0, |r| r + 1));
                    check_position(row, 0)?;
                    row_idx = Some(row);
                    next_col = 0;
                }
                b"c" => {
                    let row = row_idx.unwrap_or(0);
                    let explicit = match attr_value(&e, b"r")? {
                        Some(r) => parse_cell_ref(&r)?,
                        None => None,
                    };
                    position = Some(match explicit {
                        Some(position) => position,
                        None => check_position(row, next_col)?,
                    });
                    cell_type = attr_value(&e, b"t")?;
                    buffer.clear();
                }
                b"v" => in_value = true,
                b"is" => in_inline = true,
                b"t" if in_inline => in_inline_text = true,
                b"rPh" => phonetic_depth += 1,
                _ => {}
            },
            Event::Empty(e) if e.local_name().as_ref() == b"c" => {
                let explicit = match attr_value(&e, b"r")? {
                    Some(r) => parse_cell_ref(&r)?,
                    None => None,
                };
                next_col = match explicit {
                    Some((_, col)) => col + 1,
                    None => next_col + 1,
                };
            }
            Event::Text(t) => {
                if in_value || (in_inline_text && phonetic_depth == 0) {
                    buffer.push_str(&t.unescape()?);
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"v" => in_value = false,
                b"is" => in_inline = false,
                b"t" => in_inline_text = false,
                b"rPh" => phonetic_depth = phonetic_depth.saturating_sub(1),
                b"c" => {
                    if let Some((row, col)) = position.take() {
                        let value = cell_value(cell_type.as_deref(), &buffer, shared);
                        if !value.is_empty() {
                            cells.entry(row).or_default().insert(col, value);
                        }
                        next_col = col + 1;
                    }
                    cell_type = None;
                    buffer.clear();
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let row_count = cells.keys().next_back().map_or(0, |r| r + 1);
    let mut rows = vec![Vec::new(); row_count];
    for (row, columns) in cells {
        let width = columns.keys().next_back().map_or(0, |c| c + 1);
        let mut dense = vec![CellValue::Empty; width];
        for (col, value) in columns {
            dense[col] = value;
        }
        rows[row] = dense;
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cell_ref() {
        assert_eq!(parse_cell_ref("A1").unwrap(), Some((0, 0)));
        assert_eq!(parse_cell_ref("C5").unwrap(), Some((4, 2)));
        assert_eq!(parse_cell_ref("AB12").unwrap(), Some((11, 27)));
        assert_eq!(parse_cell_ref("XFD1048576").unwrap(), Some((1_048_575, 16_383)));
        assert_eq!(parse_cell_ref("12").unwrap(), None);
        assert_eq!(parse_cell_ref("A0").unwrap(), None);
    }

    #[test]
    fn test_cell_refs_past_sheet_limits_rejected() {
        for reference in ["ZZZZZZZZZZZZZZZ1", "XFE1", "A1048577", "A4000000000", "A99999999999999999999999"] {
            assert!(
                matches!(parse_cell_ref(reference), Err(BenchmarkError::Workbook(_))),
                "reference {}",
                reference
            );
        }

        let xml = r#"<worksheet><sheetData><row r="1"><c r="ZZZZZZZZZZZZZZZ1"><v>1</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(parse_worksheet(xml, &[]), Err(BenchmarkError::Workbook(_))));

        let xml = r#"<worksheet><sheetData><row r="4000000000"><c><v>1</v></c></row></sheetData></worksheet>"#;
        assert!(matches!(parse_worksheet(xml, &[]), Err(BenchmarkError::Workbook(_))));
    }

    #[test]
    fn test_shared_strings_skip_phonetic_runs() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="3" uniqueCount="3">
  <si><t>売上高</t><rPh sb="0" eb="3"><t>ウリアゲダカ</t></rPh></si>
  <si><r><t>営業</t></r><r><t>利益</t></r></si>
  <si><t>R&amp;D</t></si>
</sst>"#;

        let strings = parse_shared_strings(xml).unwrap();
        assert_eq!(strings, vec!["売上高", "営業利益", "R&D"]);
    }

    #[test]
    fn test_worksheet_cells_and_gaps() {
        let shared = vec!["科目".to_string(), "売上高".to_string()];
        let xml = r#"<worksheet><sheetData>
  <row r="1"><c r="A1" t="s"><v>0</v></c><c r="C1"><v>2023</v></c></row>
  <row r="3"><c r="A3" t="s"><v>1</v></c><c r="C3"><f>SUM(D3:E3)</f><v>1500.5</v></c></row>
  <row r="4"><c r="A4" t="inlineStr"><is><t>従業員数</t></is></c><c r="B4" t="e"><v>#DIV/0!</v></c></row>
</sheetData></worksheet>"#;

        let rows = parse_worksheet(xml, &shared).unwrap();
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0][0], CellValue::Text("科目".to_string()));
        assert_eq!(rows[0][1], CellValue::Empty);
        assert_eq!(rows[0][2], CellValue::Number(2023.0));
        assert!(rows[1].is_empty());
        assert_eq!(rows[2][2], CellValue::Number(1500.5));
        assert_eq!(rows[3], vec![CellValue::Text("従業員数".to_string())]);
    }

    #[test]
    fn test_sheet_selection() {
        let sheets = vec![
            SheetEntry { name: "表紙".to_string(), rel_id: None },
            SheetEntry { name: "財務入力".to_string(), rel_id: None },
            SheetEntry { name: "結果".to_string(), rel_id: None },
        ];
        let keywords = vec!["入力".to_string(), "input".to_string()];

        assert_eq!(select_sheet(&sheets, 2, &keywords), Some(1));
        assert_eq!(select_sheet(&sheets, 2, &[]), Some(2));
        assert_eq!(select_sheet(&sheets, 9, &[]), Some(0));
        assert_eq!(select_sheet(&[], 0, &keywords), None);
    }

    #[test]
    fn test_grid_lines() {
        let grid = SheetGrid::new(
            "入力",
            vec![
                vec![CellValue::Text("売上高".to_string()), CellValue::Empty, CellValue::Number(1000.0)],
                vec![],
                vec![CellValue::Text("  ".to_string())],
                vec![CellValue::Text("率".to_string()), CellValue::Number(0.25)],
            ],
        );

        assert_eq!(grid.to_lines(), vec!["売上高 1000", "率 0.25"]);
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.cell(10, 10), &CellValue::Empty);
    }

    #[test]
    fn test_resolve_target() {
        assert_eq!(resolve_target("worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
        assert_eq!(resolve_target("/xl/worksheets/sheet2.xml"), "xl/worksheets/sheet2.xml");
    }
}
