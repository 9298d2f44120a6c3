//! Snapshots of workbook state read out of Excel by the bridge.
//!
//! Numeric fields carry Excel's raw enumeration codes (see [`crate::xl`]);
//! naming them is left to the consumer. Colors are OLE color numbers as Excel
//! reports them. Optional groups are `None` when the bridge could not read
//! them, and consumers substitute defaults for that group only.

use serde::{Deserialize, Serialize};

use crate::xl;

/// Excel's default cell interior color (white).
pub const DEFAULT_FILL_COLOR: f64 = 16_777_215.0;

/// The workbook that became the open workbook after `OpenWorkbook`/`CreateWorkbook`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenedWorkbook {
    /// Workbook name as shown in the title bar (e.g. `Book1`, `Budget.xlsx`).
    pub name: String,
    /// Full path, `None` for a workbook that has never been saved.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppInfo {
    pub version: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbookInfo {
    pub name: String,
    pub full_name: String,
    pub author: String,
    pub active_sheet: String,
    pub has_password: bool,
    pub read_only: bool,
    pub protect_structure: bool,
    pub protect_windows: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSetupSnapshot {
    /// `xlPortrait` (1) or `xlLandscape` (2).
    pub orientation: i32,
    pub print_area: String,
    pub print_title_rows: String,
    pub print_title_columns: String,
    pub fit_to_pages_tall: i32,
    pub fit_to_pages_wide: i32,
}

impl Default for PageSetupSnapshot {
    fn default() -> Self {
        Self {
            orientation: xl::PORTRAIT,
            print_area: String::new(),
            print_title_rows: String::new(),
            print_title_columns: String::new(),
            fit_to_pages_tall: 1,
            fit_to_pages_wide: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorksheetSnapshot {
    pub name: String,
    /// 1-based tab index.
    pub index: i32,
    pub visible: bool,
    pub protected: bool,
    pub has_used_range: bool,
    pub zoom: i32,
    pub split_row: i32,
    pub split_column: i32,
    /// `None` when the page setup could not be read (no printer installed, etc).
    pub page_setup: Option<PageSetupSnapshot>,
}

impl Default for WorksheetSnapshot {
    fn default() -> Self {
        Self {
            name: String::new(),
            index: 1,
            visible: true,
            protected: false,
            has_used_range: true,
            zoom: 100,
            split_row: 0,
            split_column: 0,
            page_setup: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSnapshot {
    pub name: Option<String>,
    pub size: Option<f64>,
    pub color: Option<f64>,
    pub bold: bool,
    pub italic: bool,
    /// Raw `XlUnderlineStyle`; `None` when mixed or unreadable.
    pub underline: Option<i32>,
    pub strikethrough: bool,
    pub subscript: bool,
    pub superscript: bool,
}

impl FontSnapshot {
    pub fn is_underlined(&self) -> bool {
        self.underline.is_some_and(|u| u != xl::UNDERLINE_NONE)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BorderSnapshot {
    pub color: Option<f64>,
    pub line_style: i32,
    pub weight: i32,
}

impl Default for BorderSnapshot {
    fn default() -> Self {
        Self {
            color: None,
            line_style: xl::LINE_STYLE_NONE,
            weight: xl::BORDER_WEIGHT_THIN,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BordersSnapshot {
    pub top: BorderSnapshot,
    pub bottom: BorderSnapshot,
    pub left: BorderSnapshot,
    pub right: BorderSnapshot,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteriorSnapshot {
    pub color: Option<f64>,
    pub pattern: i32,
    pub pattern_color: Option<f64>,
}

impl Default for InteriorSnapshot {
    fn default() -> Self {
        Self {
            color: None,
            pattern: xl::PATTERN_NONE,
            pattern_color: None,
        }
    }
}

/// Formatting snapshot of one cell, read fresh for every mirroring pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellSnapshot {
    /// Absolute A1 address (`$B$3`).
    pub address: String,
    /// 1-based row.
    pub row: u32,
    /// 1-based column.
    pub column: u32,
    /// Displayed text.
    pub text: String,
    pub formula: String,
    pub font: FontSnapshot,
    pub borders: BordersSnapshot,
    pub interior: InteriorSnapshot,
    pub horizontal_alignment: i32,
    pub vertical_alignment: i32,
    pub indent_level: i32,
    pub shrink_to_fit: bool,
    pub wrap_text: bool,
    pub locked: bool,
    pub number_format: String,
    pub orientation: i32,
}

impl Default for CellSnapshot {
    fn default() -> Self {
        Self {
            address: String::new(),
            row: 1,
            column: 1,
            text: String::new(),
            formula: String::new(),
            font: FontSnapshot::default(),
            borders: BordersSnapshot::default(),
            interior: InteriorSnapshot::default(),
            horizontal_alignment: xl::HALIGN_GENERAL,
            vertical_alignment: xl::VALIGN_BOTTOM,
            indent_level: 0,
            shrink_to_fit: false,
            wrap_text: false,
            locked: true,
            number_format: "General".to_string(),
            orientation: 0,
        }
    }
}

impl CellSnapshot {
    /// A cell is blank when it has no text, no formula and none of bold,
    /// italic, underline, strikethrough or a non-white fill.
    pub fn is_blank_or_default(&self) -> bool {
        let has_fill = self
            .interior
            .color
            .is_some_and(|c| c != DEFAULT_FILL_COLOR);

        self.text.trim().is_empty()
            && self.formula.trim().is_empty()
            && !self.font.bold
            && !self.font.italic
            && !self.font.is_underlined()
            && !self.font.strikethrough
            && !has_fill
    }
}

/// A rectangular area of a worksheet with its cells in row-major order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellArea {
    pub first_row: u32,
    pub first_column: u32,
    pub rows: u32,
    pub columns: u32,
    pub cells: Vec<CellSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineFormat {
    pub color: Option<f64>,
    pub line_style: Option<i32>,
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaFormat {
    pub border: LineFormat,
    pub interior: InteriorSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreeDFormat {
    pub rotation: f64,
    pub elevation: f64,
    pub depth_percent: f64,
    pub height_percent: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartStyle {
    pub chart_style: Option<i32>,
    pub plot_by: i32,
    pub has_data_table: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleFormat {
    pub text: String,
    pub font: FontSnapshot,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LegendFormat {
    pub position: i32,
    pub font: FontSnapshot,
    pub interior: InteriorSnapshot,
    pub border: LineFormat,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AxisFormat {
    pub crosses: i32,
    pub crosses_at: f64,
    pub line: LineFormat,
    pub major_unit: f64,
    pub minor_unit: f64,
    pub maximum_scale: f64,
    pub minimum_scale: f64,
    pub scale_type: i32,
    pub tick_label_font_name: String,
    pub tick_label_font_size: f64,
    pub tick_label_position: i32,
}

/// Snapshot of one embedded chart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartSnapshot {
    pub name: String,
    /// Raw `XlChartType`.
    pub chart_type: i32,
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
    pub chart_area: Option<AreaFormat>,
    pub plot_area: Option<AreaFormat>,
    pub three_d: Option<ThreeDFormat>,
    pub style: Option<ChartStyle>,
    /// `None` when the chart has no title or it could not be read.
    pub title: Option<TitleFormat>,
    /// `None` when the chart has no legend or it could not be read.
    pub legend: Option<LegendFormat>,
    pub category_axis: Option<AxisFormat>,
    pub value_axis: Option<AxisFormat>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_cell(text: &str) -> CellSnapshot {
        CellSnapshot {
            text: text.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_blank_cell_is_blank() {
        let cell = CellSnapshot {
            text: "   ".into(),
            interior: InteriorSnapshot {
                color: Some(DEFAULT_FILL_COLOR),
                ..Default::default()
            },
            font: FontSnapshot {
                underline: Some(xl::UNDERLINE_NONE),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(cell.is_blank_or_default());
    }

    #[test]
    fn test_each_attribute_flips_blank() {
        let base = CellSnapshot {
            interior: InteriorSnapshot {
                color: Some(DEFAULT_FILL_COLOR),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(base.is_blank_or_default());

        assert!(!text_cell("x").is_blank_or_default());

        let mut formula = base.clone();
        formula.formula = "=A1".into();
        assert!(!formula.is_blank_or_default());

        let mut bold = base.clone();
        bold.font.bold = true;
        assert!(!bold.is_blank_or_default());

        let mut italic = base.clone();
        italic.font.italic = true;
        assert!(!italic.is_blank_or_default());

        let mut underline = base.clone();
        underline.font.underline = Some(xl::UNDERLINE_SINGLE);
        assert!(!underline.is_blank_or_default());

        let mut strike = base.clone();
        strike.font.strikethrough = true;
        assert!(!strike.is_blank_or_default());

        let mut fill = base;
        fill.interior.color = Some(65_535.0);
        assert!(!fill.is_blank_or_default());
    }

    #[test]
    fn test_non_distinguishing_formatting_stays_blank() {
        let mut cell = CellSnapshot::default();
        cell.font.subscript = true;
        cell.borders.top.line_style = xl::LINE_STYLE_CONTINUOUS;
        cell.number_format = "0.00".into();
        assert!(cell.is_blank_or_default());
    }
}
