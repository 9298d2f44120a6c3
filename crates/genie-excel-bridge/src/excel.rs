//! Excel-specific COM automation layer built on top of the IDispatch wrapper.

#![cfg(windows)]

use genie_protocol::{
    xl, AppInfo, AreaFormat, AxisFormat, BorderSnapshot, BordersSnapshot, CellArea, CellSnapshot,
    ChartSnapshot, ChartStyle, FontSnapshot, InteriorSnapshot, LegendFormat, LineFormat,
    OpenedWorkbook, PageSetupSnapshot, ThreeDFormat, TitleFormat, WorkbookInfo, WorksheetSnapshot,
};

use crate::dispatch::{
    variant_bool, variant_dispatch, variant_get_f64, variant_get_i32, variant_get_string,
    variant_i32, variant_str, DispatchObject,
};

const NO_WORKBOOK: &str = "No workbook is open";

/// Owns one Excel.Application and at most one open workbook.
pub struct ExcelApp {
    app: DispatchObject,
    workbooks: DispatchObject,
    workbook: Option<DispatchObject>,
}

impl ExcelApp {
    /// Create a hidden Excel.Application with alerts, screen updating,
    /// interactivity and events turned off.
    pub fn new() -> Result<Self, String> {
        let app = DispatchObject::create_from_progid("Excel.Application")?;
        let excel = Self {
            workbooks: app.child("Workbooks")?,
            app,
            workbook: None,
        };
        excel.set_user_facing(false)?;
        Ok(excel)
    }

    pub fn set_user_facing(&self, enabled: bool) -> Result<(), String> {
        self.app.set("Visible", variant_bool(enabled))?;
        self.app.set("DisplayAlerts", variant_bool(enabled))?;
        self.app.set("ScreenUpdating", variant_bool(enabled))?;
        self.app.set("Interactive", variant_bool(enabled))?;
        self.app.set("EnableEvents", variant_bool(enabled))?;
        Ok(())
    }

    fn workbook(&self) -> Result<&DispatchObject, String> {
        self.workbook.as_ref().ok_or_else(|| NO_WORKBOOK.to_string())
    }

    fn worksheet(&self, name: &str) -> Result<DispatchObject, String> {
        self.workbook()?
            .child("Worksheets")?
            .item(variant_str(name))
            .map_err(|e| format!("Worksheet '{name}' not found: {e}"))
    }

    fn opened(wb: &DispatchObject) -> Result<OpenedWorkbook, String> {
        let path = wb.get_string("Path")?;
        let path = if path.is_empty() {
            None
        } else {
            Some(wb.get_string("FullName")?)
        };
        Ok(OpenedWorkbook {
            name: wb.get_string("Name")?,
            path,
        })
    }

    pub fn create_workbook(&mut self) -> Result<OpenedWorkbook, String> {
        self.close_workbook(false)?;
        let wb = self.workbooks.call_child("Add", &[])?;
        let opened = Self::opened(&wb)?;
        self.workbook = Some(wb);
        Ok(opened)
    }

    pub fn open_workbook(&mut self, path: &str) -> Result<OpenedWorkbook, String> {
        self.close_workbook(false)?;
        let wb = self.workbooks.call_child("Open", &[variant_str(path)])?;
        let opened = Self::opened(&wb)?;
        self.workbook = Some(wb);
        Ok(opened)
    }

    /// Close the open workbook, if any.
    pub fn close_workbook(&mut self, save: bool) -> Result<(), String> {
        if let Some(wb) = self.workbook.take() {
            wb.call("Close", &[variant_bool(save)])?;
        }
        Ok(())
    }

    pub fn worksheet_names(&self) -> Result<Vec<String>, String> {
        let sheets = self.workbook()?.child("Worksheets")?;
        let count = sheets.count()?;
        let mut names = Vec::with_capacity(count.max(0) as usize);
        for i in 1..=count {
            names.push(sheets.item(variant_i32(i))?.get_string("Name")?);
        }
        Ok(names)
    }

    pub fn activate_worksheet(&self, name: &str) -> Result<(), String> {
        self.worksheet(name)?.call("Activate", &[])?;
        Ok(())
    }

    pub fn active_worksheet(&self) -> Result<String, String> {
        self.workbook()?.child("ActiveSheet")?.get_string("Name")
    }

    pub fn selection_address(&self) -> Result<String, String> {
        self.workbook()?;
        self.app.child("Selection")?.get_string("Address")
    }

    pub fn chart_names(&self, sheet: &str) -> Result<Vec<String>, String> {
        let objects = self.worksheet(sheet)?.call_child("ChartObjects", &[])?;
        let count = objects.count()?;
        let mut names = Vec::with_capacity(count.max(0) as usize);
        for i in 1..=count {
            names.push(objects.item(variant_i32(i))?.get_string("Name")?);
        }
        Ok(names)
    }

    /// Reading `VBProject` fails unless "Trust access to the VBA project
    /// object model" is enabled.
    pub fn vba_project_accessible(&self) -> Result<bool, String> {
        let wb = self.workbook()?;
        Ok(wb
            .child("VBProject")
            .and_then(|p| p.child("VBComponents"))
            .and_then(|c| c.count())
            .is_ok())
    }

    fn components(&self) -> Result<DispatchObject, String> {
        self.workbook()?.child("VBProject")?.child("VBComponents")
    }

    pub fn add_module(&self, name: &str, code: &str) -> Result<(), String> {
        let module = self
            .components()?
            .call_child("Add", &[variant_i32(xl::VBEXT_CT_STD_MODULE)])?;
        module.set("Name", variant_str(name))?;
        module
            .child("CodeModule")?
            .call("AddFromString", &[variant_str(code)])?;
        Ok(())
    }

    pub fn run_macro(&self, name: &str) -> Result<(), String> {
        self.workbook()?;
        self.app.call("Run", &[variant_str(name)])?;
        Ok(())
    }

    pub fn remove_module(&self, name: &str) -> Result<(), String> {
        let components = self.components()?;
        let module = components.item(variant_str(name))?;
        components.call("Remove", &[variant_dispatch(&module)])?;
        Ok(())
    }

    pub fn save(&self) -> Result<(), String> {
        self.workbook()?.call("Save", &[])?;
        Ok(())
    }

    pub fn save_as(&self, path: &str) -> Result<(), String> {
        self.workbook()?.call("SaveAs", &[variant_str(path)])?;
        Ok(())
    }

    pub fn save_copy_as(&self, path: &str) -> Result<(), String> {
        self.workbook()?.call("SaveCopyAs", &[variant_str(path)])?;
        Ok(())
    }

    pub fn application_info(&self) -> Result<AppInfo, String> {
        Ok(AppInfo {
            version: self.app.get_string("Version")?,
            user_name: self.app.get_string("UserName")?,
        })
    }

    pub fn workbook_info(&self) -> Result<WorkbookInfo, String> {
        let wb = self.workbook()?;
        let author = wb
            .child("BuiltinDocumentProperties")
            .and_then(|props| props.item(variant_str("Author")))
            .and_then(|prop| prop.get_string("Value"))
            .unwrap_or_default();
        let active_sheet = wb
            .child("ActiveSheet")
            .and_then(|s| s.get_string("Name"))
            .unwrap_or_default();

        Ok(WorkbookInfo {
            name: wb.get_string("Name")?,
            full_name: wb.get_string("FullName")?,
            author,
            active_sheet,
            has_password: wb.get_bool("HasPassword").unwrap_or(false),
            read_only: wb.get_bool("ReadOnly").unwrap_or(false),
            protect_structure: wb.get_bool("ProtectStructure").unwrap_or(false),
            protect_windows: wb.get_bool("ProtectWindows").unwrap_or(false),
        })
    }

    /// Zoom and split come from the window, so the sheet is activated first.
    pub fn worksheet_info(&self, sheet: &str) -> Result<WorksheetSnapshot, String> {
        let ws = self.worksheet(sheet)?;
        ws.call("Activate", &[])?;

        let mut snapshot = WorksheetSnapshot {
            name: ws.get_string("Name")?,
            index: ws.get_i32("Index")?,
            visible: ws.get_i32("Visible").unwrap_or(xl::SHEET_VISIBLE) == xl::SHEET_VISIBLE,
            protected: ws.get_bool("ProtectContents").unwrap_or(false),
            has_used_range: ws.child("UsedRange").is_ok(),
            page_setup: read_page_setup(&ws).ok(),
            ..Default::default()
        };

        if let Ok(window) = self.app.child("ActiveWindow") {
            snapshot.zoom = window.get_i32("Zoom").unwrap_or(100);
            snapshot.split_row = window.get_i32("SplitRow").unwrap_or(0);
            snapshot.split_column = window.get_i32("SplitColumn").unwrap_or(0);
        }
        Ok(snapshot)
    }

    /// Non-empty cells as areas. Constants and formulas come from
    /// `SpecialCells`; when neither can be read the whole used range is used.
    pub fn worksheet_cells(&self, sheet: &str) -> Result<Vec<CellArea>, String> {
        let used = self.worksheet(sheet)?.child("UsedRange")?;

        let mut ranges = Vec::new();
        for kind in [xl::CELL_TYPE_CONSTANTS, xl::CELL_TYPE_FORMULAS] {
            match used.call_child("SpecialCells", &[variant_i32(kind)]) {
                Ok(range) => ranges.push(range),
                // "No cells were found" is an error in Excel
                Err(e) => eprintln!("[genie-excel-bridge] SpecialCells({kind}) on '{sheet}': {e}"),
            }
        }
        if ranges.is_empty() {
            ranges.push(used);
        }

        let mut areas = Vec::new();
        for range in &ranges {
            let range_areas = range.child("Areas")?;
            for i in 1..=range_areas.count()? {
                areas.push(read_area(&range_areas.item(variant_i32(i))?)?);
            }
        }
        Ok(areas)
    }

    pub fn worksheet_charts(&self, sheet: &str) -> Result<Vec<ChartSnapshot>, String> {
        let objects = self.worksheet(sheet)?.call_child("ChartObjects", &[])?;
        let mut charts = Vec::new();
        for i in 1..=objects.count()? {
            let object = objects.item(variant_i32(i))?;
            match read_chart(&object) {
                Ok(chart) => charts.push(chart),
                Err(e) => eprintln!("[genie-excel-bridge] skipping chart {i} on '{sheet}': {e}"),
            }
        }
        Ok(charts)
    }

    /// Used-range display text, one line per row. Every non-empty cell is
    /// followed by a tab; empty cells are skipped.
    pub fn worksheet_text(&self, sheet: &str) -> Result<String, String> {
        let used = self.worksheet(sheet)?.child("UsedRange")?;
        let rows = used.child("Rows")?.count()?;
        let columns = used.child("Columns")?.count()?;

        let mut text = String::new();
        for r in 1..=rows {
            for c in 1..=columns {
                let cell = used.child_with("Cells", &[variant_i32(r), variant_i32(c)])?;
                let value = cell.get_string("Text").unwrap_or_default();
                if !value.is_empty() {
                    text.push_str(&value);
                    text.push('\t');
                }
            }
            text.push('\n');
        }
        Ok(text)
    }

    /// Close the workbook without saving and quit Excel.
    pub fn shutdown(mut self) -> Result<(), String> {
        let _ = self.close_workbook(false);
        self.app.call("Quit", &[])?;
        Ok(())
    }
}

fn read_page_setup(ws: &DispatchObject) -> Result<PageSetupSnapshot, String> {
    let setup = ws.child("PageSetup")?;
    // FitToPages* read back as FALSE when unset
    let fit = |name: &str| {
        setup
            .get(name)
            .ok()
            .and_then(|v| variant_get_i32(&v))
            .filter(|n| *n > 0)
            .unwrap_or(1)
    };
    Ok(PageSetupSnapshot {
        orientation: setup.get_i32("Orientation").unwrap_or(xl::PORTRAIT),
        print_area: setup.get_string("PrintArea").unwrap_or_default(),
        print_title_rows: setup.get_string("PrintTitleRows").unwrap_or_default(),
        print_title_columns: setup.get_string("PrintTitleColumns").unwrap_or_default(),
        fit_to_pages_tall: fit("FitToPagesTall"),
        fit_to_pages_wide: fit("FitToPagesWide"),
    })
}

fn read_area(area: &DispatchObject) -> Result<CellArea, String> {
    let first_row = area.get_i32("Row")?.max(1) as u32;
    let first_column = area.get_i32("Column")?.max(1) as u32;
    let rows = area.child("Rows")?.count()?.max(0) as u32;
    let columns = area.child("Columns")?.count()?.max(0) as u32;

    let mut cells = Vec::with_capacity((rows * columns) as usize);
    for r in 1..=rows {
        for c in 1..=columns {
            let cell = area.child_with("Cells", &[variant_i32(r as i32), variant_i32(c as i32)])?;
            cells.push(read_cell(&cell, first_row + r - 1, first_column + c - 1));
        }
    }
    Ok(CellArea {
        first_row,
        first_column,
        rows,
        columns,
        cells,
    })
}

/// Reads one cell; each property group falls back to its default on failure.
fn read_cell(cell: &DispatchObject, row: u32, column: u32) -> CellSnapshot {
    let defaults = CellSnapshot::default();
    let formula = if cell.get_bool("HasFormula").unwrap_or(false) {
        cell.get_string("Formula").unwrap_or_default()
    } else {
        String::new()
    };

    CellSnapshot {
        address: cell
            .get_string("Address")
            .unwrap_or_else(|_| format!("R{row}C{column}")),
        row,
        column,
        text: cell.get_string("Text").unwrap_or_default(),
        formula,
        font: cell.child("Font").map(|f| read_font(&f)).unwrap_or_default(),
        borders: cell
            .child("Borders")
            .map(|b| read_borders(&b))
            .unwrap_or_default(),
        interior: cell
            .child("Interior")
            .map(|i| read_interior(&i))
            .unwrap_or_default(),
        horizontal_alignment: cell
            .get_i32("HorizontalAlignment")
            .unwrap_or(defaults.horizontal_alignment),
        vertical_alignment: cell
            .get_i32("VerticalAlignment")
            .unwrap_or(defaults.vertical_alignment),
        indent_level: cell.get_i32("IndentLevel").unwrap_or(0),
        shrink_to_fit: cell.get_bool("ShrinkToFit").unwrap_or(false),
        wrap_text: cell.get_bool("WrapText").unwrap_or(false),
        locked: cell.get_bool("Locked").unwrap_or(true),
        number_format: cell
            .get_string("NumberFormat")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.number_format),
        orientation: cell.get_i32("Orientation").unwrap_or(0),
    }
}

fn read_font(font: &DispatchObject) -> FontSnapshot {
    FontSnapshot {
        name: font.get("Name").ok().and_then(|v| variant_get_string(&v)),
        size: font.get_opt_f64("Size").ok().flatten(),
        color: font.get_opt_f64("Color").ok().flatten(),
        bold: font.get_bool("Bold").unwrap_or(false),
        italic: font.get_bool("Italic").unwrap_or(false),
        underline: font.get("Underline").ok().and_then(|v| variant_get_i32(&v)),
        strikethrough: font.get_bool("Strikethrough").unwrap_or(false),
        subscript: font.get_bool("Subscript").unwrap_or(false),
        superscript: font.get_bool("Superscript").unwrap_or(false),
    }
}

fn read_borders(borders: &DispatchObject) -> BordersSnapshot {
    let edge = |index: i32| {
        borders
            .child_with("Item", &[variant_i32(index)])
            .map(|b| BorderSnapshot {
                color: b.get_opt_f64("Color").ok().flatten(),
                line_style: b.get_i32("LineStyle").unwrap_or(xl::LINE_STYLE_NONE),
                weight: b.get_i32("Weight").unwrap_or(xl::BORDER_WEIGHT_THIN),
            })
            .unwrap_or_default()
    };
    BordersSnapshot {
        top: edge(xl::EDGE_TOP),
        bottom: edge(xl::EDGE_BOTTOM),
        left: edge(xl::EDGE_LEFT),
        right: edge(xl::EDGE_RIGHT),
    }
}

fn read_interior(interior: &DispatchObject) -> InteriorSnapshot {
    InteriorSnapshot {
        color: interior.get_opt_f64("Color").ok().flatten(),
        pattern: interior.get_i32("Pattern").unwrap_or(xl::PATTERN_NONE),
        pattern_color: interior.get_opt_f64("PatternColor").ok().flatten(),
    }
}

fn read_line(line: &DispatchObject) -> LineFormat {
    LineFormat {
        color: line.get_opt_f64("Color").ok().flatten(),
        line_style: line.get("LineStyle").ok().and_then(|v| variant_get_i32(&v)),
        weight: line.get("Weight").ok().and_then(|v| variant_get_f64(&v)),
    }
}

fn read_area_format(area: &DispatchObject) -> Result<AreaFormat, String> {
    Ok(AreaFormat {
        border: read_line(&area.child("Border")?),
        interior: read_interior(&area.child("Interior")?),
    })
}

fn read_chart(object: &DispatchObject) -> Result<ChartSnapshot, String> {
    let chart = object.child("Chart")?;

    let mut snapshot = ChartSnapshot {
        name: object.get_string("Name")?,
        chart_type: chart.get_i32("ChartType").unwrap_or(51),
        left: object.get_f64("Left").unwrap_or(0.0),
        top: object.get_f64("Top").unwrap_or(0.0),
        width: object.get_f64("Width").unwrap_or(0.0),
        height: object.get_f64("Height").unwrap_or(0.0),
        ..Default::default()
    };

    snapshot.chart_area = chart
        .child("ChartArea")
        .and_then(|a| read_area_format(&a))
        .ok();
    snapshot.plot_area = chart
        .child("PlotArea")
        .and_then(|a| read_area_format(&a))
        .ok();
    snapshot.three_d = read_three_d(&chart).ok();
    snapshot.style = Some(ChartStyle {
        chart_style: chart.get("ChartStyle").ok().and_then(|v| variant_get_i32(&v)),
        plot_by: chart.get_i32("PlotBy").unwrap_or(xl::PLOT_BY_COLUMNS),
        has_data_table: chart.get_bool("HasDataTable").unwrap_or(false),
    });

    if chart.get_bool("HasTitle").unwrap_or(false) {
        snapshot.title = chart.child("ChartTitle").and_then(|t| read_title(&t)).ok();
    }
    if chart.get_bool("HasLegend").unwrap_or(false) {
        snapshot.legend = chart.child("Legend").and_then(|l| read_legend(&l)).ok();
    }
    snapshot.category_axis = read_axis(&chart, xl::AXIS_CATEGORY).ok();
    snapshot.value_axis = read_axis(&chart, xl::AXIS_VALUE).ok();

    Ok(snapshot)
}

fn read_three_d(chart: &DispatchObject) -> Result<ThreeDFormat, String> {
    Ok(ThreeDFormat {
        rotation: chart.get_f64("Rotation")?,
        elevation: chart.get_f64("Elevation")?,
        depth_percent: chart.get_f64("DepthPercent")?,
        height_percent: chart.get_f64("HeightPercent")?,
    })
}

fn read_title(title: &DispatchObject) -> Result<TitleFormat, String> {
    Ok(TitleFormat {
        text: title.get_string("Text")?,
        font: read_font(&title.child("Font")?),
    })
}

fn read_legend(legend: &DispatchObject) -> Result<LegendFormat, String> {
    let format = legend.child("Format")?;
    let border = format
        .child("Line")
        .map(|l| LineFormat {
            color: l
                .child("ForeColor")
                .and_then(|c| c.get_opt_f64("RGB"))
                .ok()
                .flatten(),
            line_style: l.get("DashStyle").ok().and_then(|v| variant_get_i32(&v)),
            weight: l.get_opt_f64("Weight").ok().flatten(),
        })
        .unwrap_or_default();

    Ok(LegendFormat {
        position: legend.get_i32("Position")?,
        font: read_font(&legend.child("Font")?),
        interior: legend
            .child("Interior")
            .map(|i| read_interior(&i))
            .unwrap_or_default(),
        border,
    })
}

fn read_axis(chart: &DispatchObject, axis_type: i32) -> Result<AxisFormat, String> {
    let axis = chart.call_child("Axes", &[variant_i32(axis_type)])?;
    let tick_labels = axis.child("TickLabels")?;
    let tick_font = tick_labels.child("Font")?;
    // Category axes on most chart types have no numeric scale
    let scale = |name: &str| axis.get_f64(name).unwrap_or(0.0);

    Ok(AxisFormat {
        crosses: axis.get_i32("Crosses").unwrap_or(-4105),
        crosses_at: scale("CrossesAt"),
        line: axis.child("Border").map(|b| read_line(&b)).unwrap_or_default(),
        major_unit: scale("MajorUnit"),
        minor_unit: scale("MinorUnit"),
        maximum_scale: scale("MaximumScale"),
        minimum_scale: scale("MinimumScale"),
        scale_type: axis.get_i32("ScaleType").unwrap_or(-4132),
        tick_label_font_name: tick_font.get_string("Name").unwrap_or_default(),
        tick_label_font_size: tick_font.get_f64("Size").unwrap_or(11.0),
        tick_label_position: axis.get_i32("TickLabelPosition").unwrap_or(4),
    })
}
