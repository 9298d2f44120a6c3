//! Action parameter builders for the ontology's create actions.
//!
//! Every builder produces the flat `parameters` object the action expects.
//! Snapshot groups the bridge could not read arrive as `None` and are
//! replaced by fixed defaults here, one group at a time.

use chrono::Utc;
use serde_json::{json, Map, Value};

use genie_protocol::xl;
use genie_protocol::{
    AreaFormat, AxisFormat, CellSnapshot, ChartSnapshot, ChartStyle, FontSnapshot, LegendFormat,
    ThreeDFormat, TitleFormat, WorkbookInfo, WorksheetSnapshot,
};

pub type Parameters = Map<String, Value>;

/// Range reference sent for cells that do not belong to a named range.
pub const NO_RANGE: &str = "no-range";

const DEFAULT_FONT: &str = "Calibri";
const DEFAULT_FONT_SIZE: f64 = 11.0;
const BLACK: &str = "#000000";
const WHITE: &str = "#FFFFFF";

/// UTC timestamp in the format the ontology stores (`2024-05-01T09:30:00.000Z`).
pub fn timestamp() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn new_guid() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn hex_or(color: Option<f64>, default: &str) -> String {
    match color {
        Some(_) => xl::color_hex(color),
        None => default.to_string(),
    }
}

fn object(value: Value) -> Parameters {
    match value {
        Value::Object(map) => map,
        _ => Parameters::new(),
    }
}

/// Prompt fields supplied by the caller of `create_user_prompt`.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserPrompt<'a> {
    pub text: &'a str,
    pub custom_instructions: Option<&'a str>,
    pub selected_range: Option<&'a str>,
    pub selected_worksheet: Option<&'a str>,
    pub attachment_context: Option<&'a str>,
}

impl<'a> UserPrompt<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            text,
            ..Default::default()
        }
    }
}

pub fn prompt_parameters(prompt: &UserPrompt<'_>, prompt_guid: &str, timestamp: &str) -> Parameters {
    object(json!({
        "prompt_guid": prompt_guid,
        "conversation_session_guidref": prompt_guid,
        "prompt_text": prompt.text,
        "user_custom_instructions": prompt.custom_instructions.unwrap_or_default(),
        "user_selected_range": prompt.selected_range.unwrap_or_default(),
        "user_selected_worksheet": prompt.selected_worksheet.unwrap_or_default(),
        "version_timestamp": timestamp,
        "last_mod_time": timestamp,
        "user_provided_file_attachment_context": prompt.attachment_context.unwrap_or_default(),
        "user_selected_ontology_objects": "",
    }))
}

/// File name portion of a local or Windows path.
fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

pub fn workbook_parameters(
    info: &WorkbookInfo,
    file_path: &str,
    file_size: u64,
    workbook_guid: &str,
    timestamp: &str,
) -> Parameters {
    let author = if info.author.is_empty() {
        std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_default()
    } else {
        info.author.clone()
    };
    let macro_enabled = file_path.to_ascii_lowercase().ends_with(".xlsm");

    object(json!({
        "workbook_guid": workbook_guid,
        "active_sheet": info.active_sheet,
        "app_guidref": workbook_guid,
        "author": author,
        "category": "Excel",
        "connection_list": "[]",
        "file_path": file_path,
        "file_size": file_size,
        "has_password": info.has_password,
        "macro_enabled": macro_enabled,
        "main_genie_excel_file_guidref": "",
        "protect_structure": info.protect_structure,
        "protect_windows": info.protect_windows,
        "read_only": info.read_only,
        "template_excel_file_guidref": "",
        "workbook_events": "[]",
        "workbook_name": file_name(file_path),
        "last_mod_time": timestamp,
        "version_timestamp": timestamp,
        "is_template": false,
        "workbook_summary": "",
        "agent_plan": "",
    }))
}

pub fn worksheet_parameters(
    sheet: &WorksheetSnapshot,
    workbook_key: &str,
    worksheet_guid: &str,
    timestamp: &str,
) -> Parameters {
    let page = sheet.page_setup.clone().unwrap_or_default();
    let fit_tall = if page.fit_to_pages_tall <= 0 { 1 } else { page.fit_to_pages_tall };
    let fit_wide = if page.fit_to_pages_wide <= 0 { 1 } else { page.fit_to_pages_wide };

    object(json!({
        "worksheet_guid": worksheet_guid,
        "display_gridlines": true,
        "fit_pages_tall": fit_tall,
        "fit_pages_wide": fit_wide,
        "freeze_left_column": sheet.split_column,
        "freeze_pane_split_column": sheet.split_column,
        "freeze_pane_split_row": sheet.split_row,
        "freeze_top_row": sheet.split_row,
        "h_page_breaks": "[]",
        "outline_data": "[]",
        "page_orientation": xl::orientation_name(page.orientation),
        "print_area": page.print_area,
        "print_title_columns": page.print_title_columns,
        "print_title_rows": page.print_title_rows,
        "protected": sheet.protected,
        "sheet_index": sheet.index,
        "sheet_name": sheet.name,
        "sheet_type": "Worksheet",
        "used_range_addr": sheet.has_used_range,
        "visible": sheet.visible,
        "v_page_breaks": "[]",
        "workbook_guidref": workbook_key,
        "zoom": sheet.zoom,
        "last_mod_time": timestamp,
        "version_timestamp": timestamp,
    }))
}

pub fn cell_parameters(
    cell: &CellSnapshot,
    worksheet_key: &str,
    range_guid: Option<&str>,
    timestamp: &str,
) -> Parameters {
    let font = &cell.font;
    let font_size = font.size.filter(|s| *s > 0.0).unwrap_or(DEFAULT_FONT_SIZE);

    let mut params = object(json!({
        "cell_guid": new_guid(),
        "worksheet_guidref": worksheet_key,
        "range_guidref": range_guid.unwrap_or(NO_RANGE),
        "version_timestamp": timestamp,
        "last_mod_time": timestamp,
        "row_index": cell.row,
        "col_index": cell.column,
        "cell_address": cell.address,
        "cell_value": cell.text,
        "formula": cell.formula,
        "error_value": "",
        "font_name": font.name.as_deref().unwrap_or(DEFAULT_FONT),
        "font_size": font_size,
        "font_color": hex_or(font.color, BLACK),
        "bold": font.bold,
        "italic": font.italic,
        "underline": font.is_underlined(),
        "strikethrough": font.strikethrough,
        "subscript": font.subscript,
        "superscript": font.superscript,
        "bg_color": hex_or(cell.interior.color, WHITE),
        "interior_pattern": xl::pattern_name(cell.interior.pattern),
        "interior_pattern_color": hex_or(cell.interior.pattern_color, BLACK),
        "horizontal_alignment": xl::horizontal_alignment_name(cell.horizontal_alignment),
        "vertical_alignment": xl::vertical_alignment_name(cell.vertical_alignment),
        "indent_level": cell.indent_level,
        "shrink_to_fit": cell.shrink_to_fit,
        "wrap_text": cell.wrap_text,
        "locked": cell.locked,
        "number_format": cell.number_format,
        "orientation": cell.orientation,
    }));

    let borders = &cell.borders;
    for (side, border) in [
        ("top", &borders.top),
        ("bottom", &borders.bottom),
        ("left", &borders.left),
        ("right", &borders.right),
    ] {
        params.insert(
            format!("border_{side}_color"),
            json!(hex_or(border.color, BLACK)),
        );
        params.insert(
            format!("border_{side}_style"),
            json!(xl::line_style_name(border.line_style)),
        );
        params.insert(
            format!("border_{side}_weight"),
            json!(xl::border_weight_name(border.weight)),
        );
    }

    params
}

fn area_parameters(prefix: &str, area: Option<&AreaFormat>) -> Parameters {
    let (border_color, border_style, border_weight, fill_color, fill_pattern, pattern_color) =
        match area {
            Some(area) => (
                hex_or(area.border.color, BLACK),
                xl::line_style_name(area.border.line_style.unwrap_or(xl::LINE_STYLE_CONTINUOUS)),
                area.border.weight.unwrap_or(1.0),
                hex_or(area.interior.color, WHITE),
                xl::pattern_name(area.interior.pattern),
                hex_or(area.interior.pattern_color, BLACK),
            ),
            None => (BLACK.into(), "Continuous", 1.0, WHITE.into(), "Solid", BLACK.into()),
        };

    let mut params = Parameters::new();
    params.insert(format!("{prefix}_border_color"), json!(border_color));
    params.insert(format!("{prefix}_border_style"), json!(border_style));
    params.insert(format!("{prefix}_border_weight"), json!(border_weight));
    params.insert(format!("{prefix}_fill_color"), json!(fill_color));
    params.insert(format!("{prefix}_fill_pattern"), json!(fill_pattern));
    params.insert(format!("{prefix}_fill_pattern_color"), json!(pattern_color));
    params
}

fn three_d_parameters(three_d: Option<&ThreeDFormat>) -> Value {
    let (rotation, elevation, depth, height) = match three_d {
        Some(t) => (t.rotation, t.elevation, t.depth_percent, t.height_percent),
        None => (0.0, 0.0, 100.0, 100.0),
    };
    json!({
        "chart_is3d": false,
        "chart_rotation": rotation,
        "chart_elevation": elevation,
        "chart_depth_percent": depth,
        "chart_height_percent": height,
        "chart_perspective": "0",
    })
}

fn style_parameters(style: Option<&ChartStyle>) -> Value {
    let (chart_style, plot_by, linked) = match style {
        Some(s) => (
            s.chart_style
                .map_or_else(|| "Default".to_string(), |n| n.to_string()),
            xl::plot_by_name(s.plot_by),
            if s.has_data_table { "Yes" } else { "No" },
        ),
        None => ("Default".to_string(), "Columns", "No"),
    };
    json!({
        "chart_gap_width": 150,
        "chart_overlap": 0,
        "chart_style": chart_style,
        "plot_by": plot_by,
        "chart_location_type": "Embedded",
        "data_source_linked": linked,
        "pivot_chart": "No",
    })
}

fn font_fields(font: &FontSnapshot) -> (String, f64, String) {
    (
        font.name.clone().unwrap_or_else(|| DEFAULT_FONT.to_string()),
        font.size.unwrap_or(DEFAULT_FONT_SIZE),
        hex_or(font.color, BLACK),
    )
}

fn title_parameters(title: Option<&TitleFormat>) -> Value {
    match title {
        Some(title) => {
            let (name, size, color) = font_fields(&title.font);
            json!({
                "chart_title_text": title.text,
                "chart_title_visible": true,
                "chart_title_font_name": name,
                "chart_title_font_size": size,
                "chart_title_font_color": color,
                "chart_title_bold": title.font.bold,
                "chart_title_italic": title.font.italic,
                "chart_title_underline": title.font.is_underlined(),
            })
        }
        None => json!({
            "chart_title_text": "",
            "chart_title_visible": false,
            "chart_title_font_name": DEFAULT_FONT,
            "chart_title_font_size": DEFAULT_FONT_SIZE,
            "chart_title_font_color": BLACK,
            "chart_title_bold": false,
            "chart_title_italic": false,
            "chart_title_underline": false,
        }),
    }
}

fn legend_parameters(legend: Option<&LegendFormat>) -> Value {
    match legend {
        Some(legend) => {
            let (name, size, color) = font_fields(&legend.font);
            json!({
                "has_legend": true,
                "legend_position": xl::legend_position_name(legend.position),
                "legend_visible": true,
                "legend_font_name": name,
                "legend_font_size": size,
                "legend_font_color": color,
                "legend_bold": legend.font.bold,
                "legend_italic": legend.font.italic,
                "legend_underline": legend.font.is_underlined(),
                "legend_background_color": hex_or(legend.interior.color, WHITE),
                "legend_background_pattern": xl::pattern_name(legend.interior.pattern),
                "legend_background_pattern_color": hex_or(legend.interior.pattern_color, BLACK),
                "legend_border_color": hex_or(legend.border.color, BLACK),
                "legend_border_style": xl::line_style_name(
                    legend.border.line_style.unwrap_or(xl::LINE_STYLE_CONTINUOUS)
                ),
                "legend_border_weight": legend.border.weight.unwrap_or(1.0),
            })
        }
        None => json!({
            "has_legend": false,
            "legend_position": "None",
            "legend_visible": false,
            "legend_font_name": DEFAULT_FONT,
            "legend_font_size": DEFAULT_FONT_SIZE,
            "legend_font_color": BLACK,
            "legend_bold": false,
            "legend_italic": false,
            "legend_underline": false,
            "legend_background_color": WHITE,
            "legend_background_pattern": "None",
            "legend_background_pattern_color": BLACK,
            "legend_border_color": BLACK,
            "legend_border_style": "None",
            "legend_border_weight": 1.0,
        }),
    }
}

fn axis_parameters(prefix: &str, axis: Option<&AxisFormat>) -> Parameters {
    let scale = match axis {
        Some(axis) => json!({
            "crosses": xl::axis_crosses_name(axis.crosses),
            "crosses_at": axis.crosses_at,
            "line_color": hex_or(axis.line.color, BLACK),
            "line_style": xl::line_style_name(axis.line.line_style.unwrap_or(xl::LINE_STYLE_CONTINUOUS)),
            "line_weight": axis.line.weight.unwrap_or(1.0),
            "major_unit": axis.major_unit,
            "max": axis.maximum_scale,
            "min": axis.minimum_scale,
            "minor_unit": axis.minor_unit,
            "scale_type": xl::scale_type_name(axis.scale_type),
            "tick_label_font_name": if axis.tick_label_font_name.is_empty() {
                DEFAULT_FONT
            } else {
                axis.tick_label_font_name.as_str()
            },
            "tick_label_font_size": if axis.tick_label_font_size > 0.0 {
                axis.tick_label_font_size
            } else {
                DEFAULT_FONT_SIZE
            },
            "tick_label_orientation": axis.tick_label_position,
            "tick_label_position": xl::tick_label_position_name(axis.tick_label_position),
        }),
        None => json!({
            "crosses": "AutoZero",
            "crosses_at": 0.0,
            "line_color": BLACK,
            "line_style": "Continuous",
            "line_weight": 1.0,
            "major_unit": 0.0,
            "max": 0.0,
            "min": 0.0,
            "minor_unit": 0.0,
            "scale_type": "Linear",
            "tick_label_font_name": DEFAULT_FONT,
            "tick_label_font_size": DEFAULT_FONT_SIZE,
            "tick_label_orientation": 0,
            "tick_label_position": "NextToAxis",
        }),
    };
    // axis titles are not read from Excel
    let title = json!({
        "title": "",
        "title_bold": false,
        "title_font_color": BLACK,
        "title_font_name": DEFAULT_FONT,
        "title_font_size": DEFAULT_FONT_SIZE,
        "title_italic": false,
        "title_underline": false,
    });

    let mut params = Parameters::new();
    for group in [scale, title] {
        if let Value::Object(map) = group {
            for (key, value) in map {
                params.insert(format!("{prefix}_{key}"), value);
            }
        }
    }
    params
}

pub fn chart_parameters(chart: &ChartSnapshot, worksheet_key: &str, timestamp: &str) -> Parameters {
    let name = if chart.name.is_empty() {
        "Unnamed Chart"
    } else {
        chart.name.as_str()
    };

    let mut params = object(json!({
        "chart_guid": new_guid(),
        "worksheet_guidref": worksheet_key,
        "chart_name": name,
        "chart_type": xl::chart_type_name(chart.chart_type),
        "version_timestamp": timestamp,
        "last_mod_time": timestamp,
        "left": chart.left,
        "top": chart.top,
        "width": chart.width,
        "height": chart.height,
    }));
    params.extend(area_parameters("chart_area", chart.chart_area.as_ref()));
    params.extend(area_parameters("plot_area", chart.plot_area.as_ref()));
    params.extend(object(three_d_parameters(chart.three_d.as_ref())));
    params.extend(object(style_parameters(chart.style.as_ref())));
    params.extend(object(title_parameters(chart.title.as_ref())));
    params.extend(object(legend_parameters(chart.legend.as_ref())));
    params.extend(axis_parameters("x_axis", chart.category_axis.as_ref()));
    params.extend(axis_parameters("y_axis", chart.value_axis.as_ref()));
    params
}
