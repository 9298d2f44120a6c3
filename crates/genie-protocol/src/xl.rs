//! Excel object-model enumeration codes and their display names.

// XlHAlign
pub const HALIGN_GENERAL: i32 = 1;
pub const HALIGN_LEFT: i32 = -4131;
pub const HALIGN_CENTER: i32 = -4108;
pub const HALIGN_RIGHT: i32 = -4152;
pub const HALIGN_FILL: i32 = 5;
pub const HALIGN_JUSTIFY: i32 = -4130;
pub const HALIGN_CENTER_ACROSS_SELECTION: i32 = 7;
pub const HALIGN_DISTRIBUTED: i32 = -4117;

// XlVAlign
pub const VALIGN_TOP: i32 = -4160;
pub const VALIGN_CENTER: i32 = -4108;
pub const VALIGN_BOTTOM: i32 = -4107;
pub const VALIGN_JUSTIFY: i32 = -4130;
pub const VALIGN_DISTRIBUTED: i32 = -4117;

// XlLineStyle
pub const LINE_STYLE_CONTINUOUS: i32 = 1;
pub const LINE_STYLE_DASH: i32 = -4115;
pub const LINE_STYLE_DASH_DOT: i32 = 4;
pub const LINE_STYLE_DASH_DOT_DOT: i32 = 5;
pub const LINE_STYLE_DOT: i32 = -4118;
pub const LINE_STYLE_DOUBLE: i32 = -4119;
pub const LINE_STYLE_SLANT_DASH_DOT: i32 = 13;
pub const LINE_STYLE_NONE: i32 = -4142;

// XlBorderWeight
pub const BORDER_WEIGHT_HAIRLINE: i32 = 1;
pub const BORDER_WEIGHT_THIN: i32 = 2;
pub const BORDER_WEIGHT_MEDIUM: i32 = -4138;
pub const BORDER_WEIGHT_THICK: i32 = 4;

// XlBordersIndex
pub const EDGE_LEFT: i32 = 7;
pub const EDGE_TOP: i32 = 8;
pub const EDGE_BOTTOM: i32 = 9;
pub const EDGE_RIGHT: i32 = 10;

// XlUnderlineStyle
pub const UNDERLINE_NONE: i32 = -4142;
pub const UNDERLINE_SINGLE: i32 = 2;

// XlPattern
pub const PATTERN_AUTOMATIC: i32 = -4105;
pub const PATTERN_CHECKER: i32 = 9;
pub const PATTERN_CRISS_CROSS: i32 = 16;
pub const PATTERN_DOWN: i32 = -4121;
pub const PATTERN_GRAY16: i32 = 17;
pub const PATTERN_GRAY25: i32 = -4124;
pub const PATTERN_GRAY50: i32 = -4125;
pub const PATTERN_GRAY75: i32 = -4126;
pub const PATTERN_GRAY8: i32 = 18;
pub const PATTERN_GRID: i32 = 15;
pub const PATTERN_HORIZONTAL: i32 = -4128;
pub const PATTERN_LIGHT_DOWN: i32 = 13;
pub const PATTERN_LIGHT_HORIZONTAL: i32 = 11;
pub const PATTERN_LIGHT_UP: i32 = 14;
pub const PATTERN_LIGHT_VERTICAL: i32 = 12;
pub const PATTERN_NONE: i32 = -4142;
pub const PATTERN_SEMI_GRAY75: i32 = 10;
pub const PATTERN_SOLID: i32 = 1;
pub const PATTERN_UP: i32 = -4162;
pub const PATTERN_VERTICAL: i32 = -4166;

// XlCellType
pub const CELL_TYPE_CONSTANTS: i32 = 2;
pub const CELL_TYPE_FORMULAS: i32 = -4123;

// XlAxisType
pub const AXIS_CATEGORY: i32 = 1;
pub const AXIS_VALUE: i32 = 2;

// XlSheetVisibility
pub const SHEET_VISIBLE: i32 = -1;

// XlPageOrientation
pub const PORTRAIT: i32 = 1;
pub const LANDSCAPE: i32 = 2;

// XlRowCol
pub const PLOT_BY_ROWS: i32 = 1;
pub const PLOT_BY_COLUMNS: i32 = 2;

// vbext_ComponentType
pub const VBEXT_CT_STD_MODULE: i32 = 1;

pub fn horizontal_alignment_name(code: i32) -> &'static str {
    match code {
        HALIGN_LEFT => "Left",
        HALIGN_CENTER => "Center",
        HALIGN_RIGHT => "Right",
        HALIGN_JUSTIFY => "Justify",
        HALIGN_DISTRIBUTED => "Distributed",
        HALIGN_FILL => "Fill",
        HALIGN_CENTER_ACROSS_SELECTION => "CenterAcrossSelection",
        _ => "General",
    }
}

pub fn vertical_alignment_name(code: i32) -> &'static str {
    match code {
        VALIGN_TOP => "Top",
        VALIGN_CENTER => "Center",
        VALIGN_JUSTIFY => "Justify",
        VALIGN_DISTRIBUTED => "Distributed",
        _ => "Bottom",
    }
}

pub fn line_style_name(code: i32) -> &'static str {
    match code {
        LINE_STYLE_CONTINUOUS => "Continuous",
        LINE_STYLE_DASH => "Dash",
        LINE_STYLE_DASH_DOT => "DashDot",
        LINE_STYLE_DASH_DOT_DOT => "DashDotDot",
        LINE_STYLE_DOT => "Dot",
        LINE_STYLE_DOUBLE => "Double",
        LINE_STYLE_SLANT_DASH_DOT => "SlantDashDot",
        _ => "None",
    }
}

pub fn border_weight_name(code: i32) -> &'static str {
    match code {
        BORDER_WEIGHT_HAIRLINE => "Hairline",
        BORDER_WEIGHT_MEDIUM => "Medium",
        BORDER_WEIGHT_THICK => "Thick",
        _ => "Thin",
    }
}

pub fn pattern_name(code: i32) -> &'static str {
    match code {
        PATTERN_AUTOMATIC => "Automatic",
        PATTERN_CHECKER => "Checker",
        PATTERN_CRISS_CROSS => "CrissCross",
        PATTERN_DOWN => "Down",
        PATTERN_GRAY16 => "Gray16",
        PATTERN_GRAY25 => "Gray25",
        PATTERN_GRAY50 => "Gray50",
        PATTERN_GRAY75 => "Gray75",
        PATTERN_GRAY8 => "Gray8",
        PATTERN_GRID => "Grid",
        PATTERN_HORIZONTAL => "Horizontal",
        PATTERN_LIGHT_DOWN => "LightDown",
        PATTERN_LIGHT_HORIZONTAL => "LightHorizontal",
        PATTERN_LIGHT_UP => "LightUp",
        PATTERN_LIGHT_VERTICAL => "LightVertical",
        PATTERN_SEMI_GRAY75 => "SemiGray75",
        PATTERN_SOLID => "Solid",
        PATTERN_UP => "Up",
        PATTERN_VERTICAL => "Vertical",
        _ => "None",
    }
}

pub fn orientation_name(code: i32) -> &'static str {
    match code {
        LANDSCAPE => "Landscape",
        _ => "Portrait",
    }
}

pub fn plot_by_name(code: i32) -> &'static str {
    match code {
        PLOT_BY_ROWS => "Rows",
        _ => "Columns",
    }
}

pub fn legend_position_name(code: i32) -> &'static str {
    match code {
        -4107 => "Bottom",
        2 => "Corner",
        -4131 => "Left",
        -4152 => "Right",
        -4160 => "Top",
        -4161 => "Custom",
        _ => "None",
    }
}

pub fn axis_crosses_name(code: i32) -> &'static str {
    match code {
        -4105 => "AutoZero",
        4 => "Custom",
        2 => "Maximum",
        4148 => "Minimum",
        _ => "AutoZero",
    }
}

pub fn scale_type_name(code: i32) -> &'static str {
    match code {
        -4133 => "Logarithmic",
        _ => "Linear",
    }
}

pub fn tick_label_position_name(code: i32) -> &'static str {
    match code {
        -4127 => "High",
        -4134 => "Low",
        -4142 => "None",
        _ => "NextToAxis",
    }
}

/// Name of an `XlChartType`; unknown codes are rendered as their number.
pub fn chart_type_name(code: i32) -> String {
    let name = match code {
        51 => "ColumnClustered",
        52 => "ColumnStacked",
        53 => "ColumnStacked100",
        57 => "BarClustered",
        58 => "BarStacked",
        59 => "BarStacked100",
        4 => "Line",
        63 => "LineStacked",
        65 => "LineMarkers",
        5 => "Pie",
        69 => "PieExploded",
        -4120 => "Doughnut",
        1 => "Area",
        76 => "AreaStacked",
        77 => "AreaStacked100",
        -4169 => "XYScatter",
        72 => "XYScatterSmooth",
        74 => "XYScatterLines",
        15 => "Bubble",
        -4151 => "Radar",
        88 => "StockHLC",
        83 => "Surface",
        -4100 => "3DColumn",
        -4101 => "3DLine",
        -4102 => "3DPie",
        _ => return code.to_string(),
    };
    name.to_string()
}

/// Format an OLE color number as `#RRGGBB`-style hex the way Excel reports it
/// (the low 24 bits, byte order untouched). Missing or negative (automatic)
/// colors become black.
pub fn color_hex(color: Option<f64>) -> String {
    match color {
        Some(c) if c.is_finite() && c >= 0.0 => {
            let value = (c as i64) & 0xFF_FFFF;
            format!("#{value:06X}")
        }
        _ => "#000000".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_color_hex() {
        assert_eq!(color_hex(Some(16_777_215.0)), "#FFFFFF");
        assert_eq!(color_hex(Some(255.0)), "#0000FF");
        assert_eq!(color_hex(Some(0.0)), "#000000");
        assert_eq!(color_hex(Some(-4105.0)), "#000000");
        assert_eq!(color_hex(None), "#000000");
        // values wider than 24 bits keep their last six hex digits
        assert_eq!(color_hex(Some(0x1_2345_67 as f64)), "#234567");
    }

    #[test]
    fn test_alignment_names() {
        assert_eq!(horizontal_alignment_name(HALIGN_CENTER), "Center");
        assert_eq!(horizontal_alignment_name(HALIGN_GENERAL), "General");
        assert_eq!(horizontal_alignment_name(12345), "General");
        assert_eq!(vertical_alignment_name(VALIGN_TOP), "Top");
        assert_eq!(vertical_alignment_name(0), "Bottom");
    }

    #[test]
    fn test_border_and_pattern_names() {
        assert_eq!(line_style_name(LINE_STYLE_DOUBLE), "Double");
        assert_eq!(line_style_name(LINE_STYLE_NONE), "None");
        assert_eq!(border_weight_name(BORDER_WEIGHT_MEDIUM), "Medium");
        assert_eq!(border_weight_name(0), "Thin");
        assert_eq!(pattern_name(PATTERN_SOLID), "Solid");
        assert_eq!(pattern_name(PATTERN_GRAY25), "Gray25");
        assert_eq!(pattern_name(999), "None");
    }

    #[test]
    fn test_chart_type_name() {
        assert_eq!(chart_type_name(51), "ColumnClustered");
        assert_eq!(chart_type_name(-4169), "XYScatter");
        assert_eq!(chart_type_name(4242), "4242");
    }
}
