//! Text blocks spliced into plotly.js.
//!
//! Both anchors are copied verbatim from `src/plots/plots.js` of the
//! plotly.js release installed by the viewer's lockfile. A different
//! upstream layout makes them miss, and the patch run then reports the
//! missing block instead of touching the file.

use crate::format::{
    HOURS_PER_DAY, MINUTES_PER_HOUR, MS_PER_SECOND, RELATIVE_TIME, RelativeTimeFormat,
    SECONDS_PER_MINUTE,
};

pub const UPSTREAM_PACKAGE: &str = "plotly.js";
pub const UPSTREAM_FILE: [&str; 3] = ["src", "plots", "plots.js"];

pub const FORMATTER_NAME: &str = "relativeTimeFormatter";

/// Presence of this text means the formatter was already injected.
pub const FORMATTER_SIGNATURE: &str = "function relativeTimeFormatter(milliseconds)";

/// The formatter is inserted right above this definition.
pub const INJECTION_ANCHOR: &str = "function getFormatter(formatObj, separators) {";

/// Locale-aware `numberFormat` factory returned by `getFormatter`.
pub const NUMBER_FORMAT_BLOCK: &str = concat!(
    "return {\n",
    "        numberFormat: function(formatStr) {\n",
    "            try {\n",
    "                formatStr = formatLocale(formatObj).format(\n",
    "                    Lib.adjustFormat(formatStr)\n",
    "                );\n",
    "            } catch(e) {\n",
    "                Lib.warnBadFormat(formatStr);\n",
    "                return Lib.noFormat;\n",
    "            }\n",
    "\n",
    "            return formatStr;\n",
    "        },",
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Injection {
    pub anchor: String,
    pub marker: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    pub anchor: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchBlocks {
    pub injection: Injection,
    pub replacement: Replacement,
}

impl PatchBlocks {
    pub fn relative_time() -> Self {
        Self::for_layout(&RELATIVE_TIME)
    }

    pub fn for_layout(layout: &RelativeTimeFormat) -> Self {
        Self {
            injection: Injection {
                anchor: INJECTION_ANCHOR.to_string(),
                marker: FORMATTER_SIGNATURE.to_string(),
                content: format!("{}\n\n", render_formatter(layout)),
            },
            replacement: Replacement {
                anchor: NUMBER_FORMAT_BLOCK.to_string(),
                content: render_number_format(),
            },
        }
    }
}

/// JavaScript source of the formatter for `layout`.
pub fn render_formatter(layout: &RelativeTimeFormat) -> String {
    let lines = [
        format!("{FORMATTER_SIGNATURE} {{"),
        "    let outputString = ''".to_string(),
        format!("    let seconds = milliseconds / {MS_PER_SECOND}"),
        format!("    let minutes = Math.floor(seconds / {SECONDS_PER_MINUTE})"),
        format!("    seconds %= {SECONDS_PER_MINUTE}"),
        format!("    let hours = Math.floor(minutes / {MINUTES_PER_HOUR})"),
        format!("    minutes %= {MINUTES_PER_HOUR}"),
        format!("    let days = Math.floor(hours / {HOURS_PER_DAY})"),
        format!("    hours %= {HOURS_PER_DAY}"),
        format!(
            "    outputString = '' + seconds.toFixed({}).padStart({}, '0')",
            layout.second_decimals, layout.second_width
        ),
        "    if (minutes >= 1 || hours >= 1 || days >= 1) {".to_string(),
        format!(
            "        outputString = `${{minutes}}`.padStart({}, '0') + ':' + outputString",
            layout.minute_width
        ),
        "    }".to_string(),
        "    if (hours >= 1 || days >= 1) {".to_string(),
        "        outputString = hours + ':' + outputString".to_string(),
        "    }".to_string(),
        "    if (days >= 1) {".to_string(),
        format!(
            "        outputString = days + '{}' + outputString",
            layout.days_suffix
        ),
        "    }".to_string(),
        "    return outputString".to_string(),
        "}".to_string(),
    ];
    lines.join("\n")
}

fn render_number_format() -> String {
    format!(
        "return {{\n        numberFormat: function(formatStr) {{\n            return {FORMATTER_NAME};\n        }},"
    )
}

/// Minimal stand-in for an unpatched `plots.js`.
#[cfg(test)]
pub(crate) fn sample_plots_js() -> String {
    format!(
        "'use strict';\n\nvar Lib = require('../lib');\n\n{INJECTION_ANCHOR}\n    var formatLocale = d3.formatLocale;\n    {NUMBER_FORMAT_BLOCK}\n        timeFormat: timeFormatLocale(formatObj).utcFormat\n    }};\n}}\n"
    )
}
