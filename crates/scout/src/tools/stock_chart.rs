use serde_json::json;

use super::Capability;
use crate::models::tool::Tool;

/// Lets the model ask the interface to render a chart. It has no executor: the
/// interface watches for the call and draws the chart itself.
pub fn stock_chart_capability() -> Capability {
    Capability::Signal(Tool::new(
        "stock_chart_ui",
        "Display the stock chart for the given stock symbol after web search.",
        json!({
            "type": "object",
            "required": ["symbol"],
            "properties": {
                "symbol": {
                    "type": "string",
                    "description": "The stock symbol to display the chart for."
                }
            }
        }),
    ))
}
