//! Rendering of tool results into the history block the model reads back.

use stepforge_core::tool::ToolResult;

/// Wrap `results` into one `<tool_results>` block, one entry per result, in
/// dispatch order.
pub fn render_results(results: &[ToolResult]) -> String {
    let mut block = String::from("<tool_results>\n");
    for result in results {
        block.push_str("<tool_result>\n<tool>");
        block.push_str(&result.tool_name);
        block.push_str("</tool>\n<result>");
        block.push_str(&result.output);
        block.push_str("</result>\n</tool_result>\n");
    }
    block.push_str("</tool_results>");
    block
}
