//! Extraction of code and JSON from raw model output.

/// Extract source code from markdown code blocks or raw text
///
/// Handles:
/// - ```lua blocks
/// - Generic ``` blocks
/// - Raw source text
pub fn extract_code_block(text: &str) -> String {
    if let Some(start) = text.find("```lua") {
        let code_start = start + 6;
        let code_end = text[code_start..]
            .rfind("```")
            .map(|pos| pos + code_start)
            .unwrap_or(text.len());
        text[code_start..code_end].trim().to_string()
    } else if let Some(start) = text.find("```") {
        let code_start = start + 3;
        let code_end = text[code_start..]
            .rfind("```")
            .map(|pos| pos + code_start)
            .unwrap_or(text.len());
        // Drop a language tag left on the opening fence line
        let block = &text[code_start..code_end];
        match block.find('\n') {
            Some(nl) if block[..nl].trim().chars().all(|c| c.is_ascii_alphanumeric()) => {
                block[nl..].trim().to_string()
            }
            _ => block.trim().to_string(),
        }
    } else {
        text.trim().to_string()
    }
}

/// Extract the JSON object from model output as the outermost
/// brace-delimited slice. Tolerates fences and surrounding prose; the
/// braces of a fenced block are inside the slice either way.
pub fn extract_json_object(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(text[start..=end].to_string())
}
