//! Prompts sent alongside each page image.
//!
//! Callers can override the default via
//! [`crate::config::ExplainConfig::prompt_template`]; the template here is
//! used only when no override is provided.

/// Default explanation prompt. `{page}` and `{total}` are substituted.
pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"Analyze this PDF page (page {page} of {total}) and provide a comprehensive explanation. Include:

1. **Main Content**: A clear explanation of the primary content and topics covered on this page
2. **Elaboration**: Additional context, background information, and deeper insights
3. **Visual Analysis**: If there are graphs, charts, tables, or diagrams, provide a detailed written explanation/analysis of what they show, their significance, and key data points
4. **Key Takeaways**: Important points, conclusions, or insights from this page

Format your response clearly with sections. Be thorough but concise - provide enough information for someone to form a solid understanding of the content on this slide/page."#;

/// Build the prompt for one page.
pub fn explanation_prompt(template: Option<&str>, page_num: usize, total_pages: usize) -> String {
    template
        .unwrap_or(DEFAULT_PROMPT_TEMPLATE)
        .replace("{page}", &page_num.to_string())
        .replace("{total}", &total_pages.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_prompt_names_page_position() {
        let p = explanation_prompt(None, 3, 12);
        assert!(p.contains("page 3 of 12"));
        assert!(p.contains("**Visual Analysis**"));
        assert!(!p.contains("{page}"));
    }

    #[test]
    fn custom_template_substitutes_both_fields() {
        let p = explanation_prompt(Some("Summarise slide {page}/{total}."), 1, 2);
        assert_eq!(p, "Summarise slide 1/2.");
    }
}
