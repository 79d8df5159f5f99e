//! Prompt templates for test-case and script synthesis.
//!
//! Templates are plain data with `{name}` placeholders. Rendering is a
//! single left-to-right pass, so placeholder-looking text inside a
//! substituted value (HTML, JSON, retrieved passages) is never expanded.

use anyhow::{bail, Result};

/// A fixed prompt with named placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub template: &'static str,
    pub input_variables: &'static [&'static str],
}

impl PromptTemplate {
    /// Substitute every declared variable.
    ///
    /// Fails if a declared variable has no value or a value is supplied for
    /// an undeclared name. Braces that do not enclose a declared name are
    /// copied through unchanged.
    pub fn render(&self, values: &[(&str, &str)]) -> Result<String> {
        for (name, _) in values {
            if !self.input_variables.iter().any(|v| v == name) {
                bail!("unknown prompt variable: {}", name);
            }
        }
        for var in self.input_variables {
            if !values.iter().any(|(name, _)| name == var) {
                bail!("missing prompt variable: {}", var);
            }
        }

        let mut out = String::with_capacity(self.template.len());
        let mut rest = self.template;
        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            let value = after.find('}').and_then(|close| {
                let name = &after[..close];
                values
                    .iter()
                    .find(|(n, _)| *n == name)
                    .map(|(_, v)| (*v, close))
            });
            match value {
                Some((v, close)) => {
                    out.push_str(v);
                    rest = &after[close + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        Ok(out)
    }
}

/// Test-case synthesis: `{context}` retrieved passages, `{question}` the user request.
pub const TEST_CASE_PROMPT: PromptTemplate = PromptTemplate {
    template: r#"
You are an expert QA Automation Engineer. Generate comprehensive test cases from the project documentation and HTML context below.

Context:
{context}

User Request: {question}

Instructions:
1. Analyze the provided context (requirements, UI guides, API docs, HTML).
2. Generate positive and negative test cases relevant to the user request.
3. Ground every test case in the documentation.
4. Output a JSON array of objects with exactly these keys:
   - test_id
   - feature
   - test_scenario
   - expected_result
   - test_type (Positive/Negative)
   - grounded_in (source document filename)

Output JSON only. Do not wrap it in markdown code fences.
"#,
    input_variables: &["context", "question"],
};

/// Script synthesis: the selected test case, the target page HTML, and supporting docs.
pub const SELENIUM_SCRIPT_PROMPT: PromptTemplate = PromptTemplate {
    template: r#"
You are an expert Selenium Python Automation Engineer. Write a robust, executable Selenium script for the test case below.

Test Case:
{test_case}

HTML Context (Target Page):
{html_context}

Documentation Context:
{doc_context}

Instructions:
1. Use Python and Selenium WebDriver.
2. Use `webdriver.Chrome()` (assume chromedriver is on PATH or use webdriver_manager).
3. Use explicit waits (`WebDriverWait`) for element interactions.
4. Use precise selectors taken from the HTML above (ID, name, CSS selector, XPath).
5. Implement the steps of the test case.
6. Assert the expected result.
7. Comment each step.
8. Handle errors with try/except.
9. Produce a complete, runnable standalone file.

Output the Python code only. Do not wrap it in markdown code fences.
"#,
    input_variables: &["test_case", "html_context", "doc_context"],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_test_case_prompt() {
        let out = TEST_CASE_PROMPT
            .render(&[("context", "CTX-BODY"), ("question", "discount codes")])
            .unwrap();
        assert!(out.contains("Context:\nCTX-BODY\n"));
        assert!(out.contains("User Request: discount codes"));
        assert!(!out.contains("{context}"));
    }

    #[test]
    fn substituted_values_are_not_expanded_again() {
        let out = SELENIUM_SCRIPT_PROMPT
            .render(&[
                ("test_case", "{\"test_id\": \"{doc_context}\"}"),
                ("html_context", "<style>a { color: red }</style>"),
                ("doc_context", "DOCS"),
            ])
            .unwrap();
        assert!(out.contains("{\"test_id\": \"{doc_context}\"}"));
        assert!(out.contains("<style>a { color: red }</style>"));
        assert!(out.contains("Documentation Context:\nDOCS"));
    }

    #[test]
    fn missing_or_unknown_variables_fail() {
        assert!(TEST_CASE_PROMPT.render(&[("context", "x")]).is_err());
        assert!(TEST_CASE_PROMPT
            .render(&[("context", "x"), ("question", "y"), ("extra", "z")])
            .is_err());
    }

    #[test]
    fn every_declared_variable_appears_in_template() {
        for t in [TEST_CASE_PROMPT, SELENIUM_SCRIPT_PROMPT] {
            for var in t.input_variables {
                assert!(t.template.contains(&format!("{{{}}}", var)), "{}", var);
            }
        }
    }
}
