//! Prompt templates for whole-file improvement and single-function refactors.

use crate::analysis::DiagnosticSet;

/// Whole-file rewrite request: the full source followed by the findings to fix.
pub fn improvement_prompt(source: &str, diagnostics: &DiagnosticSet) -> String {
    format!(
        "Code:\n\n{source}\n\n\
Return **only** the improved, plain source code, without explanations, comments about \
the changes or markdown code fences (such as ```python). The result must be directly \
executable. Every module needs a docstring.\n\
Improve the Python code above by fixing the listed problems.\n\n\
Problems to fix:\n{issues}\n",
        source = source.trim_end(),
        issues = diagnostics.format_for_prompt(),
    )
}

/// Single-function refactor request. The original function must survive as
/// a thin wrapper so call sites keep working.
pub fn refactor_prompt(function_name: &str, function_source: &str) -> String {
    format!(
        "Here is the Python code of the function `{name}` that should be refactored:\n\n\
{code}\n\n\
### Task\n\
Refactor the code so that every resulting function has exactly one clearly delimited \
responsibility. Introduce as many well-named helper functions as are sensible. The \
original function `{name}` must remain, reduced to a wrapper that only calls the new \
helpers.\n\n\
Keep in mind:\n\
1. Reduce needless repetition and overly complicated control flow.\n\
2. Helper names should be self-explanatory and split the code into logical units.\n\
3. The semantics (result and behaviour) of `{name}` must not change.\n\
4. Return **only** the complete refactored code, as top-level definitions, without \
explanations.\n",
        name = function_name,
        code = function_source,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Diagnostic;

    #[test]
    fn improvement_prompt_embeds_source_and_findings() {
        let diagnostics = DiagnosticSet::from(vec![Diagnostic {
            code: "W0611".into(),
            message: "Unused import os".into(),
            description: "Unused import.".into(),
        }]);
        let prompt = improvement_prompt("import os\n\nx = 1\n", &diagnostics);
        assert!(prompt.starts_with("Code:\n\nimport os\n\nx = 1\n"));
        assert!(prompt.contains("- W0611 (Unused import os): Unused import."));
    }

    #[test]
    fn refactor_prompt_names_the_function() {
        let prompt = refactor_prompt("load", "def load():\n    pass");
        assert!(prompt.contains("function `load`"));
        assert!(prompt.contains("def load():\n    pass"));
    }
}
