use crate::language::LanguageProfile;

pub fn planning_prompt(requirement: &str) -> String {
    format!(
        r#"You are Momentum, an expert software engineer. Your task is to decompose a high-level business requirement into a detailed, step-by-step plan that a junior developer could follow.

Each step should be a clear, actionable task. Do not write the code, only the plan.

Requirement: {requirement}

Plan:"#
    )
}

pub fn code_generation_prompt(plan: &str, language: &LanguageProfile, path: &str) -> String {
    let tag = &language.markdown_tag;
    format!(
        r#"You are Momentum, an expert {lang} engineer. Implement the following plan as a single {lang} source file that will be saved as `{path}`.

## Plan
{plan}

## Guidelines
- Return only the complete file content inside one ```{tag} fenced block.
- Do not include explanations before or after the code.
- Keep the implementation focused on the plan."#,
        lang = language.display_name,
    )
}

pub fn test_generation_prompt(code: &str, language: &LanguageProfile, code_path: &str) -> String {
    let tag = &language.markdown_tag;
    format!(
        r#"You are Momentum, an expert {lang} engineer. Write {framework} tests for the code below, which lives at `{code_path}`.

```{tag}
{code}
```

## Guidelines
- Return only the complete test file inside one ```{tag} fenced block.
- Cover the main behaviour and at least one edge case.
- The tests must run with {framework} without extra configuration."#,
        lang = language.display_name,
        framework = language.test_framework,
    )
}

pub fn fix_prompt(code: &str, language: &LanguageProfile, feedback: &str) -> String {
    let tag = &language.markdown_tag;
    format!(
        r#"You are Momentum, an expert {lang} engineer. A reviewer left feedback on your pull request. Rewrite the code so that every comment is addressed.

## Current code
```{tag}
{code}
```

## Review feedback
{feedback}

## Guidelines
- Return only the complete corrected file inside one ```{tag} fenced block.
- Address each comment specifically; do not change unrelated behaviour.
- Keep the file testable with {framework}."#,
        lang = language.display_name,
        framework = language.test_framework,
    )
}

/// Join review comment bodies, in order, into one feedback block.
pub fn feedback_block<'a>(bodies: impl IntoIterator<Item = &'a str>) -> String {
    bodies
        .into_iter()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Pull source text out of a model answer.
///
/// Prefers the first fence tagged with `markdown_tag`, then the first fence of any kind,
/// then the whole answer. The result is trimmed.
pub fn extract_code(text: &str, markdown_tag: &str) -> String {
    let fences = fenced_blocks(text);

    fences
        .iter()
        .find(|(info, _)| info.eq_ignore_ascii_case(markdown_tag))
        .or_else(|| fences.first())
        .map(|(_, body)| body.trim().to_string())
        .unwrap_or_else(|| text.trim().to_string())
}

fn fenced_blocks(text: &str) -> Vec<(String, String)> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, Vec<&str>)> = None;

    for line in text.lines() {
        let trimmed = line.trim_start();
        match current.take() {
            None => {
                if let Some(info) = trimmed.strip_prefix("```") {
                    current = Some((info.trim().to_string(), Vec::new()));
                }
            }
            Some((info, mut body)) => {
                if trimmed.starts_with("```") {
                    blocks.push((info, body.join("\n")));
                } else {
                    body.push(line);
                    current = Some((info, body));
                }
            }
        }
    }

    // Unterminated fence: keep what we have.
    if let Some((info, body)) = current {
        blocks.push((info, body.join("\n")));
    }

    blocks
}
