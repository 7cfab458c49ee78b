//! `{variable}` substitution for custom provider command lines.
//!
//! - `{name}` substitutes the value of variable `name`
//! - `{{` renders as a literal `{`
//! - `}}` renders as a literal `}`
//!
//! Undefined variables are an error rather than an empty substitution, so a
//! typo in `agents.yaml` fails at load time instead of sending a blank prompt.

use std::collections::HashMap;
use thiserror::Error;

/// Error type for template rendering failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// A variable was referenced but not provided.
    #[error("undefined variable '{name}' at position {position}")]
    UndefinedVariable { name: String, position: usize },

    /// A `{` was found without a matching `}`.
    #[error("unmatched '{{' at position {position}")]
    UnmatchedBrace { position: usize },

    /// An empty variable name (`{}`).
    #[error("empty variable name '{{}}' at position {position}")]
    EmptyVariableName { position: usize },
}

/// Render `template`, substituting every `{name}` from `variables`.
pub fn render_template(
    template: &str,
    variables: &HashMap<&str, &str>,
) -> Result<String, TemplateError> {
    let mut result = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
                result.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, c)) => name.push(c),
                        None => return Err(TemplateError::UnmatchedBrace { position: pos }),
                    }
                }

                let name = name.trim();
                if name.is_empty() {
                    return Err(TemplateError::EmptyVariableName { position: pos });
                }

                let value = variables
                    .get(name)
                    .ok_or_else(|| TemplateError::UndefinedVariable {
                        name: name.to_string(),
                        position: pos,
                    })?;
                result.push_str(value);
            }
            '}' if matches!(chars.peek(), Some((_, '}'))) => {
                chars.next();
                result.push('}');
            }
            _ => result.push(ch),
        }
    }

    Ok(result)
}

/// Names of all variables referenced by `template`, in order of appearance.
pub fn template_variables(template: &str) -> Result<Vec<String>, TemplateError> {
    let mut names = Vec::new();
    let mut chars = template.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        match ch {
            '{' if matches!(chars.peek(), Some((_, '{'))) => {
                chars.next();
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some((_, '}')) => break,
                        Some((_, c)) => name.push(c),
                        None => return Err(TemplateError::UnmatchedBrace { position: pos }),
                    }
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err(TemplateError::EmptyVariableName { position: pos });
                }
                names.push(name.to_string());
            }
            _ => {}
        }
    }

    Ok(names)
}
