//! `{name}` placeholder templates, used for money formats and cache keys.

use thiserror::Error;

/// Reasons a template cannot be rendered.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed placeholder")]
    Unclosed,

    #[error("unmatched '}}'")]
    Unmatched,

    #[error("no value for placeholder {{{0}}}")]
    Missing(String),
}

/// Render `{name}` placeholders through `lookup`; `{{` and `}}` are literal braces.
pub fn render_template<'a, F>(template: &str, lookup: F) -> Result<String, TemplateError>
where
    F: Fn(&str) -> Option<&'a str>,
{
    let mut out = String::with_capacity(template.len() + 8);
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for n in chars.by_ref() {
                    if n == '}' {
                        closed = true;
                        break;
                    }
                    name.push(n);
                }
                if !closed {
                    return Err(TemplateError::Unclosed);
                }
                match lookup(&name) {
                    Some(value) => out.push_str(value),
                    None => return Err(TemplateError::Missing(name)),
                }
            }
            '}' => return Err(TemplateError::Unmatched),
            c => out.push(c),
        }
    }

    Ok(out)
}
