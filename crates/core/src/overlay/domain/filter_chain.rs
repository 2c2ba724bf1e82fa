use std::fmt;

use thiserror::Error;

use crate::shared::reader_error::ReaderError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilterChainError {
    #[error("empty filter description")]
    Empty,
    #[error("expected a filter name at '{0}'")]
    MissingName(String),
    #[error("pad labels are not supported: '{0}'")]
    Labels(String),
    #[error("only a single linear filter chain is supported")]
    MultipleChains,
    #[error("unexpected '{found}' after filter '{filter}'")]
    Unexpected { found: char, filter: String },
}

impl From<FilterChainError> for ReaderError {
    fn from(e: FilterChainError) -> Self {
        ReaderError::FilterGraph(e.to_string())
    }
}

/// One `key=value` (or positional `value`) argument of a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterOption {
    pub key: Option<String>,
    pub value: String,
}

/// One named stage of a linear chain, e.g. `drawbox=y=ih-68:t=fill`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterStage {
    pub name: String,
    pub options: Vec<FilterOption>,
}

impl FilterStage {
    /// Value of the first option named by any of `keys`.
    pub fn get(&self, keys: &[&str]) -> Option<&str> {
        self.options
            .iter()
            .find(|o| o.key.as_deref().is_some_and(|k| keys.contains(&k)))
            .map(|o| o.value.as_str())
    }

    /// The `index`-th unnamed argument.
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.options
            .iter()
            .filter(|o| o.key.is_none())
            .nth(index)
            .map(|o| o.value.as_str())
    }
}

impl fmt::Display for FilterStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, option) in self.options.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match &option.key {
                Some(key) => write!(f, "{key}={:?}", option.value)?,
                None => write!(f, "{:?}", option.value)?,
            }
        }
        f.write_str(")")
    }
}

/// Parses a linear filter chain: `name=k=v:k=v, name2=...`.
///
/// Quoting and backslash escapes are resolved at both the chain level and
/// the option level, the same two passes libavfilter applies.
pub fn parse_filter_chain(description: &str) -> Result<Vec<FilterStage>, FilterChainError> {
    let mut rest = description.trim();
    if rest.is_empty() {
        return Err(FilterChainError::Empty);
    }

    let mut stages = Vec::new();
    loop {
        rest = rest.trim_start();
        if rest.starts_with('[') {
            return Err(FilterChainError::Labels(rest.to_string()));
        }

        let name_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if name_len == 0 {
            return Err(FilterChainError::MissingName(rest.to_string()));
        }
        let name = rest[..name_len].to_string();
        rest = rest[name_len..].trim_start();

        let args = if let Some(after_eq) = rest.strip_prefix('=') {
            let (args, remaining) = take_token(after_eq, &[',', ';', '[', ']']);
            rest = remaining;
            args
        } else {
            String::new()
        };

        stages.push(FilterStage {
            name: name.clone(),
            options: parse_options(&args),
        });

        rest = rest.trim_start();
        match rest.chars().next() {
            None => break,
            Some(',') => rest = &rest[1..],
            Some(';') => return Err(FilterChainError::MultipleChains),
            Some('[') | Some(']') => return Err(FilterChainError::Labels(rest.to_string())),
            Some(found) => return Err(FilterChainError::Unexpected { found, filter: name }),
        }
    }

    Ok(stages)
}

fn parse_options(args: &str) -> Vec<FilterOption> {
    let mut options = Vec::new();
    let mut rest = args;

    while !rest.trim().is_empty() {
        let (token, remaining) = take_token(rest, &['=', ':']);
        if let Some(after_eq) = remaining.strip_prefix('=') {
            let (value, remaining) = take_token(after_eq, &[':']);
            options.push(FilterOption {
                key: Some(token),
                value,
            });
            rest = remaining;
        } else {
            options.push(FilterOption {
                key: None,
                value: token,
            });
            rest = remaining;
        }
        rest = rest.strip_prefix(':').unwrap_or(rest);
    }

    options
}

/// Reads up to the first unquoted, unescaped delimiter. Quotes are removed,
/// `\c` yields `c`, and unprotected trailing whitespace is trimmed.
fn take_token<'a>(input: &'a str, delimiters: &[char]) -> (String, &'a str) {
    let input = input.trim_start();
    let mut out = String::new();
    let mut protected_len = 0;
    let mut end = input.len();
    let mut chars = input.char_indices();

    while let Some((i, c)) = chars.next() {
        if delimiters.contains(&c) {
            end = i;
            break;
        }
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    out.push(escaped);
                }
                protected_len = out.len();
            }
            '\'' => {
                for (_, quoted) in chars.by_ref() {
                    if quoted == '\'' {
                        break;
                    }
                    out.push(quoted);
                }
                protected_len = out.len();
            }
            _ => out.push(c),
        }
    }

    let keep = out.trim_end().len().max(protected_len);
    out.truncate(keep);
    (out, &input[end..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::domain::overlay_config::OverlayConfig;

    #[test]
    fn test_parses_bar_and_text_chain() {
        let stages = parse_filter_chain(
            "drawbox=y=ih-68:color=black@0.4:width=iw:height=48:t=fill, \
             drawtext=fontfile=Font.ttf:text='Jane Doe | Editor':fontsize=24:x=20:y=(h-53)",
        )
        .unwrap();

        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0].name, "drawbox");
        assert_eq!(stages[0].get(&["y"]), Some("ih-68"));
        assert_eq!(stages[0].get(&["color"]), Some("black@0.4"));
        assert_eq!(stages[0].get(&["t", "thickness"]), Some("fill"));
        assert_eq!(stages[1].name, "drawtext");
        assert_eq!(stages[1].get(&["text"]), Some("Jane Doe | Editor"));
        assert_eq!(stages[1].get(&["y"]), Some("(h-53)"));
    }

    #[test]
    fn test_filter_without_arguments() {
        let stages = parse_filter_chain("null").unwrap();
        assert_eq!(stages.len(), 1);
        assert!(stages[0].options.is_empty());
    }

    #[test]
    fn test_positional_arguments() {
        let stages = parse_filter_chain("drawbox=10:20:30:40:red").unwrap();
        assert_eq!(stages[0].positional(0), Some("10"));
        assert_eq!(stages[0].positional(4), Some("red"));
        assert_eq!(stages[0].positional(5), None);
    }

    #[test]
    fn test_escaped_delimiters_survive_both_levels() {
        let mut overlay = OverlayConfig::default();
        overlay.bar.enabled = false;
        overlay.text.template = "a:b, c'd".to_string();
        let desc = overlay.to_filter_description().unwrap();

        let stages = parse_filter_chain(&desc).unwrap();
        assert_eq!(stages.len(), 1);
        assert_eq!(stages[0].get(&["text"]), Some("a:b, c'd"));
    }

    #[test]
    fn test_default_overlay_parses() {
        let desc = OverlayConfig::default().to_filter_description().unwrap();
        let stages = parse_filter_chain(&desc).unwrap();
        let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["drawbox", "drawtext"]);
        assert_eq!(stages[1].get(&["text"]), Some("Presenter | Live"));
    }

    #[test]
    fn test_empty_description_fails() {
        assert_eq!(parse_filter_chain("  "), Err(FilterChainError::Empty));
    }

    #[test]
    fn test_labels_are_rejected() {
        assert!(matches!(
            parse_filter_chain("[in]drawbox[out]"),
            Err(FilterChainError::Labels(_))
        ));
    }

    #[test]
    fn test_multiple_chains_are_rejected() {
        assert_eq!(
            parse_filter_chain("null; null"),
            Err(FilterChainError::MultipleChains)
        );
    }

    #[test]
    fn test_missing_name_fails() {
        assert!(matches!(
            parse_filter_chain("drawbox, , null"),
            Err(FilterChainError::MissingName(_))
        ));
    }

    #[test]
    fn test_display_lists_options() {
        let stages = parse_filter_chain("drawbox=x=1:red").unwrap();
        assert_eq!(stages[0].to_string(), r#"drawbox(x="1", "red")"#);
    }

    #[test]
    fn test_error_converts_to_filter_graph_error() {
        let err: ReaderError = FilterChainError::MultipleChains.into();
        assert!(matches!(err, ReaderError::FilterGraph(_)));
    }
}
