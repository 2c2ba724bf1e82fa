use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::shared::constants::{DEFAULT_FONT_FILE, DEFAULT_OVERLAY_TEXT};
use crate::shared::reader_config::ConfigError;

/// Semi-transparent bar drawn across the bottom of the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BarStyle {
    pub enabled: bool,
    /// Distance from the bottom edge to the bar's top edge, in pixels.
    pub bottom_offset: u32,
    pub height: u32,
    pub color: String,
    pub opacity: f32,
}

impl Default for BarStyle {
    fn default() -> Self {
        Self {
            enabled: true,
            bottom_offset: 68,
            height: 48,
            color: "black".to_string(),
            opacity: 0.4,
        }
    }
}

/// Caption drawn over the bar. `template` uses `{key}` placeholders filled
/// from `values`; `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TextStyle {
    pub font_file: String,
    pub template: String,
    pub values: BTreeMap<String, String>,
    pub font_size: u32,
    pub color: String,
    pub x: u32,
    /// Distance from the bottom edge to the text's top edge, in pixels.
    pub bottom_offset: u32,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            font_file: DEFAULT_FONT_FILE.to_string(),
            template: DEFAULT_OVERLAY_TEXT.to_string(),
            values: BTreeMap::from([
                ("name".to_string(), "Presenter".to_string()),
                ("role".to_string(), "Live".to_string()),
            ]),
            font_size: 24,
            color: "white".to_string(),
            x: 20,
            bottom_offset: 53,
        }
    }
}

/// The overlay drawn on every frame, rendered into a filter-chain
/// description at open time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub bar: BarStyle,
    pub text: TextStyle,
}

impl OverlayConfig {
    pub fn with_value(mut self, key: &str, value: &str) -> Self {
        self.text.values.insert(key.to_string(), value.to_string());
        self
    }

    pub fn rendered_text(&self) -> Result<String, ConfigError> {
        render_template(&self.text.template, &self.text.values)
    }

    /// Renders `drawbox, drawtext`. Stages with nothing to draw are left out;
    /// an overlay with no stages passes frames through unchanged.
    pub fn to_filter_description(&self) -> Result<String, ConfigError> {
        if !(0.0..=1.0).contains(&self.bar.opacity) {
            return Err(ConfigError::Invalid(format!(
                "bar opacity must be between 0.0 and 1.0, got {}",
                self.bar.opacity
            )));
        }

        let mut stages = Vec::new();

        if self.bar.enabled && self.bar.height > 0 {
            stages.push(format!(
                "drawbox=y=ih-{}:color={}@{}:width=iw:height={}:t=fill",
                self.bar.bottom_offset,
                escape_value(&self.bar.color),
                self.bar.opacity,
                self.bar.height
            ));
        }

        let text = self.rendered_text()?;
        if !text.is_empty() {
            stages.push(format!(
                "drawtext=fontfile={}:text={}:fontcolor={}:fontsize={}:x={}:y=(h-{})",
                escape_value(&self.text.font_file),
                escape_value(&escape_text_expansion(&text)),
                escape_value(&self.text.color),
                self.text.font_size,
                self.text.x,
                self.text.bottom_offset
            ));
        }

        if stages.is_empty() {
            return Ok("null".to_string());
        }
        Ok(stages.join(", "))
    }
}

/// Fills `{key}` placeholders from `values`.
pub fn render_template(
    template: &str,
    values: &BTreeMap<String, String>,
) -> Result<String, ConfigError> {
    let mut out = String::with_capacity(template.len());
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
                let mut key = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(k) => key.push(k),
                        None => return Err(ConfigError::UnterminatedPlaceholder),
                    }
                }
                let value = values
                    .get(key.trim())
                    .ok_or_else(|| ConfigError::UnknownPlaceholder(key.trim().to_string()))?;
                out.push_str(value);
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// drawtext expands `%{...}` sequences and treats `\` as an escape.
fn escape_text_expansion(text: &str) -> String {
    escape_chars(text, &['\\', '%'])
}

/// Escapes a value for both the option parser and the graph parser.
fn escape_value(value: &str) -> String {
    let option_level = escape_chars(value, &['\\', '\'', ':']);
    escape_chars(&option_level, &['\\', '\'', '[', ']', ',', ';'])
}

fn escape_chars(value: &str, specials: &[char]) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if specials.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
