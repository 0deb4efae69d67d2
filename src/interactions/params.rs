//! Interaction strings
//!
//! `"hold(duration=0.4,pressPoint=0.6),tap"` parses into a list of
//! interaction names with raw `key=value` parameters. Values are converted
//! (and unknown keys rejected) when the interaction is constructed, which
//! happens while bindings are resolved.

use std::str::FromStr;

use crate::error::{InputError, Result};

/// One interaction of a chain, as written
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionSpec {
    pub name: String,
    pub params: InteractionParams,
}

/// Raw parameters of one interaction
#[derive(Debug, Clone, PartialEq, Default)]
pub struct InteractionParams {
    interaction: String,
    values: Vec<(String, String)>,
}

impl InteractionParams {
    pub fn new(interaction: impl Into<String>) -> Self {
        Self {
            interaction: interaction.into(),
            values: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.push((key.into(), value.into()));
        self
    }

    pub fn interaction(&self) -> &str {
        &self.interaction
    }

    fn raw(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    fn error(&self, key: &str, message: impl Into<String>) -> InputError {
        InputError::invalid_parameter(&self.interaction, key, message)
    }

    /// Reject keys not in `known`
    pub fn expect_only(&self, known: &[&str]) -> Result<()> {
        for (key, _) in &self.values {
            if !known.iter().any(|k| k.eq_ignore_ascii_case(key)) {
                let message = format!("unknown parameter (expected one of {})", known.join(", "));
                return Err(self.error(key, message));
            }
        }
        Ok(())
    }

    /// Parse a value with `FromStr`
    pub fn get<T: FromStr>(&self, key: &str) -> Result<Option<T>> {
        match self.raw(key) {
            None => Ok(None),
            Some(raw) => raw
                .trim()
                .parse::<T>()
                .map(Some)
                .map_err(|_| self.error(key, format!("cannot parse '{}'", raw))),
        }
    }

    /// Seconds; must be finite and non-negative
    pub fn duration(&self, key: &str) -> Result<Option<f64>> {
        let value: Option<f64> = self.get(key)?;
        match value {
            Some(v) if !v.is_finite() || v < 0.0 => {
                Err(self.error(key, "must be a non-negative number of seconds"))
            }
            other => Ok(other),
        }
    }

    /// Actuation threshold; must be finite and non-negative
    pub fn threshold(&self, key: &str) -> Result<Option<f32>> {
        let value: Option<f32> = self.get(key)?;
        match value {
            Some(v) if !v.is_finite() || v < 0.0 => {
                Err(self.error(key, "must be a non-negative actuation"))
            }
            other => Ok(other),
        }
    }
}

/// Split `text` at commas that are not inside parentheses
fn split_top_level(text: &str) -> Result<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return Err(InputError::invalid_parameter(text, "", "unbalanced ')'"));
                }
            }
            ',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(InputError::invalid_parameter(text, "", "unbalanced '('"));
    }
    parts.push(&text[start..]);
    Ok(parts)
}

/// Parse an interaction chain string; an empty string yields no interactions
pub fn parse_interactions(text: &str) -> Result<Vec<InteractionSpec>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    split_top_level(text)?
        .into_iter()
        .map(|part| {
            let part = part.trim();
            let (name, args) = match part.find('(') {
                Some(open) => {
                    let args = part[open + 1..]
                        .strip_suffix(')')
                        .ok_or_else(|| {
                            InputError::invalid_parameter(part, "", "expected ')' at end")
                        })?;
                    (part[..open].trim(), Some(args))
                }
                None => (part, None),
            };
            if name.is_empty() {
                return Err(InputError::UnknownInteraction {
                    name: part.to_string(),
                });
            }

            let mut params = InteractionParams::new(name);
            for pair in args.into_iter().flat_map(|a| a.split(',')) {
                let pair = pair.trim();
                if pair.is_empty() {
                    continue;
                }
                let (key, value) = pair
                    .split_once('=')
                    .ok_or_else(|| {
                        InputError::invalid_parameter(name, pair, "expected key=value")
                    })?;
                params = params.with(key.trim(), value.trim());
            }

            Ok(InteractionSpec {
                name: name.to_string(),
                params,
            })
        })
        .collect()
}
