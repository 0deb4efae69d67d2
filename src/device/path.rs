//! Binding paths
//!
//! Syntax: `<Layout>{Usage}name/child/...`. The first component selects the
//! device, the remaining ones walk the device's control names. Any component
//! may combine a layout constraint, usage constraints and a name; `*` in a
//! name matches any run of characters. Matching is case-insensitive.
//!
//! ```text
//! <Gamepad>/buttonSouth
//! <Gamepad>{RightHand}/leftStick/x
//! /Gamepad1/buttonNorth
//! <Gamepad>/{PrimaryAction}
//! <Keyboard>/*
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{InputError, Result};

/// One slash-separated component of a [`BindingPath`]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PathComponent {
    pub layout: Option<String>,
    pub usages: Vec<String>,
    pub name: Option<String>,
}

impl PathComponent {
    fn parse(path: &str, text: &str) -> Result<Self> {
        let mut component = PathComponent::default();
        let mut rest = text;

        if let Some(after) = rest.strip_prefix('<') {
            let end = after
                .find('>')
                .ok_or_else(|| InputError::invalid_path(path, "unterminated '<'"))?;
            let layout = &after[..end];
            if layout.is_empty() {
                return Err(InputError::invalid_path(path, "empty layout"));
            }
            component.layout = Some(layout.to_string());
            rest = &after[end + 1..];
        }

        while let Some(after) = rest.strip_prefix('{') {
            let end = after
                .find('}')
                .ok_or_else(|| InputError::invalid_path(path, "unterminated '{'"))?;
            let usage = &after[..end];
            if usage.is_empty() {
                return Err(InputError::invalid_path(path, "empty usage"));
            }
            component.usages.push(usage.to_string());
            rest = &after[end + 1..];
        }

        if rest.contains(['<', '>', '{', '}']) {
            return Err(InputError::invalid_path(path, format!("unexpected bracket in '{}'", text)));
        }
        if !rest.is_empty() {
            component.name = Some(rest.to_string());
        }

        if component.layout.is_none() && component.usages.is_empty() && component.name.is_none() {
            return Err(InputError::invalid_path(path, "empty component"));
        }
        Ok(component)
    }

    /// Whether `name` satisfies the name part (absent name matches anything)
    pub fn name_matches(&self, name: &str) -> bool {
        self.name
            .as_deref()
            .map_or(true, |pattern| wildcard_match(pattern, name))
    }

    pub fn usages_match(&self, mut has_usage: impl FnMut(&str) -> bool) -> bool {
        self.usages.iter().all(|u| has_usage(u))
    }
}

impl fmt::Display for PathComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(layout) = &self.layout {
            write!(f, "<{}>", layout)?;
        }
        for usage in &self.usages {
            write!(f, "{{{}}}", usage)?;
        }
        if let Some(name) = &self.name {
            f.write_str(name)?;
        }
        Ok(())
    }
}

/// Parsed binding path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingPath {
    pub device: PathComponent,
    pub controls: Vec<PathComponent>,
}

impl BindingPath {
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        let body = trimmed.strip_prefix('/').unwrap_or(trimmed);
        if body.is_empty() {
            return Err(InputError::invalid_path(path, "path is empty"));
        }

        let mut components = body
            .split('/')
            .map(|part| PathComponent::parse(path, part))
            .collect::<Result<Vec<_>>>()?;

        let device = components.remove(0);
        Ok(Self {
            device,
            controls: components,
        })
    }

    /// Whether the path only names a device
    pub fn is_device_only(&self) -> bool {
        self.controls.is_empty()
    }
}

impl FromStr for BindingPath {
    type Err = InputError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for BindingPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bare device names are written with a leading slash
        if self.device.layout.is_none() && self.device.usages.is_empty() {
            f.write_str("/")?;
        }
        write!(f, "{}", self.device)?;
        for control in &self.controls {
            write!(f, "/{}", control)?;
        }
        Ok(())
    }
}

/// Case-insensitive glob supporting `*`
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let text: Vec<char> = text.to_lowercase().chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while t < text.len() {
        if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if p < pattern.len() && pattern[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((sp, st)) = star {
            p = sp + 1;
            t = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_layout_path() {
        let path = BindingPath::parse("<Gamepad>/buttonSouth").unwrap();
        assert_eq!(path.device.layout.as_deref(), Some("Gamepad"));
        assert_eq!(path.controls.len(), 1);
        assert_eq!(path.controls[0].name.as_deref(), Some("buttonSouth"));
    }

    #[test]
    fn test_parse_usages() {
        let path = BindingPath::parse("<Gamepad>{RightHand}{Vertical}/leftStick/x").unwrap();
        assert_eq!(path.device.usages, vec!["RightHand", "Vertical"]);
        assert_eq!(path.controls.len(), 2);

        let path = BindingPath::parse("<Gamepad>/{PrimaryAction}").unwrap();
        assert_eq!(path.controls[0].usages, vec!["PrimaryAction"]);
        assert_eq!(path.controls[0].name, None);
    }

    #[test]
    fn test_display_round_trip() {
        for text in [
            "<Gamepad>/buttonSouth",
            "<Gamepad>{RightHand}/leftStick/x",
            "/Gamepad1/buttonNorth",
            "<Keyboard>",
        ] {
            assert_eq!(BindingPath::parse(text).unwrap().to_string(), text);
        }
    }

    #[test]
    fn test_parse_errors() {
        assert!(BindingPath::parse("").is_err());
        assert!(BindingPath::parse("<Gamepad/buttonSouth").is_err());
        assert!(BindingPath::parse("<Gamepad>//buttonSouth").is_err());
        assert!(BindingPath::parse("<Gamepad>/{Primary").is_err());
        assert!(BindingPath::parse("<>/x").is_err());
    }

    #[test]
    fn test_wildcards() {
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("button*", "ButtonSouth"));
        assert!(wildcard_match("*stick", "leftStick"));
        assert!(wildcard_match("l*t*k", "leftStick"));
        assert!(!wildcard_match("button*", "leftStick"));
        assert!(!wildcard_match("buttonSouth", "buttonSouthEast"));
    }
}
