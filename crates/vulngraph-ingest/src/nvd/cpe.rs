//! CPE 2.3 formatted string binding
//!
//! `cpe:2.3:part:vendor:product:version:update:edition:language:sw_edition:target_sw:target_hw:other`
//!
//! Components are separated by `:`; a backslash quotes the next character,
//! so `\:` is part of a component rather than a separator.

use serde::Serialize;
use thiserror::Error;

const COMPONENTS: usize = 13;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CpeError {
    #[error("not a CPE 2.3 formatted string: {0}")]
    Prefix(String),

    #[error("expected {COMPONENTS} components, found {found}: {input}")]
    ComponentCount { input: String, found: usize },

    #[error("invalid part '{part}': {input}")]
    Part { input: String, part: String },

    #[error("dangling escape: {0}")]
    DanglingEscape(String),
}

/// Parsed CPE name with escapes removed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cpe {
    pub part: String,
    pub vendor: String,
    pub product: String,
    pub version: String,
    pub update: String,
    pub edition: String,
    pub language: String,
    pub sw_edition: String,
    pub target_sw: String,
    pub target_hw: String,
    pub other: String,
}

fn split_components(input: &str) -> Result<Vec<String>, CpeError> {
    let mut components = Vec::with_capacity(COMPONENTS);
    let mut current = String::new();
    let mut chars = input.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(quoted) => current.push(quoted),
                None => return Err(CpeError::DanglingEscape(input.to_string())),
            },
            ':' => components.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    components.push(current);
    Ok(components)
}

impl std::str::FromStr for Cpe {
    type Err = CpeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !s.starts_with("cpe:2.3:") {
            return Err(CpeError::Prefix(s.to_string()));
        }

        let components = split_components(s)?;
        if components.len() != COMPONENTS {
            return Err(CpeError::ComponentCount {
                input: s.to_string(),
                found: components.len(),
            });
        }

        let mut fields = components.into_iter().skip(2);
        let mut next = || fields.next().unwrap_or_default();

        let part = next();
        if !matches!(part.as_str(), "a" | "o" | "h" | "*" | "-") {
            return Err(CpeError::Part {
                input: s.to_string(),
                part,
            });
        }

        Ok(Cpe {
            part,
            vendor: next(),
            product: next(),
            version: next(),
            update: next(),
            edition: next(),
            language: next(),
            sw_edition: next(),
            target_sw: next(),
            target_hw: next(),
            other: next(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_application_cpe() {
        let cpe: Cpe = "cpe:2.3:a:apache:log4j:2.14.1:*:*:*:*:*:*:*".parse().unwrap();
        assert_eq!(cpe.part, "a");
        assert_eq!(cpe.vendor, "apache");
        assert_eq!(cpe.product, "log4j");
        assert_eq!(cpe.version, "2.14.1");
        assert_eq!(cpe.other, "*");
    }

    #[test]
    fn test_escaped_separator_stays_in_component() {
        let cpe: Cpe = r"cpe:2.3:a:foo\:bar:baz\\qux:1.0:*:*:*:*:*:*:*".parse().unwrap();
        assert_eq!(cpe.vendor, "foo:bar");
        assert_eq!(cpe.product, r"baz\qux");
        assert_eq!(cpe.version, "1.0");
    }

    #[test]
    fn test_rejects_malformed_strings() {
        assert!(matches!("cpe:/a:apache:log4j".parse::<Cpe>(), Err(CpeError::Prefix(_))));
        assert!(matches!(
            "cpe:2.3:a:apache:log4j".parse::<Cpe>(),
            Err(CpeError::ComponentCount { found: 5, .. })
        ));
        assert!(matches!(
            "cpe:2.3:x:apache:log4j:*:*:*:*:*:*:*:*".parse::<Cpe>(),
            Err(CpeError::Part { .. })
        ));
        assert!(matches!(
            "cpe:2.3:a:apache:log4j:*:*:*:*:*:*:*:\\".parse::<Cpe>(),
            Err(CpeError::DanglingEscape(_))
        ));
    }
}
