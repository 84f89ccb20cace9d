//! Branding preferences for the welcome banner

use serde::Deserialize;
use std::path::Path;

const RESET: &str = "\x1b[0m";
const DEFAULT_COLOR: &str = "\x1b[35m";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Prefs {
    /// System name shown in the banner
    pub name: String,
    pub icon: String,
    /// Colour name (`red`, `magenta`, ...)
    pub color: Option<String>,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            name: "OpenMB".into(),
            icon: "🍇".into(),
            color: None,
        }
    }
}

impl Prefs {
    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Load preferences, falling back to defaults on any problem
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) => {
                log::debug!("No preferences at {}: {}", path.display(), e);
                return Self::default();
            }
        };

        Self::parse(&content).unwrap_or_else(|e| {
            log::warn!("Ignoring invalid preferences {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// ANSI escape for the configured colour
    pub fn color_code(&self) -> &'static str {
        match self.color.as_deref().map(str::to_lowercase).as_deref() {
            Some("black") => "\x1b[30m",
            Some("red") => "\x1b[31m",
            Some("green") => "\x1b[32m",
            Some("yellow") => "\x1b[33m",
            Some("blue") => "\x1b[34m",
            Some("cyan") => "\x1b[36m",
            Some("white") => "\x1b[37m",
            _ => DEFAULT_COLOR,
        }
    }

    /// Welcome banner, one journal line per entry
    pub fn banner(&self) -> [String; 3] {
        [
            String::new(),
            format!(
                "  {}{} Welcome to {}!{}",
                self.color_code(),
                self.icon,
                self.name,
                RESET
            ),
            String::new(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let prefs = Prefs::default();
        assert_eq!(prefs.name, "OpenMB");
        assert_eq!(prefs.icon, "🍇");
        assert_eq!(prefs.color_code(), DEFAULT_COLOR);
    }

    #[test]
    fn test_parse_partial() {
        let prefs = Prefs::parse("name: Berry OS\n").unwrap();
        assert_eq!(prefs.name, "Berry OS");
        assert_eq!(prefs.icon, "🍇");
    }

    #[test]
    fn test_color() {
        let prefs = Prefs::parse("color: Green\n").unwrap();
        assert_eq!(prefs.color_code(), "\x1b[32m");
        let prefs = Prefs::parse("color: plaid\n").unwrap();
        assert_eq!(prefs.color_code(), DEFAULT_COLOR);
    }

    #[test]
    fn test_load_missing_file() {
        let prefs = Prefs::load(Path::new("/nonexistent-moodberry/prefs.yml"));
        assert_eq!(prefs, Prefs::default());
    }

    #[test]
    fn test_banner() {
        let banner = Prefs::default().banner();
        assert_eq!(banner[0], "");
        assert_eq!(banner[1], "  \x1b[35m🍇 Welcome to OpenMB!\x1b[0m");
        assert_eq!(banner[2], "");
    }
}
