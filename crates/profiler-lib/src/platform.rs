//! Operating system classification used as an outbound label

use serde::Serialize;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OsPlatform {
    Windows,
    Linux,
    Osx,
}

impl OsPlatform {
    /// Classify an OS name by case-sensitive prefix
    pub fn classify(os_name: &str) -> Option<Self> {
        if os_name.starts_with("Windows") {
            Some(OsPlatform::Windows)
        } else if os_name.starts_with("Linux") || os_name.starts_with("LINUX") {
            Some(OsPlatform::Linux)
        } else if os_name.starts_with("Mac") {
            Some(OsPlatform::Osx)
        } else {
            None
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            OsPlatform::Windows => "Windows",
            OsPlatform::Linux => "Linux",
            OsPlatform::Osx => "OSX",
        }
    }
}

impl std::fmt::Display for OsPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.description())
    }
}

/// Resolve the platform from an OS name source.
///
/// An unreadable name yields `None` silently; a readable but unknown name
/// yields `None` with a warning.
pub fn platform_from_source<F>(os_name: F) -> Option<OsPlatform>
where
    F: FnOnce() -> std::io::Result<String>,
{
    let name = os_name().ok()?;
    let platform = OsPlatform::classify(&name);
    if platform.is_none() {
        warn!(os_name = %name, "Type of operating system could not be determined");
    }
    platform
}

/// Platform of the running process
pub fn current_platform() -> Option<OsPlatform> {
    platform_from_source(|| Ok(os_display_name(std::env::consts::OS).to_string()))
}

/// Description of the running platform, `None` when it is not recognized
pub fn platform_description() -> Option<&'static str> {
    current_platform().map(|p| p.description())
}

fn os_display_name(os: &str) -> &str {
    match os {
        "windows" => "Windows",
        "linux" => "Linux",
        "macos" => "Mac OS X",
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_prefixes() {
        assert_eq!(
            OsPlatform::classify("Windows 11"),
            Some(OsPlatform::Windows)
        );
        assert_eq!(OsPlatform::classify("Linux"), Some(OsPlatform::Linux));
        assert_eq!(OsPlatform::classify("LINUX"), Some(OsPlatform::Linux));
        assert_eq!(OsPlatform::classify("Mac OS X"), Some(OsPlatform::Osx));
    }

    #[test]
    fn test_classify_is_case_sensitive() {
        assert_eq!(OsPlatform::classify("linux"), None);
        assert_eq!(OsPlatform::classify("windows"), None);
        assert_eq!(OsPlatform::classify("FreeBSD"), None);
        assert_eq!(OsPlatform::classify(""), None);
    }

    #[test]
    fn test_descriptions() {
        assert_eq!(OsPlatform::Windows.description(), "Windows");
        assert_eq!(OsPlatform::Linux.description(), "Linux");
        assert_eq!(OsPlatform::Osx.to_string(), "OSX");
    }

    #[test]
    fn test_unreadable_name_is_none() {
        let platform = platform_from_source(|| {
            Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "denied",
            ))
        });
        assert_eq!(platform, None);
    }

    #[test]
    fn test_source_name_classified() {
        assert_eq!(
            platform_from_source(|| Ok("Linux".to_string())),
            Some(OsPlatform::Linux)
        );
        assert_eq!(platform_from_source(|| Ok("Solaris".to_string())), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_current_platform_on_linux() {
        assert_eq!(current_platform(), Some(OsPlatform::Linux));
        assert_eq!(platform_description(), Some("Linux"));
    }
}
