use std::fmt;

/// Root font size used to convert `em`/`rem` media lengths.
const ROOT_FONT_PX: f64 = 16.0;

/// Responsive breakpoints the target platform understands. `Base` is the
/// unconditioned style; every other value is a variant key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Breakpoint {
    Base,
    Medium,
    Small,
    Tiny,
    Xlarge,
    Xxlarge,
    Xxxlarge,
}

impl Breakpoint {
    /// Embed grouping order: desktop-first, then the large screens.
    pub const ORDER: [Breakpoint; 7] = [
        Breakpoint::Base,
        Breakpoint::Medium,
        Breakpoint::Small,
        Breakpoint::Tiny,
        Breakpoint::Xlarge,
        Breakpoint::Xxlarge,
        Breakpoint::Xxxlarge,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Breakpoint::Base => "base",
            Breakpoint::Medium => "medium",
            Breakpoint::Small => "small",
            Breakpoint::Tiny => "tiny",
            Breakpoint::Xlarge => "xlarge",
            Breakpoint::Xxlarge => "xxlarge",
            Breakpoint::Xxxlarge => "xxxlarge",
        }
    }

    /// Canonical query used when a rule has to be re-wrapped.
    pub fn query(self) -> Option<&'static str> {
        match self {
            Breakpoint::Base => None,
            Breakpoint::Medium => Some("(max-width: 991px)"),
            Breakpoint::Small => Some("(max-width: 767px)"),
            Breakpoint::Tiny => Some("(max-width: 479px)"),
            Breakpoint::Xlarge => Some("(min-width: 1280px)"),
            Breakpoint::Xxlarge => Some("(min-width: 1440px)"),
            Breakpoint::Xxxlarge => Some("(min-width: 1920px)"),
        }
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Map a media query to a breakpoint. Queries that combine features, use
/// anything other than a single `max-width`/`min-width`, or fall outside the
/// breakpoint ranges are non-standard and return `None`.
pub fn classify_media(query: &str) -> Option<Breakpoint> {
    let lowered = query.trim().to_ascii_lowercase();
    let mut rest = lowered.as_str();
    for prefix in ["only screen and", "screen and", "all and"] {
        if let Some(stripped) = rest.strip_prefix(prefix) {
            rest = stripped.trim_start();
            break;
        }
    }
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    if inner.contains('(') || inner.contains(')') {
        return None;
    }
    let (feature, value) = inner.split_once(':')?;
    let px = parse_media_length(value.trim())?;
    match feature.trim() {
        "max-width" => {
            if px <= 479.0 {
                Some(Breakpoint::Tiny)
            } else if px <= 767.0 {
                Some(Breakpoint::Small)
            } else if px <= 991.0 {
                Some(Breakpoint::Medium)
            } else {
                None
            }
        }
        "min-width" => {
            if px >= 1920.0 {
                Some(Breakpoint::Xxxlarge)
            } else if px >= 1440.0 {
                Some(Breakpoint::Xxlarge)
            } else if px >= 1280.0 {
                Some(Breakpoint::Xlarge)
            } else {
                None
            }
        }
        _ => None,
    }
}

fn parse_media_length(value: &str) -> Option<f64> {
    let (number, scale) = if let Some(n) = value.strip_suffix("px") {
        (n, 1.0)
    } else if let Some(n) = value.strip_suffix("rem") {
        (n, ROOT_FONT_PX)
    } else if let Some(n) = value.strip_suffix("em") {
        (n, ROOT_FONT_PX)
    } else {
        (value, 1.0)
    };
    number.trim().parse::<f64>().ok().map(|n| n * scale)
}
