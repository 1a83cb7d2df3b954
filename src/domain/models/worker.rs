//! Worker reference data.
//!
//! Workers are external text-generation endpoints. The pipeline only ever
//! sees a read-only [`WorkerHandle`]; the persona tag drives prompt flavor
//! and debate pairing.

use serde::{Deserialize, Serialize};

/// Persona tag attached to a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Persona {
    Thorough,
    Fast,
    Creative,
    Pragmatic,
    Minimalist,
    Bold,
    Generalist,
}

impl Default for Persona {
    fn default() -> Self {
        Self::Generalist
    }
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thorough => "thorough",
            Self::Fast => "fast",
            Self::Creative => "creative",
            Self::Pragmatic => "pragmatic",
            Self::Minimalist => "minimalist",
            Self::Bold => "bold",
            Self::Generalist => "generalist",
        }
    }

    /// Map a free-form persona label to a variant.
    ///
    /// Case, surrounding whitespace and `-`/`_`/space separators are ignored.
    /// Unknown labels fall back to [`Persona::Generalist`].
    pub fn normalize(raw: &str) -> Self {
        let key: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect();

        match key.as_str() {
            "thorough" | "thoroughness" | "careful" | "meticulous" | "detailed" => Self::Thorough,
            "fast" | "speed" | "quick" | "rapid" | "speedy" => Self::Fast,
            "creative" | "creativity" | "inventive" | "experimental" => Self::Creative,
            "pragmatic" | "practical" | "conservative" => Self::Pragmatic,
            "minimalist" | "minimal" | "minimalism" | "simple" => Self::Minimalist,
            "bold" | "maximalist" | "flashy" | "expressive" => Self::Bold,
            _ => Self::Generalist,
        }
    }

    /// The persona this one is deliberately paired against in debates.
    pub fn counterpart(&self) -> Option<Self> {
        match self {
            Self::Thorough => Some(Self::Fast),
            Self::Fast => Some(Self::Thorough),
            Self::Creative => Some(Self::Pragmatic),
            Self::Pragmatic => Some(Self::Creative),
            Self::Minimalist => Some(Self::Bold),
            Self::Bold => Some(Self::Minimalist),
            Self::Generalist => None,
        }
    }

    pub fn contrasts_with(&self, other: Self) -> bool {
        self.counterpart() == Some(other)
    }

    /// One-line stance used to flavor prompts and debate talking points.
    pub fn stance(&self) -> &'static str {
        match self {
            Self::Thorough => "cover edge cases and leave nothing implicit",
            Self::Fast => "ship the smallest thing that works, quickly",
            Self::Creative => "explore an unconventional angle",
            Self::Pragmatic => "prefer proven, boring solutions",
            Self::Minimalist => "strip the result to its essentials",
            Self::Bold => "make a strong, memorable statement",
            Self::Generalist => "balance the competing concerns",
        }
    }
}

impl std::fmt::Display for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identifier and metadata for one callable worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerHandle {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub persona: Persona,
    /// Artifact kind this worker is bound to, if any.
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default = "default_available")]
    pub available: bool,
}

const fn default_available() -> bool {
    true
}

impl WorkerHandle {
    pub fn new(id: impl Into<String>, name: impl Into<String>, persona: Persona) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            persona,
            domain: None,
            available: true,
        }
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn unavailable(mut self) -> Self {
        self.available = false;
        self
    }

    /// Whether this worker is bound to the given artifact kind.
    pub fn serves(&self, artifact_kind: &str) -> bool {
        self.domain
            .as_deref()
            .is_some_and(|d| d.eq_ignore_ascii_case(artifact_kind.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_known_labels() {
        assert_eq!(Persona::normalize("Thoroughness"), Persona::Thorough);
        assert_eq!(Persona::normalize("  speed "), Persona::Fast);
        assert_eq!(Persona::normalize("QUICK"), Persona::Fast);
        assert_eq!(Persona::normalize("mini-malist"), Persona::Minimalist);
        assert_eq!(Persona::normalize("bold"), Persona::Bold);
        assert_eq!(Persona::normalize("practical"), Persona::Pragmatic);
    }

    #[test]
    fn test_normalize_falls_back_to_generalist() {
        assert_eq!(Persona::normalize(""), Persona::Generalist);
        assert_eq!(Persona::normalize("wizard"), Persona::Generalist);
    }

    #[test]
    fn test_contrasting_pairs_are_symmetric() {
        assert!(Persona::Thorough.contrasts_with(Persona::Fast));
        assert!(Persona::Fast.contrasts_with(Persona::Thorough));
        assert!(Persona::Minimalist.contrasts_with(Persona::Bold));
        assert!(!Persona::Thorough.contrasts_with(Persona::Bold));
        assert!(!Persona::Generalist.contrasts_with(Persona::Generalist));
    }

    #[test]
    fn test_worker_serves_domain() {
        let worker = WorkerHandle::new("w1", "Ada", Persona::Fast).with_domain("Component");
        assert!(worker.serves("component"));
        assert!(!worker.serves("service"));
        assert!(!WorkerHandle::new("w2", "Bo", Persona::Bold).serves("component"));
    }
}
