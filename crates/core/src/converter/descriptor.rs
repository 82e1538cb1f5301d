//! Static metadata describing a converter type.

use std::time::Duration;

/// Output names accepted in place of a declared output.
const OUTPUT_ALIASES: &[(&str, &str)] = &[("jpeg", "jpg"), ("tiff", "tif")];

/// Host platforms a converter can run on, as named by `std::env::consts::OS`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platforms {
    Any,
    Only(Vec<&'static str>),
}

impl Platforms {
    pub fn supports(&self, platform: &str) -> bool {
        match self {
            Self::Any => true,
            Self::Only(platforms) => platforms.iter().any(|p| *p == platform),
        }
    }

    /// Platforms supported by both.
    pub fn intersect(&self, other: &Platforms) -> Platforms {
        match (self, other) {
            (Self::Any, other) => other.clone(),
            (this, Self::Any) => this.clone(),
            (Self::Only(a), Self::Only(b)) => {
                Self::Only(a.iter().filter(|p| b.contains(p)).copied().collect())
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Any => "any".to_string(),
            Self::Only(platforms) if platforms.is_empty() => "none".to_string(),
            Self::Only(platforms) => platforms.join(", "),
        }
    }
}

/// An external program the converter needs, satisfied by the first installed candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub name: &'static str,
    pub candidates: Vec<&'static str>,
}

impl Dependency {
    pub fn new(name: &'static str, candidates: &[&'static str]) -> Self {
        Self {
            name,
            candidates: candidates.to_vec(),
        }
    }
}

/// Describes what a converter handles and what it needs from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConverterDescriptor {
    /// Unique name, recorded in events.
    pub name: &'static str,
    pub tool_names: Vec<&'static str>,
    pub outputs: Vec<&'static str>,
    pub platforms: Platforms,
    pub dependencies: Vec<Dependency>,
    /// Default time limit for a single tool invocation.
    pub process_timeout: Option<Duration>,
    /// Whether several instances may run at once.
    pub parallel_safe: bool,
    /// Matches every requested output for its tools (the output is not a format).
    pub any_output: bool,
}

impl ConverterDescriptor {
    pub fn new(name: &'static str, tool_names: &[&'static str], outputs: &[&'static str]) -> Self {
        Self {
            name,
            tool_names: tool_names.to_vec(),
            outputs: outputs.to_vec(),
            platforms: Platforms::Any,
            dependencies: Vec::new(),
            process_timeout: None,
            parallel_safe: true,
            any_output: false,
        }
    }

    pub fn platforms(mut self, platforms: &[&'static str]) -> Self {
        self.platforms = Platforms::Only(platforms.to_vec());
        self
    }

    pub fn dependency(mut self, name: &'static str, candidates: &[&'static str]) -> Self {
        self.dependencies.push(Dependency::new(name, candidates));
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.process_timeout = Some(Duration::from_secs(secs));
        self
    }

    pub fn not_parallel_safe(mut self) -> Self {
        self.parallel_safe = false;
        self
    }

    pub fn any_output(mut self) -> Self {
        self.any_output = true;
        self
    }

    /// Metadata for a converter built from `parts`.
    ///
    /// Platforms are intersected, dependencies merged by name, the timeout is the
    /// longest of the parts and parallel safety requires every part to be safe.
    pub fn composite(
        name: &'static str,
        tool_names: &[&'static str],
        outputs: &[&'static str],
        parts: &[&ConverterDescriptor],
    ) -> Self {
        let mut descriptor = Self::new(name, tool_names, outputs);
        for part in parts {
            descriptor.platforms = descriptor.platforms.intersect(&part.platforms);
            for dependency in &part.dependencies {
                if !descriptor
                    .dependencies
                    .iter()
                    .any(|d| d.name == dependency.name)
                {
                    descriptor.dependencies.push(dependency.clone());
                }
            }
            descriptor.process_timeout = match (descriptor.process_timeout, part.process_timeout) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            descriptor.parallel_safe &= part.parallel_safe;
        }
        descriptor
    }

    /// Resolves a requested output to the declared output name.
    ///
    /// Matching is case-insensitive and accepts the usual aliases ("jpeg" for "jpg").
    pub fn normalize_output(&self, requested: &str) -> Option<&'static str> {
        let lower = requested.to_ascii_lowercase();
        let lookup = |name: &str| self.outputs.iter().copied().find(|o| o.eq_ignore_ascii_case(name));

        lookup(&lower).or_else(|| {
            OUTPUT_ALIASES
                .iter()
                .find(|(alias, _)| *alias == lower)
                .and_then(|(_, target)| lookup(target))
        })
    }

    /// Whether this converter handles the tool/output pair.
    pub fn matches(&self, tool: &str, output: &str) -> bool {
        self.tool_names.iter().any(|t| *t == tool)
            && (self.any_output || self.normalize_output(output).is_some())
    }
}
