//! Diagram kinds and output formats.

/// Diagram description languages understood by the renderers.
///
/// The kind selects the Kroki endpoint, names the asset directory in the cache
/// layout, and is matched against fenced code block info strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagramKind {
    Mermaid,
    PlantUml,
    GraphViz,
    D2,
    Ditaa,
    Nomnoml,
    Svgbob,
    WaveDrom,
}

impl DiagramKind {
    /// Parse a kind from a configuration value or code fence info string.
    ///
    /// Accepts `kroki-` prefixed names (`kroki-mermaid`) and the `dot` alias.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.strip_prefix("kroki-").unwrap_or(s) {
            "mermaid" => Some(Self::Mermaid),
            "plantuml" | "puml" => Some(Self::PlantUml),
            "graphviz" | "dot" => Some(Self::GraphViz),
            "d2" => Some(Self::D2),
            "ditaa" => Some(Self::Ditaa),
            "nomnoml" => Some(Self::Nomnoml),
            "svgbob" => Some(Self::Svgbob),
            "wavedrom" => Some(Self::WaveDrom),
            _ => None,
        }
    }

    /// Canonical name, also the Kroki endpoint and cache directory name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mermaid => "mermaid",
            Self::PlantUml => "plantuml",
            Self::GraphViz => "graphviz",
            Self::D2 => "d2",
            Self::Ditaa => "ditaa",
            Self::Nomnoml => "nomnoml",
            Self::Svgbob => "svgbob",
            Self::WaveDrom => "wavedrom",
        }
    }
}

impl std::fmt::Display for DiagramKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output format for rendered diagrams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiagramFormat {
    /// SVG document (default).
    #[default]
    Svg,
    /// PNG image.
    Png,
}

impl DiagramFormat {
    /// Parse format from a configuration value.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "svg" => Some(Self::Svg),
            "png" => Some(Self::Png),
            _ => None,
        }
    }

    /// Format name, also used as the asset file extension.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
        }
    }
}
