use std::fmt;
use std::str::FromStr;

use semio_core::{DocumentKind, Error, Result, VectorField};

use crate::weights::Weights;

const CODE_KEYWORDS: &[&str] = &["function", "función", "class", "clase", "code", "código", "method", "método"];
const ONTOLOGY_KEYWORDS: &[&str] = &["concept", "concepto", "what is", "qué es", "definition", "definición", "ontology", "ontología"];

/// Preset weight profiles and the document kinds each one searches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchMode {
    #[default]
    Hybrid,
    Ontology,
    Code,
}

impl SearchMode {
    /// Pick a mode from query wording; code keywords win over ontology ones.
    pub fn detect(query: &str) -> Self {
        let q = query.to_lowercase();
        if CODE_KEYWORDS.iter().any(|kw| q.contains(kw)) {
            SearchMode::Code
        } else if ONTOLOGY_KEYWORDS.iter().any(|kw| q.contains(kw)) {
            SearchMode::Ontology
        } else {
            SearchMode::Hybrid
        }
    }

    pub fn weights(&self) -> Weights {
        match self {
            SearchMode::Hybrid => VectorField::ALL.into_iter().fold(Weights::new(), |w, f| w.vector(f, 0.25)),
            SearchMode::Ontology => Weights::new().vector(VectorField::Domain, 0.7).vector(VectorField::Hybrid, 0.3),
            SearchMode::Code => Weights::new()
                .vector(VectorField::Syntax, 0.4)
                .vector(VectorField::Dataflow, 0.4)
                .vector(VectorField::Hybrid, 0.2),
        }
    }

    pub fn kinds(&self) -> &'static [DocumentKind] {
        match self {
            SearchMode::Hybrid => &DocumentKind::ALL,
            SearchMode::Ontology => &[DocumentKind::Ontology],
            SearchMode::Code => &[DocumentKind::Code],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Hybrid => "hybrid",
            SearchMode::Ontology => "ontology",
            SearchMode::Code => "code",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for SearchMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hybrid" => Ok(SearchMode::Hybrid),
            "ontology" => Ok(SearchMode::Ontology),
            "code" => Ok(SearchMode::Code),
            other => Err(Error::invalid_argument("mode", format!("unknown search mode '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semio_core::Signal;

    #[test]
    fn detects_english_and_spanish_keywords() {
        assert_eq!(SearchMode::detect("which function parses CSV"), SearchMode::Code);
        assert_eq!(SearchMode::detect("¿Qué es un cliente?"), SearchMode::Ontology);
        assert_eq!(SearchMode::detect("definición de la clase Pedido"), SearchMode::Code);
        assert_eq!(SearchMode::detect("csv parsing"), SearchMode::Hybrid);
    }

    #[test]
    fn profiles_match_their_kinds() {
        let code = SearchMode::Code.weights();
        assert_eq!(code.get(Signal::Vector(VectorField::Syntax)), Some(0.4));
        assert_eq!(code.get(Signal::Vector(VectorField::Domain)), None);
        assert_eq!(SearchMode::Code.kinds(), &[DocumentKind::Code]);
        assert_eq!(SearchMode::Hybrid.kinds().len(), 2);
        assert_eq!("ontology".parse::<SearchMode>().unwrap(), SearchMode::Ontology);
    }
}
