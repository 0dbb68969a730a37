//! Certification of solver output against best-known reference bounds.
//!
//! The reference database maps `(kind, problem)` to either a single proven
//! optimum or a `[lower, upper]` pair. It only covers single-agent runs; for
//! several agents no disjoint-partition reference exists, so those runs are
//! recorded without certification.
//!
//! A violation here can only come from a solver or decoder defect, never
//! from an unlucky run, so every violation is fatal to the enclosing
//! benchmark.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::Error;
use crate::tours::Bounds;

/// A best-known reference: a proven optimum, or the tightest published
/// bounds when optimality is still open.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReferenceSolution {
    Optimum(i64),
    Range(f64, f64),
}

impl ReferenceSolution {
    pub fn lower(&self) -> f64 {
        match *self {
            ReferenceSolution::Optimum(v) => v as f64,
            ReferenceSolution::Range(lb, _) => lb,
        }
    }

    pub fn upper(&self) -> f64 {
        match *self {
            ReferenceSolution::Optimum(v) => v as f64,
            ReferenceSolution::Range(_, ub) => ub,
        }
    }

    /// The optimum is proven (bounds coincide).
    pub fn is_proven(&self) -> bool {
        self.lower() >= self.upper()
    }
}

/// Read-only mapping from instance kind ("tsp", "atsp", "sop") and problem
/// name to its best-known solution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReferenceDb {
    entries: HashMap<String, HashMap<String, ReferenceSolution>>,
}

impl ReferenceDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the database from a JSON file shaped like
    /// `{"tsp": {"berlin52": 7542, ...}, "sop": {"ESC25": [1681, 1681]}}`.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn insert(&mut self, kind: &str, name: &str, solution: ReferenceSolution) {
        self.entries
            .entry(kind.to_string())
            .or_default()
            .insert(name.to_string(), solution);
    }

    pub fn lookup(&self, kind: &str, name: &str) -> Option<ReferenceSolution> {
        self.entries.get(kind).and_then(|m| m.get(name)).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(HashMap::is_empty)
    }
}

/// Fatal disagreements between a solve result and the reference database.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CertificationViolation {
    #[error("inconsistent bounds for '{instance}': lower {lower} exceeds upper {upper}")]
    InconsistentBounds { instance: String, lower: f64, upper: f64 },

    #[error("bounds for '{instance}' are [{lower}, {upper}] but best known bounds are [{best_lower}, {best_upper}]")]
    TighterThanBestKnown {
        instance: String,
        lower: f64,
        upper: f64,
        best_lower: f64,
        best_upper: f64,
    },

    #[error("found solution {upper} for '{instance}' but the known optimum is {best_upper}")]
    ConvergedToWrongValue { instance: String, upper: f64, best_upper: f64 },
}

/// Cross-checks final bounds against the reference database.
#[derive(Debug, Clone, Default)]
pub struct BoundCertifier {
    db: ReferenceDb,
}

impl BoundCertifier {
    pub fn new(db: ReferenceDb) -> Self {
        BoundCertifier { db }
    }

    pub fn db(&self) -> &ReferenceDb {
        &self.db
    }

    /// Certify one run. Multi-agent runs and instances without a reference
    /// entry pass vacuously.
    ///
    /// Violations, in the order checked:
    /// - the run's own bounds are inverted (`lower > upper`),
    /// - the run converged (`lower >= upper`) to a value other than the
    ///   known optimum,
    /// - the run claims bounds strictly tighter than the best known ones.
    pub fn certify(
        &self,
        kind: &str,
        name: &str,
        agent_count: usize,
        bounds: Bounds,
    ) -> Result<(), CertificationViolation> {
        if agent_count != 1 {
            log::debug!("skipping certification of '{}': {} agents", name, agent_count);
            return Ok(());
        }
        let Some(reference) = self.db.lookup(kind, name) else {
            log::debug!("skipping certification of '{}': no reference entry", name);
            return Ok(());
        };

        if !bounds.is_consistent() {
            return Err(CertificationViolation::InconsistentBounds {
                instance: name.to_string(),
                lower: bounds.lower,
                upper: bounds.upper,
            });
        }
        if bounds.is_optimal() && bounds.upper != reference.upper() {
            return Err(CertificationViolation::ConvergedToWrongValue {
                instance: name.to_string(),
                upper: bounds.upper,
                best_upper: reference.upper(),
            });
        }
        if bounds.lower > reference.lower() || bounds.upper < reference.upper() {
            return Err(CertificationViolation::TighterThanBestKnown {
                instance: name.to_string(),
                lower: bounds.lower,
                upper: bounds.upper,
                best_lower: reference.lower(),
                best_upper: reference.upper(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> ReferenceDb {
        let mut db = ReferenceDb::new();
        db.insert("tsp", "berlin52", ReferenceSolution::Optimum(7542));
        db.insert("sop", "ry48p.1", ReferenceSolution::Range(15220.0, 15805.0));
        db
    }

    #[test]
    fn test_json_round_trip() {
        let db = ReferenceDb::from_json(
            r#"{"tsp": {"berlin52": 7542}, "sop": {"ry48p.1": [15220, 15805]}}"#,
        )
        .unwrap();
        assert_eq!(db.lookup("tsp", "berlin52"), Some(ReferenceSolution::Optimum(7542)));
        let open = db.lookup("sop", "ry48p.1").unwrap();
        assert_eq!(open.lower(), 15220.0);
        assert_eq!(open.upper(), 15805.0);
        assert!(!open.is_proven());
        assert_eq!(db.lookup("tsp", "missing"), None);
    }

    #[test]
    fn test_accepts_matching_bounds() {
        let certifier = BoundCertifier::new(db());
        assert!(certifier.certify("tsp", "berlin52", 1, Bounds::new(7542.0, 7542.0)).is_ok());
        // a looser-than-known run is fine, the search just did not finish
        assert!(certifier.certify("tsp", "berlin52", 1, Bounds::new(7000.0, 8000.0)).is_ok());
    }

    #[test]
    fn test_rejects_lower_bound_above_best() {
        let certifier = BoundCertifier::new(db());
        let err = certifier.certify("tsp", "berlin52", 1, Bounds::new(7600.0, 7700.0)).unwrap_err();
        assert!(matches!(err, CertificationViolation::TighterThanBestKnown { .. }));
    }

    #[test]
    fn test_rejects_upper_bound_below_best() {
        let certifier = BoundCertifier::new(db());
        let err = certifier.certify("tsp", "berlin52", 1, Bounds::new(7400.0, 7500.0)).unwrap_err();
        assert!(matches!(err, CertificationViolation::TighterThanBestKnown { .. }));
    }

    #[test]
    fn test_rejects_wrong_convergence() {
        let certifier = BoundCertifier::new(db());
        let err = certifier.certify("tsp", "berlin52", 1, Bounds::new(7000.0, 7000.0)).unwrap_err();
        assert_eq!(
            err,
            CertificationViolation::ConvergedToWrongValue {
                instance: "berlin52".to_string(),
                upper: 7000.0,
                best_upper: 7542.0,
            }
        );
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let certifier = BoundCertifier::new(db());
        let err = certifier.certify("tsp", "berlin52", 1, Bounds::new(7542.0, 7000.0)).unwrap_err();
        assert!(matches!(err, CertificationViolation::InconsistentBounds { .. }));
    }

    #[test]
    fn test_multi_agent_and_unknown_instances_skipped() {
        let certifier = BoundCertifier::new(db());
        assert!(certifier.certify("tsp", "berlin52", 2, Bounds::new(9999.0, 1.0)).is_ok());
        assert!(certifier.certify("tsp", "unknown", 1, Bounds::new(1.0, 2.0)).is_ok());
    }
}
