//! Kernel sources as data.
//!
//! The OpenCL text for each kernel ships under `kernels/` and is bundled at
//! build time. A backend picks its implementation from the [`KernelKind`] and
//! checks the entry point against the source it was handed.

use serde::{Deserialize, Serialize};

/// Which log-likelihood a kernel evaluates.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum KernelKind {
    /// Σ multiplicity · ln(grade) against the grid point's grades.
    #[default]
    Grades,
    /// Beta-binomial with psi and rho read as alpha and beta.
    BetaBinomial,
}

impl KernelKind {
    pub fn entry_point(self) -> &'static str {
        match self {
            KernelKind::Grades => "estimate_grades",
            KernelKind::BetaBinomial => "estimate_beta_binomial",
        }
    }
}

impl std::fmt::Display for KernelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KernelKind::Grades => write!(f, "grades"),
            KernelKind::BetaBinomial => write!(f, "beta-binomial"),
        }
    }
}

/// A kernel program plus the function to run from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelSource {
    pub kind: KernelKind,
    pub entry_point: String,
    pub source: String,
}

impl KernelSource {
    /// The bundled kernel for `kind`.
    pub fn builtin(kind: KernelKind) -> Self {
        let source = match kind {
            KernelKind::Grades => include_str!("../../kernels/grades.cl"),
            KernelKind::BetaBinomial => include_str!("../../kernels/beta_binomial.cl"),
        };
        Self {
            kind,
            entry_point: kind.entry_point().to_string(),
            source: source.to_string(),
        }
    }

    /// Whether the source declares `__kernel void <entry_point>(`.
    pub fn declares_entry_point(&self) -> bool {
        let mut rest = self.source.as_str();
        while let Some(pos) = rest.find("__kernel") {
            rest = &rest[pos + "__kernel".len()..];
            let mut tokens = rest.split(|c: char| c.is_whitespace() || c == '(');
            let ret = tokens.find(|t| !t.is_empty());
            let name = tokens.find(|t| !t.is_empty());
            if ret == Some("void") && name == Some(self.entry_point.as_str()) {
                return true;
            }
        }
        false
    }
}
