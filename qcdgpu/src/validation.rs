// SPDX-License-Identifier: AGPL-3.0-only

//! Validation harness for qcdgpu binaries.
//!
//! A validation binary runs fixed configurations, compares observables
//! against tolerances from [`crate::tolerances`], prints one line per
//! check and exits 0 only if every check passed.

use std::fmt::Write as _;
use std::process;

/// A single recorded check.
#[derive(Debug, Clone)]
pub struct Check {
    pub label: String,
    pub passed: bool,
    pub observed: f64,
    pub expected: f64,
    pub tolerance: f64,
    pub mode: ToleranceMode,
}

/// How a tolerance threshold is applied.
#[derive(Debug, Clone, Copy)]
pub enum ToleranceMode {
    /// |observed - expected| < tolerance
    Absolute,
    /// |observed - expected| / |expected| < tolerance
    Relative,
    /// observed < threshold
    UpperBound,
    /// observed > threshold
    LowerBound,
}

impl std::fmt::Display for ToleranceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Absolute => write!(f, "abs"),
            Self::Relative => write!(f, "rel"),
            Self::UpperBound => write!(f, "<"),
            Self::LowerBound => write!(f, ">"),
        }
    }
}

/// Accumulates checks and turns them into an exit code.
#[derive(Debug, Default)]
#[must_use]
pub struct ValidationHarness {
    pub name: String,
    pub checks: Vec<Check>,
}

impl ValidationHarness {
    #[must_use = "validation harness must be used to run checks"]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            checks: Vec::new(),
        }
    }

    fn push(&mut self, label: &str, passed: bool, observed: f64, expected: f64, tolerance: f64, mode: ToleranceMode) {
        self.checks.push(Check {
            label: label.to_string(),
            passed,
            observed,
            expected,
            tolerance,
            mode,
        });
    }

    pub fn check_abs(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        let passed = (observed - expected).abs() < tolerance;
        self.push(label, passed, observed, expected, tolerance, ToleranceMode::Absolute);
    }

    /// Relative check; falls back to `|observed| < tolerance` for `expected = 0`.
    pub fn check_rel(&mut self, label: &str, observed: f64, expected: f64, tolerance: f64) {
        let passed = if expected.abs() > f64::EPSILON {
            ((observed - expected) / expected).abs() < tolerance
        } else {
            observed.abs() < tolerance
        };
        self.push(label, passed, observed, expected, tolerance, ToleranceMode::Relative);
    }

    pub fn check_upper(&mut self, label: &str, observed: f64, threshold: f64) {
        self.push(label, observed < threshold, observed, threshold, threshold, ToleranceMode::UpperBound);
    }

    pub fn check_lower(&mut self, label: &str, observed: f64, threshold: f64) {
        self.push(label, observed > threshold, observed, threshold, threshold, ToleranceMode::LowerBound);
    }

    pub fn check_bool(&mut self, label: &str, passed: bool) {
        self.push(label, passed, f64::from(u8::from(passed)), 1.0, 0.0, ToleranceMode::Absolute);
    }

    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    #[must_use]
    pub const fn total_count(&self) -> usize {
        self.checks.len()
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }

    /// Summary block as printed by [`Self::finish`].
    #[must_use]
    pub fn format_summary(&self) -> String {
        let mut s = String::new();
        let _ = writeln!(
            s,
            "═══ {} validation: {}/{} checks passed ═══",
            self.name,
            self.passed_count(),
            self.total_count()
        );
        for check in &self.checks {
            let icon = if check.passed { "✓" } else { "✗" };
            let _ = writeln!(
                s,
                "  {icon} {}: observed={:.6e}, expected={:.6e}, tol={:.2e} ({})",
                check.label, check.observed, check.expected, check.tolerance, check.mode
            );
        }
        s
    }

    /// Print the summary and exit 0 if every check passed, 1 otherwise.
    pub fn finish(&self) -> ! {
        println!();
        print!("{}", self.format_summary());
        if self.all_passed() {
            println!("ALL CHECKS PASSED");
            process::exit(0);
        }
        let failed: Vec<&str> = self
            .checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| c.label.as_str())
            .collect();
        println!("FAILED CHECKS: {}", failed.join(", "));
        process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn harness_tracks_pass_fail() {
        let mut h = ValidationHarness::new("test");
        h.check_abs("exact", 1.0, 1.0, 1e-10);
        h.check_abs("close", 1.0001, 1.0, 1e-3);
        h.check_abs("far", 2.0, 1.0, 1e-3);
        assert_eq!(h.passed_count(), 2);
        assert_eq!(h.total_count(), 3);
        assert!(!h.all_passed());
    }

    #[test]
    fn relative_check_handles_zero() {
        let mut h = ValidationHarness::new("test");
        h.check_rel("near_zero", 1e-15, 0.0, 1e-10);
        h.check_rel("off", 1.0, 0.0, 1e-10);
        assert!(h.checks[0].passed);
        assert!(!h.checks[1].passed);
    }

    #[test]
    fn bounds_are_strict() {
        let mut h = ValidationHarness::new("test");
        h.check_upper("at", 1.0, 1.0);
        h.check_lower("at", 1.0, 1.0);
        h.check_lower("above", 0.6, 0.45);
        assert_eq!(h.passed_count(), 1);
    }

    #[test]
    fn summary_names_run_and_counts() {
        let mut h = ValidationHarness::new("decomposition");
        h.check_bool("deterministic", true);
        h.check_abs("plaquette", 2.0, 1.0, 0.01);
        let s = h.format_summary();
        assert!(s.contains("decomposition"));
        assert!(s.contains("1/2"));
        assert!(s.contains('✗'));
    }

    #[test]
    fn empty_harness_passes() {
        let h = ValidationHarness::new("empty");
        assert!(h.all_passed());
        assert_eq!(h.total_count(), 0);
    }
}
